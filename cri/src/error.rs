//! CRI-specific error conversions.

use kardigan_core::error::KardiganError;
use tonic::Status;

/// Convert a KardiganError to a gRPC Status.
pub fn error_to_status(err: KardiganError) -> Status {
    match err {
        KardiganError::NotFound(msg) => Status::not_found(msg),
        KardiganError::CreationFailed(msg) => Status::failed_precondition(msg),
        KardiganError::Unimplemented(msg) => Status::unimplemented(msg),
        KardiganError::Timeout(msg) => Status::deadline_exceeded(msg),
        KardiganError::Config(msg) => Status::invalid_argument(msg),
        other => Status::internal(other.to_string()),
    }
}
