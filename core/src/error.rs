use thiserror::Error;

/// Kardigan error types
#[derive(Error, Debug)]
pub enum KardiganError {
    /// Referenced sandbox, container or namespace is unknown
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bundle assembly or containerizer create failed
    #[error("Creation failed: {0}")]
    CreationFailed(String),

    /// Operation not supported by this runtime
    #[error("Not implemented: {0}")]
    Unimplemented(String),

    /// Internal failure, e.g. identifier generation
    #[error("Internal error: {0}")]
    Internal(String),

    /// A containerizer call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// OCI runtime command returned a failure
    #[error("OCI runtime {command} failed: {message}")]
    Runtime { command: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KardiganError {
    /// Fold a create-path failure into `CreationFailed`.
    ///
    /// `NotFound` and `Timeout` keep their identity so callers can still tell
    /// a vanished sandbox or an expired deadline apart from a broken bundle.
    pub fn into_creation_failure(self) -> Self {
        match self {
            err @ (KardiganError::NotFound(_)
            | KardiganError::Timeout(_)
            | KardiganError::CreationFailed(_)) => err,
            other => KardiganError::CreationFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for KardiganError {
    fn from(err: serde_json::Error) -> Self {
        KardiganError::Serialization(err.to_string())
    }
}

/// Result type alias for kardigan operations
pub type Result<T> = std::result::Result<T, KardiganError>;
