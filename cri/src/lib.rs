//! Kardigan CRI - Kubernetes Container Runtime Interface adapter.
//!
//! Maps CRI concepts onto the kardigan containerizer:
//! - Pod Sandbox → container built from the base bundle
//! - Container → container sharing its sandbox's network and user namespaces

pub mod config_mapper;
pub mod error;
pub mod id;
pub mod runtime_service;
pub mod server;

/// Generated CRI v1 protobuf types.
pub mod cri_api {
    tonic::include_proto!("runtime.v1");
}
