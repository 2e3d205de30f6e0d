//! Kardigan Core - bundle assembly and the containerizer
//!
//! Turns desired container specs into OCI runtime bundles and drives an OCI
//! runtime with them:
//! - `bundle`: bundle values, base templates and the ordered rule pipeline
//! - `namespace`: which sandbox namespaces a container joins
//! - `exit_status`: exit codes recorded by the exit supervisor
//! - `containerizer`: the `Containerizer` interface and its depot/runc
//!   implementation

pub mod bundle;
pub mod config;
pub mod containerizer;
pub mod error;
pub mod exit_status;
pub mod namespace;
pub mod spec;

// Re-export commonly used types
pub use bundle::{BaseTemplates, Bundle, BundleTemplate};
pub use config::RuntimeConfig;
pub use containerizer::{BundleContainerizer, ContainerInfo, Containerizer};
pub use error::{KardiganError, Result};
pub use spec::{DesiredContainerSpec, NamespaceKind, ProcessSpec};

/// Kardigan version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
