use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KardiganError, Result};

/// Process-wide runtime configuration.
///
/// Built once at startup and shared read-only afterwards. Request handlers
/// never consult flags or environment directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Unix domain socket the CRI server listens on
    pub socket_path: PathBuf,

    /// Directory holding one bundle directory per handle
    pub depot_path: PathBuf,

    /// OCI runtime executable (runc compatible)
    pub runtime_path: PathBuf,

    /// State root passed to the OCI runtime via `--root`
    pub runtime_root: PathBuf,

    /// JSON file storing per-handle properties
    pub props_path: PathBuf,

    /// Init binary bind-mounted into every container as its init process
    pub init_path: Option<PathBuf>,

    /// Root filesystem used for sandboxes and containers
    pub sandbox_rootfs: PathBuf,

    /// AppArmor profile applied to unprivileged containers
    pub apparmor_profile: Option<String>,

    /// Upper bound for a single containerizer call
    pub call_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/kardigan.sock"),
            depot_path: PathBuf::from("/var/run/kardigan/depot"),
            runtime_path: PathBuf::from("/usr/local/bin/runc"),
            runtime_root: PathBuf::from("/run/runc"),
            props_path: PathBuf::from("/var/run/kardigan/props.json"),
            init_path: None,
            sandbox_rootfs: PathBuf::from("/opt/warden/rootfs"),
            apparmor_profile: None,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RuntimeConfig {
    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(KardiganError::Config("socket path must not be empty".to_string()));
        }
        if self.depot_path.as_os_str().is_empty() {
            return Err(KardiganError::Config("depot path must not be empty".to_string()));
        }
        if self.call_timeout.is_zero() {
            return Err(KardiganError::Config("call timeout must be positive".to_string()));
        }
        Ok(())
    }
}
