//! Desired container specification.
//!
//! A `DesiredContainerSpec` describes what the containerizer must create. It
//! is built once per create request and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Linux namespace kinds a bundle may create or join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Network,
    User,
    Mount,
    Ipc,
    Pid,
    Uts,
}

impl NamespaceKind {
    /// OCI `config.json` name of the namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Network => "network",
            NamespaceKind::User => "user",
            NamespaceKind::Mount => "mount",
            NamespaceKind::Ipc => "ipc",
            NamespaceKind::Pid => "pid",
            NamespaceKind::Uts => "uts",
        }
    }

    /// Entry name under `/proc/<pid>/ns/`.
    pub fn proc_name(&self) -> &'static str {
        match self {
            NamespaceKind::Network => "net",
            NamespaceKind::User => "user",
            NamespaceKind::Mount => "mnt",
            NamespaceKind::Ipc => "ipc",
            NamespaceKind::Pid => "pid",
            NamespaceKind::Uts => "uts",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process to run as the container's init process.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Argument vector, program first
    pub args: Vec<String>,
    /// Working directory inside the container
    pub cwd: String,
    /// `KEY=value` environment entries
    pub env: Vec<String>,
}

/// Host path bind-mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub src_path: PathBuf,
    pub dst_path: PathBuf,
    pub read_only: bool,
}

/// Resource limits applied through the cgroup section of the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Limits {
    pub memory_limit_bytes: Option<i64>,
    pub cpu_shares: Option<u64>,
    pub pid_limit: Option<i64>,
}

impl Limits {
    pub fn is_empty(&self) -> bool {
        self.memory_limit_bytes.is_none() && self.cpu_shares.is_none() && self.pid_limit.is_none()
    }
}

/// Everything the containerizer needs to create a sandbox or container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DesiredContainerSpec {
    /// Unique handle naming the container inside the containerizer
    pub handle: String,
    /// Host path of the root filesystem
    pub rootfs_path: PathBuf,
    /// Hostname, empty to keep the template's
    pub hostname: String,
    /// Select the privileged base template
    pub privileged: bool,
    /// External namespaces to join, one path per kind
    pub namespaces: BTreeMap<NamespaceKind, String>,
    /// Replacement for the template's init process
    pub process: Option<ProcessSpec>,
    /// Extra `KEY=value` entries appended to the template's process
    pub env: Vec<String>,
    pub bind_mounts: Vec<BindMount>,
    pub limits: Limits,
    /// Free-form metadata recorded alongside the container
    pub properties: BTreeMap<String, String>,
}

impl DesiredContainerSpec {
    /// Start a spec for the given handle and rootfs.
    pub fn new(handle: impl Into<String>, rootfs_path: impl Into<PathBuf>) -> Self {
        Self {
            handle: handle.into(),
            rootfs_path: rootfs_path.into(),
            ..Default::default()
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Join the given namespaces. Later entries for the same kind win.
    pub fn with_namespaces(
        mut self,
        namespaces: impl IntoIterator<Item = (NamespaceKind, String)>,
    ) -> Self {
        self.namespaces.extend(namespaces);
        self
    }

    pub fn with_process(mut self, process: ProcessSpec) -> Self {
        self.process = Some(process);
        self
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_bind_mounts(mut self, bind_mounts: Vec<BindMount>) -> Self {
        self.bind_mounts = bind_mounts;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
