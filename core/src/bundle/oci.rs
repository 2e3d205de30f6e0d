//! OCI runtime configuration types.
//!
//! The subset of the OCI runtime spec (`config.json`) that kardigan bundles
//! carry. Field names follow the OCI runtime-spec JSON spelling so a serialised
//! `Bundle` can be handed straight to runc.
//!
//! Reference: https://github.com/opencontainers/runtime-spec/blob/main/config.md

use serde::{Deserialize, Serialize};

use crate::spec::NamespaceKind;

/// Root filesystem of the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub path: String,
    #[serde(default)]
    pub readonly: bool,
}

/// User the init process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    pub uid: u32,
    pub gid: u32,
}

/// Capability sets of the init process.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effective: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inheritable: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted: Vec<String>,
}

impl Capabilities {
    /// Grant the same capability list in every set except ambient.
    pub fn uniform<S: AsRef<str>>(caps: &[S]) -> Self {
        let caps: Vec<String> = caps.iter().map(|c| c.as_ref().to_string()).collect();
        Self {
            bounding: caps.clone(),
            effective: caps.clone(),
            inheritable: caps.clone(),
            permitted: caps,
        }
    }
}

/// Init process of the container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub user: User,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apparmor_profile: Option<String>,
    #[serde(default)]
    pub no_new_privileges: bool,
}

/// Filesystem mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Mount {
    pub fn new(kind: &str, source: &str, destination: &str, options: &[&str]) -> Self {
        Self {
            destination: destination.to_string(),
            kind: kind.to_string(),
            source: source.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Namespace to create, or to join when `path` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(rename = "type")]
    pub kind: NamespaceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Namespace {
    /// A fresh namespace of the given kind.
    pub fn new(kind: NamespaceKind) -> Self {
        Self { kind, path: None }
    }

    /// Join the namespace found at `path`.
    pub fn join(kind: NamespaceKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
        }
    }
}

/// User or group id mapping for user namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    #[serde(rename = "containerID")]
    pub container_id: u32,
    #[serde(rename = "hostID")]
    pub host_id: u32,
    pub size: u32,
}

/// Device cgroup rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRule {
    pub allow: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
}

impl DeviceRule {
    /// Deny every device.
    pub fn deny_all() -> Self {
        Self {
            allow: false,
            kind: None,
            major: None,
            minor: None,
            access: Some("rwm".to_string()),
        }
    }

    /// Allow read/write/mknod on one character device.
    pub fn allow_char(major: i64, minor: i64) -> Self {
        Self {
            allow: true,
            kind: Some("c".to_string()),
            major: Some(major),
            minor: Some(minor),
            access: Some("rwm".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryResources {
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuResources {
    pub shares: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidsResources {
    pub limit: i64,
}

/// cgroup resource section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids: Option<PidsResources>,
}

/// One seccomp rule covering a set of syscalls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyscallRule {
    pub names: Vec<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno_ret: Option<u32>,
}

/// Seccomp filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seccomp {
    pub default_action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub syscalls: Vec<SyscallRule>,
}

/// Linux-specific section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uid_mappings: Vec<IdMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gid_mappings: Vec<IdMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp: Option<Seccomp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_serializes_with_type_key() {
        let ns = Namespace::join(NamespaceKind::Network, "/proc/42/ns/net");
        let json = serde_json::to_value(&ns).unwrap();
        assert_eq!(json["type"], "network");
        assert_eq!(json["path"], "/proc/42/ns/net");

        let fresh = serde_json::to_value(Namespace::new(NamespaceKind::Mount)).unwrap();
        assert!(fresh.get("path").is_none());
    }

    #[test]
    fn test_id_mapping_uses_oci_field_names() {
        let mapping = IdMapping {
            container_id: 0,
            host_id: 100000,
            size: 1,
        };
        let json = serde_json::to_value(mapping).unwrap();
        assert_eq!(json["containerID"], 0);
        assert_eq!(json["hostID"], 100000);
    }

    #[test]
    fn test_device_rules() {
        let deny = DeviceRule::deny_all();
        assert!(!deny.allow);
        assert!(deny.kind.is_none());

        let null = DeviceRule::allow_char(1, 3);
        assert!(null.allow);
        assert_eq!(null.kind.as_deref(), Some("c"));
        assert_eq!((null.major, null.minor), (Some(1), Some(3)));
    }

    #[test]
    fn test_process_camel_case() {
        let process = Process {
            args: vec!["/bin/true".to_string()],
            cwd: "/".to_string(),
            apparmor_profile: Some("restricted".to_string()),
            no_new_privileges: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&process).unwrap();
        assert_eq!(json["apparmorProfile"], "restricted");
        assert_eq!(json["noNewPrivileges"], true);
        assert!(json.get("capabilities").is_none());
    }
}
