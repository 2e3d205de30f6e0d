//! OCI bundle values.
//!
//! A `Bundle` is an in-progress OCI runtime configuration. Every `with_*`
//! method consumes the bundle and returns the updated value, so deriving a
//! per-container bundle from a shared template never touches the template.

pub mod oci;
pub mod rules;
pub mod templates;

use serde::{Deserialize, Serialize};

use crate::spec::{Limits, NamespaceKind, ProcessSpec};

pub use oci::{
    Capabilities, CpuResources, DeviceRule, IdMapping, Linux, MemoryResources, Mount, Namespace,
    PidsResources, Process, Resources, Root, Seccomp, SyscallRule, User,
};
pub use rules::{BundleRule, BundleTemplate, DirCreator, HostDirCreator};
pub use templates::BaseTemplates;

/// OCI runtime spec version written into every bundle.
pub const OCI_VERSION: &str = "1.0.2";

/// OCI runtime configuration under construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub oci_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<Root>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<Process>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub linux: Linux,
}

impl Default for Bundle {
    fn default() -> Self {
        Self {
            oci_version: OCI_VERSION.to_string(),
            root: None,
            process: None,
            hostname: None,
            mounts: Vec::new(),
            linux: Linux::default(),
        }
    }
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace namespaces; at most one entry per kind survives.
    pub fn with_namespaces(self, namespaces: impl IntoIterator<Item = Namespace>) -> Self {
        namespaces
            .into_iter()
            .fold(self, |bundle, ns| bundle.with_namespace(ns))
    }

    /// Add a namespace, replacing any existing entry of the same kind.
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        match self
            .linux
            .namespaces
            .iter_mut()
            .find(|ns| ns.kind == namespace.kind)
        {
            Some(existing) => *existing = namespace,
            None => self.linux.namespaces.push(namespace),
        }
        self
    }

    /// Namespace entry for `kind`, if the bundle has one.
    pub fn namespace(&self, kind: NamespaceKind) -> Option<&Namespace> {
        self.linux.namespaces.iter().find(|ns| ns.kind == kind)
    }

    pub fn with_uid_mappings(mut self, mappings: impl IntoIterator<Item = IdMapping>) -> Self {
        self.linux.uid_mappings.extend(mappings);
        self
    }

    pub fn with_gid_mappings(mut self, mappings: impl IntoIterator<Item = IdMapping>) -> Self {
        self.linux.gid_mappings.extend(mappings);
        self
    }

    /// Append mounts after the ones already present.
    pub fn with_mounts(mut self, mounts: impl IntoIterator<Item = Mount>) -> Self {
        self.mounts.extend(mounts);
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.linux.resources = Some(resources);
        self
    }

    /// Overlay memory, cpu and pids limits, keeping the device rules.
    pub fn with_limits(mut self, limits: &Limits) -> Self {
        let resources = self.linux.resources.get_or_insert_with(Resources::default);
        if let Some(limit) = limits.memory_limit_bytes {
            resources.memory = Some(MemoryResources { limit });
        }
        if let Some(shares) = limits.cpu_shares {
            resources.cpu = Some(CpuResources { shares });
        }
        if let Some(limit) = limits.pid_limit {
            resources.pids = Some(PidsResources { limit });
        }
        self
    }

    pub fn with_process(mut self, process: Process) -> Self {
        self.process = Some(process);
        self
    }

    /// Append environment entries to the current process.
    pub fn with_env(mut self, env: &[String]) -> Self {
        if env.is_empty() {
            return self;
        }
        self.process
            .get_or_insert_with(Process::default)
            .env
            .extend(env.iter().cloned());
        self
    }

    pub fn with_capabilities<S: AsRef<str>>(mut self, caps: &[S]) -> Self {
        self.process.get_or_insert_with(Process::default).capabilities =
            Some(Capabilities::uniform(caps));
        self
    }

    pub fn with_apparmor_profile(mut self, profile: impl Into<String>) -> Self {
        self.process.get_or_insert_with(Process::default).apparmor_profile = Some(profile.into());
        self
    }

    pub fn with_masked_paths(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        self.linux.masked_paths.extend(paths);
        self
    }

    pub fn with_seccomp(mut self, seccomp: Seccomp) -> Self {
        self.linux.seccomp = Some(seccomp);
        self
    }

    pub fn with_root_path(mut self, path: impl Into<String>) -> Self {
        self.root = Some(Root {
            path: path.into(),
            readonly: false,
        });
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Pretty-printed `config.json` contents.
    pub fn to_config_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<&ProcessSpec> for Process {
    fn from(spec: &ProcessSpec) -> Self {
        Self {
            args: spec.args.clone(),
            cwd: spec.cwd.clone(),
            env: spec.env.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_namespace_replaces_same_kind() {
        let bundle = Bundle::new()
            .with_namespace(Namespace::new(NamespaceKind::Network))
            .with_namespace(Namespace::new(NamespaceKind::Mount))
            .with_namespace(Namespace::join(NamespaceKind::Network, "/proc/7/ns/net"));

        assert_eq!(bundle.linux.namespaces.len(), 2);
        assert_eq!(
            bundle.namespace(NamespaceKind::Network).unwrap().path.as_deref(),
            Some("/proc/7/ns/net")
        );
        // replacement keeps the original position
        assert_eq!(bundle.linux.namespaces[0].kind, NamespaceKind::Network);
    }

    #[test]
    fn test_derived_bundle_leaves_template_untouched() {
        let template = Bundle::new().with_namespace(Namespace::new(NamespaceKind::Pid));
        let derived = template
            .clone()
            .with_namespace(Namespace::join(NamespaceKind::Pid, "/proc/1/ns/pid"))
            .with_hostname("derived");

        assert!(template.namespace(NamespaceKind::Pid).unwrap().path.is_none());
        assert!(template.hostname.is_none());
        assert_eq!(derived.hostname.as_deref(), Some("derived"));
    }

    #[test]
    fn test_with_limits_keeps_devices() {
        let bundle = Bundle::new()
            .with_resources(Resources {
                devices: vec![DeviceRule::deny_all()],
                ..Default::default()
            })
            .with_limits(&Limits {
                memory_limit_bytes: Some(64 * 1024 * 1024),
                cpu_shares: Some(512),
                pid_limit: None,
            });

        let resources = bundle.linux.resources.unwrap();
        assert_eq!(resources.devices.len(), 1);
        assert_eq!(resources.memory.unwrap().limit, 64 * 1024 * 1024);
        assert_eq!(resources.cpu.unwrap().shares, 512);
        assert!(resources.pids.is_none());
    }

    #[test]
    fn test_with_env_appends() {
        let bundle = Bundle::new()
            .with_process(Process {
                args: vec!["/init".to_string()],
                cwd: "/".to_string(),
                env: vec!["A=1".to_string()],
                ..Default::default()
            })
            .with_env(&["B=2".to_string()]);

        assert_eq!(bundle.process.unwrap().env, vec!["A=1", "B=2"]);
    }

    #[test]
    fn test_config_json_shape() {
        let bundle = Bundle::new()
            .with_root_path("/opt/rootfs")
            .with_hostname("the-hostname")
            .with_namespace(Namespace::new(NamespaceKind::Uts));

        let json: serde_json::Value =
            serde_json::from_str(&bundle.to_config_json().unwrap()).unwrap();
        assert_eq!(json["ociVersion"], OCI_VERSION);
        assert_eq!(json["root"]["path"], "/opt/rootfs");
        assert_eq!(json["hostname"], "the-hostname");
        assert_eq!(json["linux"]["namespaces"][0]["type"], "uts");
    }

    #[test]
    fn test_process_from_spec() {
        let spec = ProcessSpec {
            args: vec!["/bin/sh".to_string(), "-c".to_string(), "exit 55".to_string()],
            cwd: "/work".to_string(),
            env: vec!["FOO=bar".to_string()],
        };
        let process = Process::from(&spec);
        assert_eq!(process.args.len(), 3);
        assert_eq!(process.cwd, "/work");
        assert!(process.capabilities.is_none());
    }
}
