//! Map CRI sandbox and container configs to desired container specs.
//!
//! Properties recorded with each handle:
//! - sandboxes: `pod.name`, `pod.uid`, `pod.namespace`, `pod.label.<key>`
//! - containers: `container.name`, `container.image`, `container.sandbox`

use std::path::Path;

use kardigan_core::namespace::shared_namespaces;
use kardigan_core::spec::{BindMount, DesiredContainerSpec, Limits, ProcessSpec};

use crate::cri_api::{ContainerConfig, PodSandboxConfig};

pub const PROP_POD_NAME: &str = "pod.name";
pub const PROP_POD_UID: &str = "pod.uid";
pub const PROP_POD_NAMESPACE: &str = "pod.namespace";
pub const PROP_POD_LABEL_PREFIX: &str = "pod.label.";
pub const PROP_CONTAINER_NAME: &str = "container.name";
pub const PROP_CONTAINER_IMAGE: &str = "container.image";
pub const PROP_CONTAINER_SANDBOX: &str = "container.sandbox";

/// Working directory used when a container config leaves it empty.
pub const DEFAULT_WORKING_DIR: &str = "/";

/// Desired spec for a pod sandbox: base bundle, sandbox rootfs and the
/// requested hostname.
pub fn sandbox_spec(
    handle: &str,
    rootfs: &Path,
    config: &PodSandboxConfig,
) -> DesiredContainerSpec {
    let privileged = config
        .linux
        .as_ref()
        .and_then(|l| l.security_context.as_ref())
        .map(|sc| sc.privileged)
        .unwrap_or(false);

    let mut spec = DesiredContainerSpec::new(handle, rootfs)
        .with_hostname(config.hostname.clone())
        .with_privileged(privileged);

    if let Some(metadata) = &config.metadata {
        spec = spec
            .with_property(PROP_POD_NAME, metadata.name.clone())
            .with_property(PROP_POD_UID, metadata.uid.clone())
            .with_property(PROP_POD_NAMESPACE, metadata.namespace.clone());
    }
    for (key, value) in &config.labels {
        spec = spec.with_property(format!("{}{}", PROP_POD_LABEL_PREFIX, key), value.clone());
    }
    spec
}

/// Desired spec for a container joining the namespaces of the sandbox
/// whose init process is `sandbox_pid`.
pub fn container_spec(
    handle: &str,
    rootfs: &Path,
    sandbox_id: &str,
    sandbox_pid: u32,
    config: &ContainerConfig,
) -> DesiredContainerSpec {
    let args: Vec<String> = config
        .command
        .iter()
        .chain(config.args.iter())
        .cloned()
        .collect();

    let cwd = if config.working_dir.is_empty() {
        DEFAULT_WORKING_DIR.to_string()
    } else {
        config.working_dir.clone()
    };

    let env: Vec<String> = config
        .envs
        .iter()
        .map(|kv| format!("{}={}", kv.key, kv.value))
        .collect();

    let bind_mounts = config
        .mounts
        .iter()
        .map(|m| BindMount {
            src_path: m.host_path.clone().into(),
            dst_path: m.container_path.clone().into(),
            read_only: m.readonly,
        })
        .collect();

    let linux = config.linux.as_ref();
    let privileged = linux
        .and_then(|l| l.security_context.as_ref())
        .map(|sc| sc.privileged)
        .unwrap_or(false);
    let limits = linux
        .and_then(|l| l.resources.as_ref())
        .map(|r| Limits {
            memory_limit_bytes: (r.memory_limit_in_bytes > 0).then_some(r.memory_limit_in_bytes),
            cpu_shares: (r.cpu_shares > 0).then_some(r.cpu_shares as u64),
            pid_limit: None,
        })
        .unwrap_or_default();

    let name = config
        .metadata
        .as_ref()
        .map(|m| m.name.clone())
        .unwrap_or_default();
    let image = config
        .image
        .as_ref()
        .map(|i| i.image.clone())
        .unwrap_or_default();

    DesiredContainerSpec::new(handle, rootfs)
        .with_privileged(privileged)
        .with_namespaces(shared_namespaces(sandbox_pid))
        .with_process(ProcessSpec {
            args,
            cwd,
            env: Vec::new(),
        })
        .with_env(env)
        .with_bind_mounts(bind_mounts)
        .with_limits(limits)
        .with_property(PROP_CONTAINER_NAME, name)
        .with_property(PROP_CONTAINER_IMAGE, image)
        .with_property(PROP_CONTAINER_SANDBOX, sandbox_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri_api::{
        ContainerMetadata, ImageSpec, KeyValue, LinuxContainerConfig, LinuxContainerResources,
        LinuxContainerSecurityContext, LinuxPodSandboxConfig, LinuxSandboxSecurityContext,
        Mount, PodSandboxMetadata,
    };
    use kardigan_core::spec::NamespaceKind;
    use std::path::PathBuf;

    fn pod_config() -> PodSandboxConfig {
        PodSandboxConfig {
            metadata: Some(PodSandboxMetadata {
                name: "potato".to_string(),
                uid: "uid-1".to_string(),
                namespace: "vegetable".to_string(),
                attempt: 0,
            }),
            hostname: "the-hostname".to_string(),
            labels: [("app".to_string(), "fries".to_string())].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sandbox_spec_hostname_and_properties() {
        let spec = sandbox_spec("sb-1", Path::new("/opt/warden/rootfs"), &pod_config());

        assert_eq!(spec.handle, "sb-1");
        assert_eq!(spec.rootfs_path, PathBuf::from("/opt/warden/rootfs"));
        assert_eq!(spec.hostname, "the-hostname");
        assert!(!spec.privileged);
        assert!(spec.namespaces.is_empty());
        assert!(spec.process.is_none());
        assert_eq!(spec.properties[PROP_POD_NAME], "potato");
        assert_eq!(spec.properties[PROP_POD_UID], "uid-1");
        assert_eq!(spec.properties[PROP_POD_NAMESPACE], "vegetable");
        assert_eq!(spec.properties["pod.label.app"], "fries");
    }

    #[test]
    fn test_sandbox_spec_privileged() {
        let mut config = pod_config();
        config.linux = Some(LinuxPodSandboxConfig {
            cgroup_parent: String::new(),
            security_context: Some(LinuxSandboxSecurityContext {
                readonly_rootfs: false,
                privileged: true,
            }),
        });
        assert!(sandbox_spec("sb", Path::new("/"), &config).privileged);
    }

    #[test]
    fn test_sandbox_spec_without_metadata() {
        let spec = sandbox_spec("sb", Path::new("/"), &PodSandboxConfig::default());
        assert!(spec.properties.is_empty());
        assert!(spec.hostname.is_empty());
    }

    #[test]
    fn test_container_spec_shares_sandbox_namespaces() {
        let config = ContainerConfig {
            command: vec!["/bin/echo".to_string()],
            args: vec!["hello".to_string()],
            ..Default::default()
        };
        let spec = container_spec("ctr", Path::new("/rootfs"), "sb-1", 42, &config);

        assert_eq!(spec.namespaces.len(), 2);
        assert_eq!(spec.namespaces[&NamespaceKind::Network], "/proc/42/ns/net");
        assert_eq!(spec.namespaces[&NamespaceKind::User], "/proc/42/ns/user");
        assert!(!spec.namespaces.contains_key(&NamespaceKind::Mount));

        let process = spec.process.unwrap();
        assert_eq!(process.args, vec!["/bin/echo", "hello"]);
        assert_eq!(process.cwd, "/");
        assert_eq!(spec.properties[PROP_CONTAINER_SANDBOX], "sb-1");
    }

    #[test]
    fn test_container_spec_working_dir_is_authoritative() {
        let config = ContainerConfig {
            command: vec!["pwd".to_string()],
            working_dir: "/srv/app".to_string(),
            ..Default::default()
        };
        let spec = container_spec("ctr", Path::new("/rootfs"), "sb", 1, &config);
        assert_eq!(spec.process.unwrap().cwd, "/srv/app");
    }

    #[test]
    fn test_container_spec_env_mounts_and_limits() {
        let config = ContainerConfig {
            metadata: Some(ContainerMetadata {
                name: "web".to_string(),
                attempt: 0,
            }),
            image: Some(ImageSpec {
                image: "docker.io/library/busybox:latest".to_string(),
                annotations: Default::default(),
            }),
            command: vec!["sh".to_string()],
            envs: vec![KeyValue {
                key: "FOO".to_string(),
                value: "bar".to_string(),
            }],
            mounts: vec![Mount {
                container_path: "/data".to_string(),
                host_path: "/var/lib/data".to_string(),
                readonly: true,
            }],
            linux: Some(LinuxContainerConfig {
                resources: Some(LinuxContainerResources {
                    cpu_period: 0,
                    cpu_quota: 0,
                    cpu_shares: 512,
                    memory_limit_in_bytes: 0,
                }),
                security_context: Some(LinuxContainerSecurityContext {
                    privileged: true,
                    readonly_rootfs: false,
                }),
            }),
            ..Default::default()
        };
        let spec = container_spec("ctr", Path::new("/rootfs"), "sb", 7, &config);

        assert!(spec.privileged);
        assert_eq!(spec.env, vec!["FOO=bar"]);
        assert!(spec.process.as_ref().unwrap().env.is_empty());
        assert_eq!(spec.bind_mounts.len(), 1);
        assert_eq!(spec.bind_mounts[0].src_path, PathBuf::from("/var/lib/data"));
        assert_eq!(spec.bind_mounts[0].dst_path, PathBuf::from("/data"));
        assert!(spec.bind_mounts[0].read_only);
        assert_eq!(spec.limits.cpu_shares, Some(512));
        assert_eq!(spec.limits.memory_limit_bytes, None);
        assert_eq!(spec.properties[PROP_CONTAINER_NAME], "web");
        assert_eq!(
            spec.properties[PROP_CONTAINER_IMAGE],
            "docker.io/library/busybox:latest"
        );
    }
}
