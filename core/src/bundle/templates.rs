//! Privileged and unprivileged base bundles.
//!
//! Both templates are built once at startup from `RuntimeConfig` and are
//! only ever cloned afterwards.

use crate::config::RuntimeConfig;
use crate::spec::NamespaceKind;

use super::{Bundle, DeviceRule, IdMapping, Mount, Namespace, Process, Resources, Seccomp, SyscallRule};

/// Path the init binary is bind-mounted to inside every container.
pub const INIT_MOUNT_PATH: &str = "/tmp/garden-init";

/// Host uid/gid that container root maps to in unprivileged containers.
pub const CONTAINER_ROOT_ID: u32 = 100000;

/// Namespaces every container gets fresh copies of.
pub const PRIVILEGED_NAMESPACES: [NamespaceKind; 5] = [
    NamespaceKind::Network,
    NamespaceKind::Pid,
    NamespaceKind::Uts,
    NamespaceKind::Ipc,
    NamespaceKind::Mount,
];

pub const UNPRIVILEGED_CAPABILITIES: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_FSETID",
    "CAP_FOWNER",
    "CAP_MKNOD",
    "CAP_NET_RAW",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETFCAP",
    "CAP_SETPCAP",
    "CAP_NET_BIND_SERVICE",
    "CAP_SYS_CHROOT",
    "CAP_KILL",
    "CAP_AUDIT_WRITE",
];

pub const PRIVILEGED_CAPABILITIES: &[&str] = &[
    "CAP_AUDIT_CONTROL",
    "CAP_AUDIT_READ",
    "CAP_AUDIT_WRITE",
    "CAP_BLOCK_SUSPEND",
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_KILL",
    "CAP_LEASE",
    "CAP_LINUX_IMMUTABLE",
    "CAP_MAC_ADMIN",
    "CAP_MAC_OVERRIDE",
    "CAP_MKNOD",
    "CAP_NET_ADMIN",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_RAW",
    "CAP_SETFCAP",
    "CAP_SETGID",
    "CAP_SETPCAP",
    "CAP_SETUID",
    "CAP_SYSLOG",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_CHROOT",
    "CAP_SYS_MODULE",
    "CAP_SYS_NICE",
    "CAP_SYS_PACCT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_WAKE_ALARM",
];

/// Character devices (major, minor) unprivileged containers may use:
/// null, zero, full, random, urandom, tty, ptmx.
pub const ALLOWED_DEVICES: [(i64, i64); 7] =
    [(1, 3), (1, 5), (1, 7), (1, 8), (1, 9), (5, 0), (5, 2)];

/// Syscalls refused with EPERM in unprivileged containers.
const DENIED_SYSCALLS: &[&str] = &[
    "acct",
    "add_key",
    "bpf",
    "clock_adjtime",
    "clock_settime",
    "create_module",
    "delete_module",
    "finit_module",
    "get_kernel_syms",
    "init_module",
    "ioperm",
    "iopl",
    "kexec_file_load",
    "kexec_load",
    "keyctl",
    "lookup_dcookie",
    "nfsservctl",
    "perf_event_open",
    "query_module",
    "reboot",
    "request_key",
    "settimeofday",
    "stime",
    "swapoff",
    "swapon",
    "sysfs",
    "_sysctl",
    "uselib",
    "ustat",
    "vm86",
    "vm86old",
];

/// The two read-only base bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTemplates {
    pub privileged: Bundle,
    pub unprivileged: Bundle,
}

impl BaseTemplates {
    /// Build both templates from the runtime configuration.
    pub fn new(config: &RuntimeConfig) -> Self {
        let base = Bundle::new()
            .with_namespaces(PRIVILEGED_NAMESPACES.iter().copied().map(Namespace::new))
            .with_resources(Resources {
                devices: default_devices(),
                ..Default::default()
            })
            .with_process(base_process())
            .with_mounts(common_mounts(config));

        let mut unprivileged = base
            .clone()
            .with_namespace(Namespace::new(NamespaceKind::User))
            .with_uid_mappings(id_mappings())
            .with_gid_mappings(id_mappings())
            .with_masked_paths(default_masked_paths())
            .with_seccomp(default_seccomp())
            .with_capabilities(UNPRIVILEGED_CAPABILITIES);
        if let Some(profile) = &config.apparmor_profile {
            unprivileged = unprivileged.with_apparmor_profile(profile.clone());
        }

        let privileged = base.with_capabilities(PRIVILEGED_CAPABILITIES);

        Self {
            privileged,
            unprivileged,
        }
    }

    /// Template for the given privilege level.
    pub fn select(&self, privileged: bool) -> &Bundle {
        if privileged {
            &self.privileged
        } else {
            &self.unprivileged
        }
    }
}

fn base_process() -> Process {
    Process {
        args: vec![INIT_MOUNT_PATH.to_string()],
        cwd: "/".to_string(),
        ..Default::default()
    }
}

fn common_mounts(config: &RuntimeConfig) -> Vec<Mount> {
    let mut mounts = vec![
        Mount::new("sysfs", "sysfs", "/sys", &["nosuid", "noexec", "nodev", "ro"]),
        Mount::new("tmpfs", "tmpfs", "/dev/shm", &[]),
        Mount::new(
            "devpts",
            "devpts",
            "/dev/pts",
            &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620"],
        ),
    ];
    if let Some(init) = &config.init_path {
        mounts.push(Mount::new(
            "bind",
            &init.to_string_lossy(),
            INIT_MOUNT_PATH,
            &["bind"],
        ));
    }
    mounts.push(Mount::new("proc", "proc", "/proc", &["nosuid", "noexec", "nodev"]));
    mounts
}

/// Deny-all followed by the fixed allow-list.
fn default_devices() -> Vec<DeviceRule> {
    std::iter::once(DeviceRule::deny_all())
        .chain(
            ALLOWED_DEVICES
                .iter()
                .map(|&(major, minor)| DeviceRule::allow_char(major, minor)),
        )
        .collect()
}

fn id_mappings() -> [IdMapping; 2] {
    [
        IdMapping {
            container_id: 0,
            host_id: CONTAINER_ROOT_ID,
            size: 1,
        },
        IdMapping {
            container_id: 1,
            host_id: 1,
            size: CONTAINER_ROOT_ID - 1,
        },
    ]
}

fn default_masked_paths() -> Vec<String> {
    [
        "/proc/kcore",
        "/proc/latency_stats",
        "/proc/timer_stats",
        "/proc/sched_debug",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_seccomp() -> Seccomp {
    Seccomp {
        default_action: "SCMP_ACT_ALLOW".to_string(),
        syscalls: vec![SyscallRule {
            names: DENIED_SYSCALLS.iter().map(|s| s.to_string()).collect(),
            action: "SCMP_ACT_ERRNO".to_string(),
            errno_ret: Some(libc::EPERM as u32),
        }],
    }
}
