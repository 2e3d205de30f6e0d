//! Namespace sharing policy between a pod sandbox and its containers.
//!
//! Containers join the sandbox's network and user namespaces. Mount, IPC,
//! PID and UTS namespaces are never shared: each container gets its own.

use std::collections::BTreeMap;

use crate::spec::NamespaceKind;

/// Namespace kinds a container inherits from its sandbox.
pub const SHARED_KINDS: [NamespaceKind; 2] = [NamespaceKind::Network, NamespaceKind::User];

/// `/proc` path of the `kind` namespace of process `pid`.
pub fn namespace_path(pid: u32, kind: NamespaceKind) -> String {
    format!("/proc/{}/ns/{}", pid, kind.proc_name())
}

/// Namespace paths a container must join given its sandbox's pid.
///
/// Only builds paths; whether they exist is checked when the bundle is
/// created.
pub fn shared_namespaces(sandbox_pid: u32) -> BTreeMap<NamespaceKind, String> {
    SHARED_KINDS
        .iter()
        .map(|&kind| (kind, namespace_path(sandbox_pid, kind)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_and_user_paths() {
        let shared = shared_namespaces(1234);
        assert_eq!(shared.len(), 2);
        assert_eq!(shared[&NamespaceKind::Network], "/proc/1234/ns/net");
        assert_eq!(shared[&NamespaceKind::User], "/proc/1234/ns/user");
    }

    #[test]
    fn test_mount_never_shared() {
        for pid in [0, 1, 42, 4242, u32::MAX] {
            let shared = shared_namespaces(pid);
            assert!(!shared.contains_key(&NamespaceKind::Mount));
            assert!(!shared.contains_key(&NamespaceKind::Pid));
            assert!(!shared.contains_key(&NamespaceKind::Ipc));
            assert!(!shared.contains_key(&NamespaceKind::Uts));
        }
    }

    #[test]
    fn test_namespace_path_uses_proc_names() {
        assert_eq!(namespace_path(7, NamespaceKind::Mount), "/proc/7/ns/mnt");
        assert_eq!(namespace_path(7, NamespaceKind::Network), "/proc/7/ns/net");
    }
}
