//! Bundle rule pipeline.
//!
//! A `BundleTemplate` folds a fixed sequence of rules over an empty bundle.
//! The order matters: later rules override decisions made by earlier, more
//! generic ones (a shared network namespace must beat the template's fresh
//! one).

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::spec::DesiredContainerSpec;

use super::templates::{BaseTemplates, CONTAINER_ROOT_ID};
use super::{Bundle, Mount, Namespace, Process};

/// Directories that must exist inside every rootfs before the runtime
/// pivots into it.
pub const ROOTFS_DIRS: [&str; 4] = ["dev", "proc", "sys", ".pivot_root"];

/// A transformation from one bundle value to the next.
pub trait BundleRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn apply(&self, bundle: Bundle, spec: &DesiredContainerSpec) -> Result<Bundle>;
}

/// Creates directories inside a rootfs on behalf of the RootFS rule.
pub trait DirCreator: Send + Sync {
    fn mkdir_chown(&self, rootfs: &Path, uid: u32, gid: u32, dirs: &[&str]) -> Result<()>;
}

/// Creates directories on the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostDirCreator;

impl DirCreator for HostDirCreator {
    fn mkdir_chown(&self, rootfs: &Path, uid: u32, gid: u32, dirs: &[&str]) -> Result<()> {
        for dir in dirs {
            let path = rootfs.join(dir);
            std::fs::create_dir_all(&path)?;
            std::os::unix::fs::chown(&path, Some(uid), Some(gid))?;
        }
        Ok(())
    }
}

/// Seeds the bundle from the privileged or unprivileged template.
pub struct Base {
    templates: Arc<BaseTemplates>,
}

impl BundleRule for Base {
    fn name(&self) -> &'static str {
        "base"
    }

    fn apply(&self, _bundle: Bundle, spec: &DesiredContainerSpec) -> Result<Bundle> {
        Ok(self.templates.select(spec.privileged).clone())
    }
}

/// Points the bundle at the rootfs and prepares its mount points.
pub struct RootFs {
    dirs: Arc<dyn DirCreator>,
}

impl BundleRule for RootFs {
    fn name(&self) -> &'static str {
        "rootfs"
    }

    fn apply(&self, bundle: Bundle, spec: &DesiredContainerSpec) -> Result<Bundle> {
        let owner = if spec.privileged { 0 } else { CONTAINER_ROOT_ID };
        self.dirs
            .mkdir_chown(&spec.rootfs_path, owner, owner, &ROOTFS_DIRS)?;
        Ok(bundle.with_root_path(spec.rootfs_path.to_string_lossy()))
    }
}

pub struct Limits;

impl BundleRule for Limits {
    fn name(&self) -> &'static str {
        "limits"
    }

    fn apply(&self, bundle: Bundle, spec: &DesiredContainerSpec) -> Result<Bundle> {
        if spec.limits.is_empty() {
            return Ok(bundle);
        }
        Ok(bundle.with_limits(&spec.limits))
    }
}

pub struct BindMounts;

impl BundleRule for BindMounts {
    fn name(&self) -> &'static str {
        "bind-mounts"
    }

    fn apply(&self, bundle: Bundle, spec: &DesiredContainerSpec) -> Result<Bundle> {
        let mounts = spec.bind_mounts.iter().map(|m| {
            let mode = if m.read_only { "ro" } else { "rw" };
            Mount::new(
                "bind",
                &m.src_path.to_string_lossy(),
                &m.dst_path.to_string_lossy(),
                &["bind", mode],
            )
        });
        Ok(bundle.with_mounts(mounts))
    }
}

pub struct Env;

impl BundleRule for Env {
    fn name(&self) -> &'static str {
        "env"
    }

    fn apply(&self, bundle: Bundle, spec: &DesiredContainerSpec) -> Result<Bundle> {
        Ok(bundle.with_env(&spec.env))
    }
}

pub struct Hostname;

impl BundleRule for Hostname {
    fn name(&self) -> &'static str {
        "hostname"
    }

    fn apply(&self, bundle: Bundle, spec: &DesiredContainerSpec) -> Result<Bundle> {
        if spec.hostname.is_empty() {
            return Ok(bundle);
        }
        Ok(bundle.with_hostname(spec.hostname.clone()))
    }
}

/// Joins the namespaces named in the desired spec and installs its process.
///
/// Runs last so that its namespace entries and process replace whatever the
/// template put there. A replaced process keeps the spec's environment.
pub struct NamespaceSharing;

impl BundleRule for NamespaceSharing {
    fn name(&self) -> &'static str {
        "namespace-sharing"
    }

    fn apply(&self, bundle: Bundle, spec: &DesiredContainerSpec) -> Result<Bundle> {
        let bundle = bundle.with_namespaces(
            spec.namespaces
                .iter()
                .map(|(kind, path)| Namespace::join(*kind, path.clone())),
        );
        Ok(match &spec.process {
            Some(process) => bundle
                .with_process(Process::from(process))
                .with_env(&spec.env),
            None => bundle,
        })
    }
}

/// The ordered rule pipeline.
pub struct BundleTemplate {
    rules: Vec<Box<dyn BundleRule>>,
}

impl BundleTemplate {
    /// Base, RootFS, Limits, BindMounts, Env, Hostname, Namespace-Sharing.
    pub fn new(templates: Arc<BaseTemplates>, dirs: Arc<dyn DirCreator>) -> Self {
        Self {
            rules: vec![
                Box::new(Base { templates }),
                Box::new(RootFs { dirs }),
                Box::new(Limits),
                Box::new(BindMounts),
                Box::new(Env),
                Box::new(Hostname),
                Box::new(NamespaceSharing),
            ],
        }
    }

    /// Rule names in application order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Apply every rule in order to produce the bundle for `spec`.
    pub fn generate(&self, spec: &DesiredContainerSpec) -> Result<Bundle> {
        self.rules.iter().try_fold(Bundle::new(), |bundle, rule| {
            tracing::debug!(handle = %spec.handle, rule = rule.name(), "applying bundle rule");
            rule.apply(bundle, spec)
        })
    }
}
