//! Containerizer: turns desired specs into OCI containers.
//!
//! `Containerizer` is the narrow interface the CRI adapter consumes.
//! `BundleContainerizer` implements it by running the bundle rule pipeline,
//! storing the result in the depot and driving an OCI runtime.

pub mod depot;
pub mod properties;
pub mod runc;
pub mod supervisor;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::bundle::BundleTemplate;
use crate::error::{KardiganError, Result};
use crate::spec::DesiredContainerSpec;

pub use depot::Depot;
pub use properties::{Properties, PropertyStore};
pub use runc::{OciRuntime, RuncBinary, RuntimeState, Signal};

/// What the containerizer knows about a live container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// OS pid of the container's init process
    pub pid: u32,
    /// Directory holding the container's bundle and artifacts
    pub bundle_path: PathBuf,
    /// Runtime status as reported by the OCI runtime (`created`, `running`,
    /// `stopped`, ...)
    pub status: String,
    pub properties: Properties,
}

/// Container lifecycle operations over OCI bundles.
#[async_trait]
pub trait Containerizer: Send + Sync {
    async fn create(&self, spec: DesiredContainerSpec) -> Result<()>;

    async fn start(&self, handle: &str) -> Result<()>;

    /// Signal the container's init process; `force` sends SIGKILL.
    async fn stop(&self, handle: &str, force: bool) -> Result<()>;

    async fn destroy(&self, handle: &str) -> Result<()>;

    async fn info(&self, handle: &str) -> Result<ContainerInfo>;
}

/// Containerizer backed by the depot and an OCI runtime.
pub struct BundleContainerizer {
    template: BundleTemplate,
    depot: Depot,
    runtime: Arc<dyn OciRuntime>,
    properties: PropertyStore,
    /// Exit watcher of every container created by this process.
    watchers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl BundleContainerizer {
    pub fn new(
        template: BundleTemplate,
        depot: Depot,
        runtime: Arc<dyn OciRuntime>,
        properties: PropertyStore,
    ) -> Self {
        Self {
            template,
            depot,
            runtime,
            properties,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    pub fn depot(&self) -> &Depot {
        &self.depot
    }
}

/// Namespaces are joined by path; a missing path means the process that
/// owned them (usually the sandbox) is gone.
async fn ensure_namespaces_exist(spec: &DesiredContainerSpec) -> Result<()> {
    for (kind, path) in &spec.namespaces {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(KardiganError::NotFound(format!(
                "{} namespace {} no longer exists",
                kind, path
            )));
        }
    }
    Ok(())
}

/// How long removal waits for a killed init to be reaped before the
/// bundle directory goes away.
const REAP_GRACE: Duration = Duration::from_secs(2);

async fn await_watcher(handle: &str, watcher: Option<JoinHandle<()>>) {
    if let Some(watcher) = watcher {
        if tokio::time::timeout(REAP_GRACE, watcher).await.is_err() {
            tracing::warn!(handle = %handle, "container init not reaped in time");
        }
    }
}

/// Undoes a half-created container unless disarmed.
///
/// Armed once the bundle is in the depot. Error paths call `rollback`; if
/// the create future is dropped instead (a cancelled or timed-out call) the
/// same cleanup runs on a spawned task.
struct CreateGuard {
    handle: String,
    depot: Depot,
    runtime: Arc<dyn OciRuntime>,
    watcher: Option<JoinHandle<()>>,
    armed: bool,
}

impl CreateGuard {
    fn new(handle: &str, depot: &Depot, runtime: &Arc<dyn OciRuntime>) -> Self {
        Self {
            handle: handle.to_string(),
            depot: depot.clone(),
            runtime: runtime.clone(),
            watcher: None,
            armed: true,
        }
    }

    fn watch(&mut self, watcher: JoinHandle<()>) {
        self.watcher = Some(watcher);
    }

    /// Keep the container; hands back its exit watcher.
    fn disarm(mut self) -> Option<JoinHandle<()>> {
        self.armed = false;
        self.watcher.take()
    }

    async fn rollback(mut self) {
        self.armed = false;
        let watcher = self.watcher.take();
        remove_partial(&self.handle, &self.depot, self.runtime.as_ref(), watcher).await;
    }
}

impl Drop for CreateGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                tracing::warn!(handle = %self.handle, "create abandoned, removing partial container");
                let handle = std::mem::take(&mut self.handle);
                let depot = self.depot.clone();
                let runtime = self.runtime.clone();
                let watcher = self.watcher.take();
                rt.spawn(async move {
                    remove_partial(&handle, &depot, runtime.as_ref(), watcher).await;
                });
            }
            Err(_) => {
                tracing::warn!(handle = %self.handle, "create abandoned outside a runtime, bundle left in depot");
            }
        }
    }
}

async fn remove_partial(
    handle: &str,
    depot: &Depot,
    runtime: &dyn OciRuntime,
    watcher: Option<JoinHandle<()>>,
) {
    if let Err(e) = runtime.delete(handle).await {
        tracing::warn!(handle = %handle, error = %e, "failed to delete partial container");
    }
    await_watcher(handle, watcher).await;
    match depot.destroy(handle).await {
        Ok(()) | Err(KardiganError::NotFound(_)) => {}
        Err(e) => tracing::warn!(handle = %handle, error = %e, "failed to remove partial bundle"),
    }
}

#[async_trait]
impl Containerizer for BundleContainerizer {
    async fn create(&self, spec: DesiredContainerSpec) -> Result<()> {
        ensure_namespaces_exist(&spec).await?;

        let bundle = self.template.generate(&spec)?;
        let bundle_dir = self.depot.create(&spec.handle, &bundle).await?;
        let mut guard = CreateGuard::new(&spec.handle, &self.depot, &self.runtime);

        if let Err(e) = self.runtime.create(&spec.handle, &bundle_dir).await {
            tracing::warn!(handle = %spec.handle, error = %e, "runtime create failed, removing bundle");
            guard.rollback().await;
            return Err(e);
        }

        // The init is our child from here on; watch it whether or not it is
        // ever started so it is always reaped.
        let pid = match self.runtime.state(&spec.handle).await {
            Ok(state) => state.pid,
            Err(e) => {
                tracing::warn!(handle = %spec.handle, error = %e, "runtime state failed after create");
                guard.rollback().await;
                return Err(e);
            }
        };
        guard.watch(supervisor::spawn_exit_watcher(
            self.runtime.clone(),
            spec.handle.clone(),
            pid,
            bundle_dir,
        ));

        if let Err(e) = self.properties.set(&spec.handle, spec.properties).await {
            tracing::warn!(handle = %spec.handle, error = %e, "failed to record properties, removing container");
            guard.rollback().await;
            return Err(e);
        }

        if let Some(watcher) = guard.disarm() {
            self.watchers.lock().insert(spec.handle.clone(), watcher);
        }
        tracing::debug!(handle = %spec.handle, pid, "container created");
        Ok(())
    }

    async fn start(&self, handle: &str) -> Result<()> {
        self.depot.lookup(handle).await?;
        self.runtime.start(handle).await?;
        tracing::debug!(handle = %handle, "container started");
        Ok(())
    }

    async fn stop(&self, handle: &str, force: bool) -> Result<()> {
        self.depot.lookup(handle).await?;
        let signal = if force { Signal::Kill } else { Signal::Term };
        self.runtime.kill(handle, signal).await
    }

    async fn destroy(&self, handle: &str) -> Result<()> {
        self.depot.lookup(handle).await?;
        self.runtime.delete(handle).await?;
        let watcher = self.watchers.lock().remove(handle);
        await_watcher(handle, watcher).await;
        self.depot.destroy(handle).await?;
        self.properties.remove(handle).await?;
        tracing::debug!(handle = %handle, "container destroyed");
        Ok(())
    }

    async fn info(&self, handle: &str) -> Result<ContainerInfo> {
        let bundle_path = self.depot.lookup(handle).await?;
        let state = self.runtime.state(handle).await?;
        Ok(ContainerInfo {
            pid: state.pid,
            bundle_path,
            status: state.status,
            properties: self.properties.get(handle),
        })
    }
}
