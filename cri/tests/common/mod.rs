//! Shared harness: the CRI server over a real Unix socket, backed by the
//! bundle containerizer and an in-memory OCI runtime.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use kardigan_core::bundle::{BaseTemplates, BundleTemplate, DirCreator};
use kardigan_core::containerizer::{
    BundleContainerizer, Depot, OciRuntime, PropertyStore, RuntimeState, Signal,
};
use kardigan_core::error::{KardiganError, Result};
use kardigan_core::RuntimeConfig;
use kardigan_cri::cri_api::runtime_service_client::RuntimeServiceClient;
use kardigan_cri::runtime_service::KardiganRuntimeService;
use kardigan_cri::server::CriServer;

/// Pid above any possible pid_max.
pub const DEAD_PID: u32 = 99_999_999;

/// Rootfs directory creation needs root; tests skip it.
struct NoopDirs;

impl DirCreator for NoopDirs {
    fn mkdir_chown(&self, _: &Path, _: u32, _: u32, _: &[&str]) -> Result<()> {
        Ok(())
    }
}

/// In-memory stand-in for runc. Every container reports `pid`; an init
/// exits with `exit_code` once a container with its pid is started or
/// every container with its pid is deleted.
pub struct FakeRuntime {
    pid: u32,
    exit_code: i32,
    containers: Mutex<HashMap<String, RuntimeState>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
            exit_code: 0,
            containers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }
}

#[async_trait]
impl OciRuntime for FakeRuntime {
    async fn create(&self, handle: &str, bundle_dir: &Path) -> Result<()> {
        self.calls.lock().push(format!("create {}", handle));
        self.containers.lock().insert(
            handle.to_string(),
            RuntimeState {
                id: handle.to_string(),
                status: "created".to_string(),
                pid: self.pid,
                bundle: bundle_dir.to_string_lossy().to_string(),
            },
        );
        Ok(())
    }

    async fn start(&self, handle: &str) -> Result<()> {
        self.calls.lock().push(format!("start {}", handle));
        match self.containers.lock().get_mut(handle) {
            Some(state) => {
                state.status = "running".to_string();
                Ok(())
            }
            None => Err(KardiganError::NotFound(format!("container {}", handle))),
        }
    }

    async fn kill(&self, handle: &str, signal: Signal) -> Result<()> {
        self.calls
            .lock()
            .push(format!("kill {} {}", handle, signal.as_str()));
        Ok(())
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        self.calls.lock().push(format!("delete {}", handle));
        self.containers.lock().remove(handle);
        Ok(())
    }

    async fn state(&self, handle: &str) -> Result<RuntimeState> {
        self.containers
            .lock()
            .get(handle)
            .cloned()
            .ok_or_else(|| KardiganError::NotFound(format!("container {}", handle)))
    }

    async fn wait(&self, pid: u32) -> Result<i32> {
        loop {
            let exited = {
                let containers = self.containers.lock();
                let mut owners = containers.values().filter(|s| s.pid == pid).peekable();
                owners.peek().is_none() || owners.any(|s| s.status != "created")
            };
            if exited {
                return Ok(self.exit_code);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub struct Harness {
    pub client: RuntimeServiceClient<Channel>,
    pub runtime: Arc<FakeRuntime>,
    /// Same directory the containerizer writes bundles into.
    pub depot: Depot,
    pub socket_path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<tokio::task::JoinHandle<()>>,
    _dir: TempDir,
}

impl Harness {
    pub async fn start(runtime: FakeRuntime) -> Self {
        let dir = TempDir::new().unwrap();
        let config = RuntimeConfig {
            socket_path: dir.path().join("run").join("kardigan.sock"),
            depot_path: dir.path().join("depot"),
            props_path: dir.path().join("props.json"),
            sandbox_rootfs: dir.path().join("rootfs"),
            call_timeout: Duration::from_secs(5),
            ..Default::default()
        };

        let runtime = Arc::new(runtime);
        let containerizer = BundleContainerizer::new(
            BundleTemplate::new(Arc::new(BaseTemplates::new(&config)), Arc::new(NoopDirs)),
            Depot::new(&config.depot_path),
            runtime.clone(),
            PropertyStore::open(&config.props_path).unwrap(),
        );
        let service = KardiganRuntimeService::new(Arc::new(containerizer), &config);
        let server = CriServer::new(config.socket_path.clone(), service);

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve_with_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        let socket_path = config.socket_path.clone();
        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let path = socket_path.clone();
        // The URI is ignored; every connection goes to the socket.
        let channel = Endpoint::try_from("http://[::]:50051")
            .unwrap()
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = path.clone();
                async move { UnixStream::connect(path).await }
            }))
            .await
            .unwrap();

        Self {
            client: RuntimeServiceClient::new(channel),
            runtime,
            depot: Depot::new(&config.depot_path),
            socket_path,
            shutdown: Some(tx),
            server: Some(handle),
            _dir: dir,
        }
    }

    /// Close the client and wait for the server to shut down.
    pub async fn stop(self) {
        let Harness {
            client,
            shutdown,
            server,
            ..
        } = self;
        drop(client);
        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }
        if let Some(server) = server {
            server.await.unwrap();
        }
    }
}
