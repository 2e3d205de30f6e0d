//! CRI RuntimeService implementation.
//!
//! Maps CRI pod/container lifecycle onto a `Containerizer`:
//! - Pod Sandbox → container created from the base bundle
//! - Container → container joining its sandbox's network and user namespaces

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};

use kardigan_core::containerizer::Containerizer;
use kardigan_core::error::{KardiganError, Result as KardiganResult};
use kardigan_core::exit_status::resolve_exit_code;

use crate::config_mapper::{
    container_spec, sandbox_spec, PROP_CONTAINER_IMAGE, PROP_CONTAINER_NAME,
};
use crate::cri_api::runtime_service_server::RuntimeService;
use crate::cri_api::*;
use crate::error::error_to_status;
use crate::id::{IdGenerator, UuidGenerator};

pub const RUNTIME_NAME: &str = "kardigan";
pub const RUNTIME_VERSION: &str = "0.0.0";
pub const RUNTIME_API_VERSION: &str = "v1";
/// CRI API version reported in `VersionResponse.version`.
const KUBELET_API_VERSION: &str = "0.1.0";

/// Kardigan implementation of the CRI RuntimeService.
///
/// Holds no container state of its own; every request is answered from
/// the containerizer.
pub struct KardiganRuntimeService {
    containerizer: Arc<dyn Containerizer>,
    ids: Arc<dyn IdGenerator>,
    rootfs: PathBuf,
    call_timeout: Duration,
}

impl KardiganRuntimeService {
    pub fn new(
        containerizer: Arc<dyn Containerizer>,
        config: &kardigan_core::RuntimeConfig,
    ) -> Self {
        Self {
            containerizer,
            ids: Arc::new(UuidGenerator),
            rootfs: config.sandbox_rootfs.clone(),
            call_timeout: config.call_timeout,
        }
    }

    /// Replace the identifier source.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Run a containerizer call under the configured deadline.
    async fn call<T>(
        &self,
        op: &str,
        fut: impl Future<Output = KardiganResult<T>>,
    ) -> KardiganResult<T> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(KardiganError::Timeout(format!(
                "{} did not complete within {:?}",
                op, self.call_timeout
            ))),
        }
    }

    fn new_id(&self) -> std::result::Result<String, Status> {
        self.ids
            .generate()
            .map_err(|e| error_to_status(e.into_creation_failure()))
    }
}

/// Answer for the CRI calls kardigan does not serve.
fn unimplemented<T>(op: &str) -> Result<Response<T>, Status> {
    tracing::debug!(op, "CRI call not implemented");
    Err(error_to_status(KardiganError::Unimplemented(format!(
        "{} not yet implemented",
        op
    ))))
}

/// CRI state from the exit code artifact and the OCI runtime status.
fn container_state(exit_code: Option<i32>, runtime_status: &str) -> ContainerState {
    if exit_code.is_some() {
        return ContainerState::ContainerExited;
    }
    match runtime_status {
        "created" => ContainerState::ContainerCreated,
        "running" | "pausing" | "paused" => ContainerState::ContainerRunning,
        "stopped" => ContainerState::ContainerExited,
        _ => ContainerState::ContainerUnknown,
    }
}

#[tonic::async_trait]
impl RuntimeService for KardiganRuntimeService {
    // ── Version ──────────────────────────────────────────────────────

    async fn version(
        &self,
        _request: Request<VersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        Ok(Response::new(VersionResponse {
            version: KUBELET_API_VERSION.to_string(),
            runtime_name: RUNTIME_NAME.to_string(),
            runtime_version: RUNTIME_VERSION.to_string(),
            runtime_api_version: RUNTIME_API_VERSION.to_string(),
        }))
    }

    // ── Pod Sandbox ──────────────────────────────────────────────────

    async fn run_pod_sandbox(
        &self,
        request: Request<RunPodSandboxRequest>,
    ) -> Result<Response<RunPodSandboxResponse>, Status> {
        let config = request.into_inner().config.unwrap_or_default();
        let sandbox_id = self.new_id()?;

        tracing::info!(
            sandbox_id = %sandbox_id,
            hostname = %config.hostname,
            "CRI RunPodSandbox"
        );

        let spec = sandbox_spec(&sandbox_id, &self.rootfs, &config);
        self.call("create sandbox", self.containerizer.create(spec))
            .await
            .map_err(|e| error_to_status(e.into_creation_failure()))?;

        Ok(Response::new(RunPodSandboxResponse {
            pod_sandbox_id: sandbox_id,
        }))
    }

    async fn stop_pod_sandbox(
        &self,
        request: Request<StopPodSandboxRequest>,
    ) -> Result<Response<StopPodSandboxResponse>, Status> {
        let sandbox_id = request.into_inner().pod_sandbox_id;
        tracing::info!(sandbox_id = %sandbox_id, "CRI StopPodSandbox");

        self.call("stop sandbox", self.containerizer.stop(&sandbox_id, true))
            .await
            .map_err(error_to_status)?;

        Ok(Response::new(StopPodSandboxResponse {}))
    }

    async fn remove_pod_sandbox(
        &self,
        request: Request<RemovePodSandboxRequest>,
    ) -> Result<Response<RemovePodSandboxResponse>, Status> {
        let sandbox_id = request.into_inner().pod_sandbox_id;
        tracing::info!(sandbox_id = %sandbox_id, "CRI RemovePodSandbox");

        self.call("destroy sandbox", self.containerizer.destroy(&sandbox_id))
            .await
            .map_err(error_to_status)?;

        Ok(Response::new(RemovePodSandboxResponse {}))
    }

    async fn pod_sandbox_status(
        &self,
        _request: Request<PodSandboxStatusRequest>,
    ) -> Result<Response<PodSandboxStatusResponse>, Status> {
        unimplemented("PodSandboxStatus")
    }

    async fn list_pod_sandbox(
        &self,
        _request: Request<ListPodSandboxRequest>,
    ) -> Result<Response<ListPodSandboxResponse>, Status> {
        unimplemented("ListPodSandbox")
    }

    // ── Container ────────────────────────────────────────────────────

    async fn create_container(
        &self,
        request: Request<CreateContainerRequest>,
    ) -> Result<Response<CreateContainerResponse>, Status> {
        let req = request.into_inner();
        let sandbox_id = req.pod_sandbox_id;
        let config = req.config.unwrap_or_default();

        // Resolved on every call: the sandbox pid is never cached.
        let sandbox = self
            .call("sandbox info", self.containerizer.info(&sandbox_id))
            .await
            .map_err(|e| match e {
                e @ KardiganError::Timeout(_) => error_to_status(e),
                other => Status::not_found(format!("sandbox {}: {}", sandbox_id, other)),
            })?;

        let container_id = self.new_id()?;

        tracing::info!(
            container_id = %container_id,
            sandbox_id = %sandbox_id,
            sandbox_pid = sandbox.pid,
            "CRI CreateContainer"
        );

        let spec = container_spec(
            &container_id,
            &self.rootfs,
            &sandbox_id,
            sandbox.pid,
            &config,
        );
        self.call("create container", self.containerizer.create(spec))
            .await
            .map_err(|e| error_to_status(e.into_creation_failure()))?;

        Ok(Response::new(CreateContainerResponse { container_id }))
    }

    async fn start_container(
        &self,
        request: Request<StartContainerRequest>,
    ) -> Result<Response<StartContainerResponse>, Status> {
        let container_id = request.into_inner().container_id;
        tracing::info!(container_id = %container_id, "CRI StartContainer");

        self.call("start container", self.containerizer.start(&container_id))
            .await
            .map_err(error_to_status)?;

        Ok(Response::new(StartContainerResponse {}))
    }

    async fn stop_container(
        &self,
        _request: Request<StopContainerRequest>,
    ) -> Result<Response<StopContainerResponse>, Status> {
        unimplemented("StopContainer")
    }

    async fn remove_container(
        &self,
        _request: Request<RemoveContainerRequest>,
    ) -> Result<Response<RemoveContainerResponse>, Status> {
        unimplemented("RemoveContainer")
    }

    async fn list_containers(
        &self,
        _request: Request<ListContainersRequest>,
    ) -> Result<Response<ListContainersResponse>, Status> {
        unimplemented("ListContainers")
    }

    async fn container_status(
        &self,
        request: Request<ContainerStatusRequest>,
    ) -> Result<Response<ContainerStatusResponse>, Status> {
        let container_id = request.into_inner().container_id;
        tracing::info!(container_id = %container_id, "CRI ContainerStatus");

        let info = self
            .call("container info", self.containerizer.info(&container_id))
            .await
            .map_err(|e| match e {
                e @ KardiganError::Timeout(_) => error_to_status(e),
                other => Status::not_found(format!("container {}: {}", container_id, other)),
            })?;

        let exit_code = resolve_exit_code(&info.bundle_path).await;
        let state = container_state(exit_code, &info.status);

        let status = ContainerStatus {
            id: container_id,
            metadata: info.properties.get(PROP_CONTAINER_NAME).map(|name| ContainerMetadata {
                name: name.clone(),
                attempt: 0,
            }),
            state: state.into(),
            exit_code,
            image: info.properties.get(PROP_CONTAINER_IMAGE).map(|image| ImageSpec {
                image: image.clone(),
                annotations: Default::default(),
            }),
            ..Default::default()
        };

        Ok(Response::new(ContainerStatusResponse {
            status: Some(status),
            info: Default::default(),
        }))
    }

    // ── Exec / Attach / PortForward ──────────────────────────────────

    async fn exec_sync(
        &self,
        _request: Request<ExecSyncRequest>,
    ) -> Result<Response<ExecSyncResponse>, Status> {
        unimplemented("ExecSync")
    }

    async fn exec(
        &self,
        _request: Request<ExecRequest>,
    ) -> Result<Response<ExecResponse>, Status> {
        unimplemented("Exec")
    }

    async fn attach(
        &self,
        _request: Request<AttachRequest>,
    ) -> Result<Response<AttachResponse>, Status> {
        unimplemented("Attach")
    }

    async fn port_forward(
        &self,
        _request: Request<PortForwardRequest>,
    ) -> Result<Response<PortForwardResponse>, Status> {
        unimplemented("PortForward")
    }

    // ── Runtime ──────────────────────────────────────────────────────

    async fn update_runtime_config(
        &self,
        _request: Request<UpdateRuntimeConfigRequest>,
    ) -> Result<Response<UpdateRuntimeConfigResponse>, Status> {
        unimplemented("UpdateRuntimeConfig")
    }

    async fn status(
        &self,
        _request: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        unimplemented("Status")
    }
}
