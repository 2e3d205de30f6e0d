//! gRPC server setup for the CRI runtime service.
//!
//! Listens on a Unix domain socket for CRI RuntimeService RPCs.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;

use crate::cri_api::runtime_service_server::RuntimeServiceServer;
use crate::runtime_service::KardiganRuntimeService;

pub type ServeError = Box<dyn std::error::Error + Send + Sync>;

/// CRI gRPC server bound to a Unix socket.
pub struct CriServer {
    /// Path to the Unix domain socket.
    socket_path: PathBuf,
    runtime_service: KardiganRuntimeService,
}

impl CriServer {
    pub fn new(socket_path: PathBuf, runtime_service: KardiganRuntimeService) -> Self {
        Self {
            socket_path,
            runtime_service,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve CRI RPCs until the process exits.
    pub async fn serve(self) -> Result<(), ServeError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve CRI RPCs until `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        signal: impl Future<Output = ()>,
    ) -> Result<(), ServeError> {
        // Remove a socket left behind by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let uds = UnixListener::bind(&self.socket_path)?;
        let uds_stream = UnixListenerStream::new(uds);

        tracing::info!(
            socket = %self.socket_path.display(),
            "CRI server listening"
        );

        Server::builder()
            .add_service(RuntimeServiceServer::new(self.runtime_service))
            .serve_with_incoming_shutdown(uds_stream, signal)
            .await?;

        tracing::info!("CRI server stopped");
        Ok(())
    }
}
