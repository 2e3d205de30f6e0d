//! Kardigan - Kubernetes Container Runtime Interface binary.
//!
//! Serves the CRI RuntimeService over a Unix domain socket and turns pod
//! sandboxes and containers into OCI bundles run by runc.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kardigan_core::bundle::{BaseTemplates, BundleTemplate, HostDirCreator};
use kardigan_core::containerizer::{
    supervisor, BundleContainerizer, Depot, PropertyStore, RuncBinary,
};
use kardigan_core::RuntimeConfig;

use kardigan_cri::runtime_service::KardiganRuntimeService;
use kardigan_cri::server::CriServer;

/// Kardigan CRI runtime
#[derive(Parser, Debug)]
#[command(name = "kardigan", about = "Kardigan CRI runtime", version)]
struct Args {
    /// Path to the Unix domain socket for CRI communication.
    #[arg(long, default_value = "/var/run/kardigan.sock")]
    socket_path: PathBuf,

    /// Directory holding one OCI bundle per sandbox or container.
    #[arg(long, default_value = "/var/run/kardigan/depot")]
    depot_path: PathBuf,

    /// Path to the runc-compatible OCI runtime.
    #[arg(long, default_value = "/usr/local/bin/runc")]
    oci_runtime_path: PathBuf,

    /// State directory passed to the OCI runtime via --root.
    #[arg(long, default_value = "/run/runc")]
    runtime_root: PathBuf,

    /// JSON file storing per-container properties.
    #[arg(long, default_value = "/var/run/kardigan/props.json")]
    props_path: PathBuf,

    /// Init binary bind-mounted into every container.
    #[arg(long)]
    init_path: Option<PathBuf>,

    /// Root filesystem for sandboxes and containers.
    #[arg(long, default_value = "/opt/warden/rootfs")]
    sandbox_rootfs: PathBuf,

    /// AppArmor profile for unprivileged containers.
    #[arg(long)]
    apparmor_profile: Option<String>,

    /// Upper bound in seconds for a single containerizer call.
    #[arg(long, default_value = "30")]
    call_timeout_secs: u64,
}

impl From<Args> for RuntimeConfig {
    fn from(args: Args) -> Self {
        Self {
            socket_path: args.socket_path,
            depot_path: args.depot_path,
            runtime_path: args.oci_runtime_path,
            runtime_root: args.runtime_root,
            props_path: args.props_path,
            init_path: args.init_path,
            sandbox_rootfs: args.sandbox_rootfs,
            apparmor_profile: args.apparmor_profile,
            call_timeout: Duration::from_secs(args.call_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RuntimeConfig::from(Args::parse());
    config.validate()?;

    tracing::info!(
        socket = %config.socket_path.display(),
        depot = %config.depot_path.display(),
        runtime = %config.runtime_path.display(),
        rootfs = %config.sandbox_rootfs.display(),
        "Starting kardigan"
    );

    // Container init processes are reparented to us so their exit codes
    // can be collected.
    if let Err(e) = supervisor::become_subreaper() {
        tracing::warn!(error = %e, "failed to become child subreaper, exit codes will be unavailable");
    }

    let templates = Arc::new(BaseTemplates::new(&config));
    let containerizer = BundleContainerizer::new(
        BundleTemplate::new(templates, Arc::new(HostDirCreator)),
        Depot::new(&config.depot_path),
        Arc::new(RuncBinary::new(&config.runtime_path, &config.runtime_root)),
        PropertyStore::open(&config.props_path)?,
    );

    let runtime_service = KardiganRuntimeService::new(Arc::new(containerizer), &config);
    let server = CriServer::new(config.socket_path.clone(), runtime_service);

    tracing::info!(version = kardigan_core::VERSION, "kardigan is open for e-business");
    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
