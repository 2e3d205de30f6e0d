//! Exit supervision for container init processes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{KardiganError, Result};
use crate::exit_status::EXIT_CODE_FILE;

use super::runc::OciRuntime;

/// Register this process as child subreaper so container init processes
/// are reparented to us when runc exits, letting us wait for them.
pub fn become_subreaper() -> Result<()> {
    // SAFETY: PR_SET_CHILD_SUBREAPER takes a plain integer flag.
    let rc = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
    if rc != 0 {
        return Err(KardiganError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Wait for `pid` in the background and record its exit code in
/// `bundle_dir` once it terminates. Spawned as soon as the runtime has
/// created the init, so inits that are never started are reaped too.
pub fn spawn_exit_watcher(
    runtime: Arc<dyn OciRuntime>,
    handle: String,
    pid: u32,
    bundle_dir: PathBuf,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match runtime.wait(pid).await {
            Ok(code) => {
                tracing::debug!(handle = %handle, pid, code, "container process exited");
                match write_exit_code(&bundle_dir, code).await {
                    Ok(()) => {}
                    Err(KardiganError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::debug!(handle = %handle, "bundle already removed, exit code dropped");
                    }
                    Err(e) => {
                        tracing::warn!(handle = %handle, error = %e, "failed to record exit code");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(handle = %handle, pid, error = %e, "failed to wait for container process");
            }
        }
    })
}

/// Atomically write `code` to the exit code artifact.
pub async fn write_exit_code(bundle_dir: &Path, code: i32) -> Result<()> {
    let tmp = bundle_dir.join(format!("{}.tmp", EXIT_CODE_FILE));
    tokio::fs::write(&tmp, code.to_string()).await?;
    tokio::fs::rename(&tmp, bundle_dir.join(EXIT_CODE_FILE)).await?;
    Ok(())
}
