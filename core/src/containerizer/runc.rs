//! OCI runtime driver.
//!
//! `RuncBinary` shells out to a runc-compatible CLI. Every child is spawned
//! with `kill_on_drop`, so dropping a pending call (a cancelled RPC) also
//! kills the runtime process it started.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};

use crate::error::{KardiganError, Result};

/// Signal delivered by `kill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Term => "TERM",
            Signal::Kill => "KILL",
        }
    }
}

/// Output of `runc state`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuntimeState {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub bundle: String,
}

/// Operations kardigan needs from an OCI runtime.
#[async_trait]
pub trait OciRuntime: Send + Sync {
    /// Create the container from the bundle in `bundle_dir` without starting it.
    async fn create(&self, handle: &str, bundle_dir: &Path) -> Result<()>;

    async fn start(&self, handle: &str) -> Result<()>;

    async fn kill(&self, handle: &str, signal: Signal) -> Result<()>;

    /// Forcefully delete the container; unknown handles are not an error.
    async fn delete(&self, handle: &str) -> Result<()>;

    /// Fails with `NotFound` when the runtime does not know `handle`.
    async fn state(&self, handle: &str) -> Result<RuntimeState>;

    /// Wait for process `pid` to terminate and return its exit code.
    async fn wait(&self, pid: u32) -> Result<i32>;
}

/// runc (or compatible) command line runtime.
#[derive(Debug, Clone)]
pub struct RuncBinary {
    binary: PathBuf,
    root: PathBuf,
}

impl RuncBinary {
    pub fn new(binary: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            root: root.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--root").arg(&self.root).kill_on_drop(true);
        cmd
    }

    /// Run a runc subcommand to completion, capturing its output.
    async fn exec(&self, args: &[&str]) -> Result<std::process::Output> {
        tracing::debug!(binary = %self.binary.display(), args = ?args, "running OCI runtime");
        let output = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(output)
    }
}

fn command_failed(command: &str, stderr: &[u8]) -> KardiganError {
    KardiganError::Runtime {
        command: command.to_string(),
        message: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

fn is_missing(stderr: &str) -> bool {
    stderr.contains("does not exist") || stderr.contains("not found")
}

#[async_trait]
impl OciRuntime for RuncBinary {
    async fn create(&self, handle: &str, bundle_dir: &Path) -> Result<()> {
        let log_file = bundle_dir.join("runc.log");
        // The container init inherits runc's stdio; piping it would keep the
        // pipes open for the container's whole lifetime.
        let status = self
            .command()
            .arg("--log")
            .arg(&log_file)
            .arg("create")
            .arg("--bundle")
            .arg(bundle_dir)
            .arg("--pid-file")
            .arg(bundle_dir.join("pidfile"))
            .arg(handle)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            let log = tokio::fs::read(&log_file).await.unwrap_or_default();
            return Err(command_failed("create", &log));
        }
        Ok(())
    }

    async fn start(&self, handle: &str) -> Result<()> {
        let output = self.exec(&["start", handle]).await?;
        if !output.status.success() {
            return Err(command_failed("start", &output.stderr));
        }
        Ok(())
    }

    async fn kill(&self, handle: &str, signal: Signal) -> Result<()> {
        let output = self.exec(&["kill", handle, signal.as_str()]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not running") || stderr.contains("no such process") {
                return Ok(());
            }
            return Err(command_failed("kill", &output.stderr));
        }
        Ok(())
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        let output = self.exec(&["delete", "--force", handle]).await?;
        if !output.status.success() && !is_missing(&String::from_utf8_lossy(&output.stderr)) {
            return Err(command_failed("delete", &output.stderr));
        }
        Ok(())
    }

    async fn state(&self, handle: &str) -> Result<RuntimeState> {
        let output = self.exec(&["state", handle]).await?;
        if !output.status.success() {
            if is_missing(&String::from_utf8_lossy(&output.stderr)) {
                return Err(KardiganError::NotFound(format!("container {}", handle)));
            }
            return Err(command_failed("state", &output.stderr));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn wait(&self, pid: u32) -> Result<i32> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| KardiganError::Internal(format!("pid {} out of range", pid)))?;
        wait_pid(pid).await.map_err(KardiganError::Io)
    }
}

/// Wait for `pid` to exit, polling with `WNOHANG` on every SIGCHLD. The
/// process must be a child of this process, which holds for container
/// inits once we are a child subreaper.
async fn wait_pid(pid: libc::pid_t) -> std::io::Result<i32> {
    // Registered before the first poll so an exit in between still wakes us.
    let mut sigchld = signal(SignalKind::child())?;
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: waitpid only writes to the status integer we own.
        let rc = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        match rc {
            0 => {
                if sigchld.recv().await.is_none() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "SIGCHLD stream closed",
                    ));
                }
            }
            -1 => {
                let err = std::io::Error::last_os_error();
                if err.kind() != std::io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
            _ => return Ok(decode_wait_status(status)),
        }
    }
}

/// Shell convention: exit status, or 128 + signal for signalled exits.
fn decode_wait_status(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        -1
    }
}
