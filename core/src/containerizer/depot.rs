//! On-disk bundle storage.
//!
//! Each handle owns one directory under the depot root holding its
//! `config.json` and the runtime artifacts (pid file, runc log, exit code).

use std::path::{Path, PathBuf};

use crate::bundle::Bundle;
use crate::error::{KardiganError, Result};

/// Name of the OCI configuration file inside a bundle directory.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone)]
pub struct Depot {
    root: PathBuf,
}

impl Depot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundle_dir(&self, handle: &str) -> Result<PathBuf> {
        validate_handle(handle)?;
        Ok(self.root.join(handle))
    }

    /// Create the bundle directory for `handle` and write its config.
    ///
    /// Fails if the handle already has a directory.
    pub async fn create(&self, handle: &str, bundle: &Bundle) -> Result<PathBuf> {
        let dir = self.bundle_dir(handle)?;
        tokio::fs::create_dir_all(&self.root).await?;
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(KardiganError::CreationFailed(format!(
                    "handle already exists: {}",
                    handle
                )));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = write_config(&dir, bundle).await {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(e);
        }

        tracing::debug!(handle = %handle, dir = %dir.display(), "bundle written to depot");
        Ok(dir)
    }

    /// Bundle directory of an existing handle.
    pub async fn lookup(&self, handle: &str) -> Result<PathBuf> {
        let dir = self.bundle_dir(handle)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(KardiganError::NotFound(format!("container {}", handle)));
        }
        Ok(dir)
    }

    /// Read back the bundle stored for `handle`.
    pub async fn load(&self, handle: &str) -> Result<Bundle> {
        let dir = self.lookup(handle).await?;
        let data = tokio::fs::read_to_string(dir.join(CONFIG_FILE)).await?;
        Ok(serde_json::from_str(&data)?)
    }

    pub async fn destroy(&self, handle: &str) -> Result<()> {
        let dir = self.lookup(handle).await?;
        tokio::fs::remove_dir_all(&dir).await?;
        Ok(())
    }
}

/// Handles become directory names, so they must be a single path component.
fn validate_handle(handle: &str) -> Result<()> {
    if handle.is_empty() || handle == "." || handle == ".." || handle.contains('/') {
        return Err(KardiganError::NotFound(format!(
            "invalid container handle: {:?}",
            handle
        )));
    }
    Ok(())
}

async fn write_config(dir: &Path, bundle: &Bundle) -> Result<()> {
    let tmp = dir.join(format!("{}.tmp", CONFIG_FILE));
    tokio::fs::write(&tmp, bundle.to_config_json()?).await?;
    tokio::fs::rename(&tmp, dir.join(CONFIG_FILE)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bundle() -> Bundle {
        Bundle::new()
            .with_root_path("/opt/warden/rootfs")
            .with_hostname("the-hostname")
    }

    #[tokio::test]
    async fn test_create_writes_config() {
        let dir = TempDir::new().unwrap();
        let depot = Depot::new(dir.path().join("depot"));

        let bundle_dir = depot.create("abc", &bundle()).await.unwrap();
        assert_eq!(bundle_dir, dir.path().join("depot").join("abc"));
        assert!(bundle_dir.join(CONFIG_FILE).exists());
        assert!(!bundle_dir.join("config.json.tmp").exists());

        let loaded = depot.load("abc").await.unwrap();
        assert_eq!(loaded, bundle());
    }

    #[tokio::test]
    async fn test_duplicate_handle_rejected() {
        let dir = TempDir::new().unwrap();
        let depot = Depot::new(dir.path());

        depot.create("abc", &bundle()).await.unwrap();
        assert!(matches!(
            depot.create("abc", &bundle()).await,
            Err(KardiganError::CreationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let depot = Depot::new(dir.path());
        assert!(matches!(
            depot.lookup("missing").await,
            Err(KardiganError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_then_lookup_fails() {
        let dir = TempDir::new().unwrap();
        let depot = Depot::new(dir.path());

        let bundle_dir = depot.create("abc", &bundle()).await.unwrap();
        std::fs::write(bundle_dir.join("exitcode"), "0").unwrap();
        depot.destroy("abc").await.unwrap();

        assert!(!bundle_dir.exists());
        assert!(matches!(
            depot.lookup("abc").await,
            Err(KardiganError::NotFound(_))
        ));
        assert!(depot.destroy("abc").await.is_err());
    }

    #[tokio::test]
    async fn test_path_like_handles_rejected() {
        let dir = TempDir::new().unwrap();
        let depot = Depot::new(dir.path());
        for handle in ["", ".", "..", "../escape", "a/b"] {
            assert!(depot.create(handle, &bundle()).await.is_err(), "{handle}");
        }
    }
}
