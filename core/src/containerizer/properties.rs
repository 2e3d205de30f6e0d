//! Persistent per-handle properties.
//!
//! Properties live in a single JSON file rewritten atomically (tmp file,
//! then rename) on every change. Readers see the in-memory copy, which is
//! only replaced once the file on disk has been written.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{KardiganError, Result};

pub type Properties = BTreeMap<String, String>;

/// Serializable wrapper for the properties file.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
struct PropertiesFile {
    handles: HashMap<String, Properties>,
}

#[derive(Debug)]
pub struct PropertyStore {
    path: PathBuf,
    state: Mutex<PropertiesFile>,
    /// Serializes file rewrites; held across the async writes.
    writer: tokio::sync::Mutex<()>,
}

impl PropertyStore {
    /// Open the store at `path`, loading existing properties if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| {
                KardiganError::Config(format!(
                    "failed to read properties file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            serde_json::from_str(&data).map_err(|e| {
                KardiganError::Config(format!(
                    "failed to parse properties file {}: {}",
                    path.display(),
                    e
                ))
            })?
        } else {
            PropertiesFile::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the properties of `handle`.
    ///
    /// On failure the store is left unchanged.
    pub async fn set(&self, handle: &str, properties: Properties) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut next = self.state.lock().clone();
        next.handles.insert(handle.to_string(), properties);
        self.save(&next).await?;
        *self.state.lock() = next;
        Ok(())
    }

    pub fn get(&self, handle: &str) -> Properties {
        self.state
            .lock()
            .handles
            .get(handle)
            .cloned()
            .unwrap_or_default()
    }

    /// Forget `handle`. Unknown handles are ignored.
    pub async fn remove(&self, handle: &str) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut next = self.state.lock().clone();
        if next.handles.remove(handle).is_none() {
            return Ok(());
        }
        self.save(&next).await?;
        *self.state.lock() = next;
        Ok(())
    }

    async fn save(&self, state: &PropertiesFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
