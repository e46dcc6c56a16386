//! File-backed provider
//!
//! Keeps an in-process cloud in `<state_dir>/cloud.json` so every command
//! can run end-to-end without a vendor SDK.

use anyhow::{Context, Result};
use declarative::{
    CloudSnapshot, DeleteOutcome, MemoryProvider, Provider, RemoteError, RemoteResource,
    Resource, ResourceId, VmInstance, VmOperation,
};
use std::fs;
use std::path::{Path, PathBuf};

/// File name inside the state directory
pub const CLOUD_FILE: &str = "cloud.json";

pub struct LocalProvider {
    path: PathBuf,
    inner: MemoryProvider,
}

impl LocalProvider {
    /// Open the cloud under `dir`; a missing file is an empty cloud
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(CLOUD_FILE);
        let snapshot = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            CloudSnapshot::default()
        };

        log::debug!(
            "Opened local cloud at {} ({} resources)",
            path.display(),
            snapshot.resources.len()
        );
        Ok(Self {
            path,
            inner: MemoryProvider::from_snapshot(snapshot),
        })
    }

    /// Write the current cloud contents back to disk
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.inner.snapshot())
            .context("Failed to serialize local cloud")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        log::debug!("Saved local cloud to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Provider for LocalProvider {
    fn create_or_update(
        &self,
        resource: &Resource,
        dependencies: &[ResourceId],
    ) -> Result<RemoteResource, RemoteError> {
        self.inner.create_or_update(resource, dependencies)
    }

    fn get(&self, id: &ResourceId) -> Result<Option<RemoteResource>, RemoteError> {
        self.inner.get(id)
    }

    fn delete(&self, id: &ResourceId) -> Result<DeleteOutcome, RemoteError> {
        self.inner.delete(id)
    }

    fn transition(&self, id: &ResourceId, op: &VmOperation) -> Result<VmInstance, RemoteError> {
        self.inner.transition(id, op)
    }
}
