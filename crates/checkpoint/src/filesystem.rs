//! Filesystem-based load state storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::store::{StateID, StateStore};
use crate::LoadState;

/// Filesystem implementation of StateStore trait.
///
/// Stores one `state_<operation>.json` file per operation in a directory.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, id: &StateID) -> PathBuf {
        self.dir.join(format!("state_{}.json", id.key()))
    }
}

#[async_trait]
impl StateStore for FilesystemStore {
    async fn store_state(&self, id: &StateID, state: &LoadState) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory {}", self.dir.display()))?;

        // Write next to the target and rename so a crash never leaves a truncated state
        let path = self.path_for(id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move state into {}", path.display()))?;

        tracing::info!(
            "Stored load state ({}, {} mapped ids) to {}",
            state.stage,
            state.id_map.len(),
            path.display()
        );
        Ok(())
    }

    async fn read_state(&self, id: &StateID) -> Result<Option<LoadState>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse load state {}", path.display()))?;
        Ok(Some(state))
    }

    async fn clear_state(&self, id: &StateID) -> Result<()> {
        let path = self.path_for(id);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            tracing::info!("Cleared load state {}", path.display());
        }
        Ok(())
    }
}
