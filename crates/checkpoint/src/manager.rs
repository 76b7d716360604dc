//! Load state manager tying a storage backend to one operation.

use std::collections::BTreeMap;

use crate::{
    store::StateStore, FilesystemStore, LoadState, Stage, StateID, StateStorage, Surreal2Store,
};

/// Manager for saving and restoring the state of one load operation.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::{Stage, StateManager, StateStorage};
///
/// let manager = StateManager::from_storage("accounts", &StateStorage::filesystem("/tmp/state"), None)?;
///
/// manager.save(Stage::Dependents, &id_map).await?;
/// let state = manager.load().await?;
/// ```
pub struct StateManager {
    id: StateID,
    store: Box<dyn StateStore>,
}

impl StateManager {
    /// Create a manager for `operation` on top of an existing store.
    pub fn new(operation: impl Into<String>, store: Box<dyn StateStore>) -> Self {
        Self {
            id: StateID::new(operation),
            store,
        }
    }

    /// Build the store described by `storage`.
    ///
    /// Returns `None` when storage is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if SurrealDB storage is requested without a client.
    pub fn from_storage(
        operation: impl Into<String>,
        storage: &StateStorage,
        surreal_client: Option<surrealdb::Surreal<surrealdb::engine::any::Any>>,
    ) -> anyhow::Result<Option<Self>> {
        let store: Box<dyn StateStore> = match storage {
            StateStorage::Disabled => return Ok(None),
            StateStorage::Filesystem { dir } => Box::new(FilesystemStore::new(dir)),
            StateStorage::SurrealDB { table_name } => {
                let client = surreal_client.ok_or_else(|| {
                    anyhow::anyhow!("SurrealDB client not provided for load state storage")
                })?;
                Box::new(Surreal2Store::new(client, table_name.clone()))
            }
        };
        Ok(Some(Self::new(operation, store)))
    }

    pub fn operation(&self) -> &str {
        &self.id.operation
    }

    /// Persist `stage` and `id_map`, replacing any earlier state.
    pub async fn save(&self, stage: Stage, id_map: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let state = LoadState::new(self.id.operation.clone(), stage, id_map.clone());
        self.store.store_state(&self.id, &state).await
    }

    /// Read the persisted state, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored state belongs to another operation
    /// or cannot be read.
    pub async fn load(&self) -> anyhow::Result<Option<LoadState>> {
        let state = self.store.read_state(&self.id).await?;
        if let Some(ref state) = state {
            state.validate(&self.id.operation)?;
        }
        Ok(state)
    }

    /// Forget the persisted state after a completed load.
    pub async fn clear(&self) -> anyhow::Result<()> {
        self.store.clear_state(&self.id).await
    }
}
