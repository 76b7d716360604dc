//! Where load state is kept.

/// Backend used to persist load state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateStorage {
    /// State is not persisted; resuming is unavailable.
    Disabled,

    /// JSON files in a directory.
    Filesystem { dir: String },

    /// One record per operation in a SurrealDB table.
    SurrealDB { table_name: String },
}

impl Default for StateStorage {
    fn default() -> Self {
        StateStorage::Filesystem {
            dir: ".sobject-sync-state".to_string(),
        }
    }
}

impl StateStorage {
    pub fn filesystem(dir: impl Into<String>) -> Self {
        StateStorage::Filesystem { dir: dir.into() }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, StateStorage::Disabled)
    }
}
