//! Load state storage trait and types
//!
//! This module defines the StateStore trait for backend-agnostic
//! state storage operations, plus the identifier used to address a state.

use anyhow::Result;
use async_trait::async_trait;

use crate::LoadState;

/// Identifies the persisted state of one load operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateID {
    /// Operation name, usually the stem of the operation file
    pub operation: String,
}

impl StateID {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Operation name reduced to characters safe in file names and record keys.
    pub fn key(&self) -> String {
        self.operation
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

/// Trait for load state storage operations.
///
/// Implemented by:
/// - Filesystem storage (`FilesystemStore`)
/// - SurrealDB v2 (`Surreal2Store`)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Store (replace) the state for `id`.
    async fn store_state(&self, id: &StateID, state: &LoadState) -> Result<()>;

    /// Read the state for `id`.
    ///
    /// Returns None if no state has been stored.
    async fn read_state(&self, id: &StateID) -> Result<Option<LoadState>>;

    /// Remove the state for `id`. Removing a missing state is not an error.
    async fn clear_state(&self, id: &StateID) -> Result<()>;
}
