//! Persisted state of a load operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Stage;

/// Everything a load needs to resume after an interruption.
///
/// # File Format
///
/// ```json
/// {
///     "operation": "accounts",
///     "stage": "DEPENDENTS",
///     "id_map": {
///         "001000000000000": "01HZX3K1Q6N0ZK7V9B8T2M4C5D"
///     },
///     "updated_at": "2024-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadState {
    /// Operation this state belongs to
    pub operation: String,
    /// Stage the next run starts from
    pub stage: Stage,
    /// Original record identifier to the identifier assigned on load
    #[serde(default)]
    pub id_map: BTreeMap<String, String>,
    /// When this state was last written
    pub updated_at: DateTime<Utc>,
}

impl LoadState {
    pub fn new(operation: impl Into<String>, stage: Stage, id_map: BTreeMap<String, String>) -> Self {
        Self {
            operation: operation.into(),
            stage,
            id_map,
            updated_at: Utc::now(),
        }
    }

    /// Check that this state was written for `operation`.
    pub fn validate(&self, operation: &str) -> anyhow::Result<()> {
        if self.operation != operation {
            anyhow::bail!(
                "Load state mismatch: expected operation '{}', found '{}'",
                operation,
                self.operation
            );
        }
        Ok(())
    }
}
