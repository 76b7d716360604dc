//! Execution stage of a load operation.

use serde::{Deserialize, Serialize};

/// Where a load operation starts when it is executed.
///
/// The stage is persisted between runs so an interrupted load can resume
/// without creating records a second time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Run the main pass, then the dependent-update pass.
    #[default]
    Initial,

    /// The main pass already completed in an earlier run.
    ///
    /// Only the dependent-update pass runs.
    Dependents,
}

impl Stage {
    /// Get the string representation of this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "INITIAL",
            Stage::Dependents => "DEPENDENTS",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "INITIAL" => Ok(Stage::Initial),
            "DEPENDENTS" => Ok(Stage::Dependents),
            other => Err(anyhow::anyhow!("Unknown load stage: {other}")),
        }
    }
}
