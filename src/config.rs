//! Operation file loading.
//!
//! ```yaml
//! name: accounts
//! data_dir: data
//! steps:
//!   - object_type: Account
//!     fields: [Name, ParentId]
//!     extract: all
//!   - object_type: Contact
//!     fields: [LastName, AccountId]
//!     file: contacts.csv
//!     result_file: contacts-results.csv
//!     extract: descendents
//!   - object_type: Opportunity
//!     fields: [Name, AccountId]
//!     extract:
//!       ids: ["006000000000001", "006000000000002"]
//! ```
//!
//! `extract` is ignored by loads. Step order is execution order.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sync_core::ExtractScope;

/// Error type for operation files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read operation file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse operation file: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Operation file declares no steps")]
    NoSteps,

    #[error("Object type appears in more than one step: {0}")]
    DuplicateObjectType(String),

    #[error("Invalid extract scope '{value}' for {object_type}: expected all, descendents or ids")]
    InvalidExtract { object_type: String, value: String },
}

/// How the `extract` key of a step is written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum ExtractSpec {
    Keyword(String),
    Ids { ids: Vec<String> },
}

/// One step of an operation file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub object_type: String,

    #[serde(default)]
    pub fields: Vec<String>,

    /// Input (load) or output (extract) file, relative to the data directory
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub result_file: Option<PathBuf>,

    #[serde(default)]
    extract: Option<ExtractSpec>,
}

impl StepConfig {
    /// Requested fields with `Id` first when it was left out.
    pub fn field_list(&self) -> Vec<String> {
        let mut fields = self.fields.clone();
        if !fields.iter().any(|f| f == sync_core::ID_COLUMN) {
            fields.insert(0, sync_core::ID_COLUMN.to_string());
        }
        fields
    }

    /// Extraction scope; `all` when not given.
    pub fn extract_scope(&self) -> Result<ExtractScope, ConfigError> {
        match &self.extract {
            None => Ok(ExtractScope::All),
            Some(ExtractSpec::Ids { ids }) => Ok(ExtractScope::Ids(ids.iter().cloned().collect())),
            Some(ExtractSpec::Keyword(keyword)) => match keyword.to_ascii_lowercase().as_str() {
                "all" => Ok(ExtractScope::All),
                "descendents" => Ok(ExtractScope::Descendents),
                _ => Err(ConfigError::InvalidExtract {
                    object_type: self.object_type.clone(),
                    value: keyword.clone(),
                }),
            },
        }
    }
}

fn default_name() -> String {
    "sobject-sync".to_string()
}

/// A whole operation file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationConfig {
    /// Name the saved load state is kept under
    #[serde(default = "default_name")]
    pub name: String,

    /// Base directory for data files, relative to the operation file
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    pub steps: Vec<StepConfig>,

    /// Directory holding the operation file (not serialized)
    #[serde(skip)]
    base_dir: PathBuf,
}

impl OperationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: OperationConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps);
        }
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.object_type.as_str()) {
                return Err(ConfigError::DuplicateObjectType(step.object_type.clone()));
            }
            step.extract_scope()?;
        }
        Ok(())
    }

    /// Directory data files are resolved against.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.base_dir.join(dir),
            None => self.base_dir.clone(),
        }
    }
}
