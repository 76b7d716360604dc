//! sobject-sync library
//!
//! Extracts records of related object types from a record store into CSV
//! files and loads them back, keeping references between object types
//! (self-references and cycles included) intact.
//!
//! # Features
//!
//! - Reference-following extraction: `all`, `descendents` or `ids` scopes
//! - Two-pass load: records first, deferred references second
//! - Identifier remapping with per object type result files
//! - Resumable loads: stage and identifier map saved between runs
//!
//! # CLI Usage
//!
//! ```bash
//! # Extract accounts and everything hanging off them
//! sobject-sync extract --config operation.yaml --schema schema.yaml
//!
//! # Load, resuming an interrupted run if there is one
//! sobject-sync load --config operation.yaml --schema schema.yaml --resume
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use checkpoint::StateManager;
use clap::Parser;
use sobject_sync_file::{CsvFileStore, FileRole};
use sync_core::{
    ExtractOperation, LoadOperation, MetadataProvider, OperationOutcome, RecordStore,
};

pub mod config;

pub use config::{ConfigError, OperationConfig, StepConfig};

#[derive(Parser, Clone, Debug)]
pub struct SurrealOpts {
    /// SurrealDB endpoint URL (`mem://` for an embedded in-memory store)
    #[arg(
        long,
        default_value = "http://localhost:8000",
        env = "SURREAL_ENDPOINT"
    )]
    pub surreal_endpoint: String,

    /// SurrealDB username
    #[arg(long, default_value = "root", env = "SURREAL_USERNAME")]
    pub surreal_username: String,

    /// SurrealDB password
    #[arg(long, default_value = "root", env = "SURREAL_PASSWORD")]
    pub surreal_password: String,

    /// SurrealDB namespace
    #[arg(long, default_value = "sobject", env = "SURREAL_NAMESPACE")]
    pub namespace: String,

    /// SurrealDB database
    #[arg(long, default_value = "sync", env = "SURREAL_DATABASE")]
    pub database: String,
}

impl From<&SurrealOpts> for surreal_store::SurrealOpts {
    fn from(opts: &SurrealOpts) -> Self {
        Self {
            surreal_endpoint: opts.surreal_endpoint.clone(),
            surreal_username: opts.surreal_username.clone(),
            surreal_password: opts.surreal_password.clone(),
        }
    }
}

/// CSV file store for `config`, with per-step file overrides applied.
///
/// A step's `file` is its INPUT file for loads and its OUTPUT file for
/// extractions.
pub fn file_store(config: &OperationConfig, data_role: FileRole) -> CsvFileStore {
    let mut files = CsvFileStore::new(config.data_dir());
    for step in &config.steps {
        if let Some(file) = &step.file {
            files.set_file(&step.object_type, data_role, file);
        }
        if let Some(result_file) = &step.result_file {
            files.set_file(&step.object_type, FileRole::Result, result_file);
        }
    }
    files
}

/// Run an extraction described by `config`, writing OUTPUT files.
pub async fn run_extract(
    config: &OperationConfig,
    metadata: Arc<dyn MetadataProvider>,
    store: Arc<dyn RecordStore>,
    batch_size: usize,
) -> Result<OperationOutcome> {
    let files = file_store(config, FileRole::Output);
    let mut operation =
        ExtractOperation::new(metadata, store, Box::new(files)).with_batch_size(batch_size);
    for step in &config.steps {
        operation.add_step(&step.object_type, step.field_list(), step.extract_scope()?);
    }

    operation
        .initialize()
        .await
        .context("Failed to initialize extraction")?;
    let outcome = operation.execute().await;

    for step in &config.steps {
        tracing::info!(
            "{}: {} records extracted",
            step.object_type,
            operation.extracted_count(&step.object_type)
        );
    }
    Ok(outcome)
}

/// Run a load described by `config`, reading INPUT files.
///
/// With a state manager the stage and identifier map are saved as the load
/// progresses; `resume` picks them up first.
pub async fn run_load(
    config: &OperationConfig,
    metadata: Arc<dyn MetadataProvider>,
    store: Arc<dyn RecordStore>,
    batch_size: usize,
    state: Option<StateManager>,
    resume: bool,
) -> Result<OperationOutcome> {
    let files = file_store(config, FileRole::Input);
    let mut operation =
        LoadOperation::new(metadata, store, Box::new(files)).with_batch_size(batch_size);
    match state {
        Some(manager) => operation = operation.with_state_manager(manager),
        None if resume => anyhow::bail!("--resume needs load state storage"),
        None => {}
    }
    for step in &config.steps {
        operation.add_step(&step.object_type, step.field_list());
    }

    operation
        .initialize()
        .await
        .context("Failed to initialize load")?;
    if resume {
        operation
            .resume()
            .await
            .context("Failed to read saved load state")?;
    }
    Ok(operation.execute().await)
}

/// Load the schema catalog used as metadata provider.
pub fn load_schema(path: &Path) -> Result<sync_core::SchemaCatalog> {
    sync_core::SchemaCatalog::from_file(path)
        .with_context(|| format!("Failed to load schema from {}", path.display()))
}
