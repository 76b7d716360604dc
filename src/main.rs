//! Command-line interface for sobject-sync
//!
//! # Usage Examples
//!
//! ## Extract
//! ```bash
//! sobject-sync extract \
//!   --config operation.yaml \
//!   --schema schema.yaml \
//!   --surreal-endpoint ws://localhost:8000 --namespace crm --database prod
//! ```
//!
//! ## Load
//! ```bash
//! # First run
//! sobject-sync load --config operation.yaml --schema schema.yaml
//!
//! # Pick up where an interrupted run stopped
//! sobject-sync load --config operation.yaml --schema schema.yaml --resume
//!
//! # Check references without touching SurrealDB
//! sobject-sync load --config operation.yaml --schema schema.yaml --dry-run
//! ```
//!
//! Per-record failures end up in each object type's result file; the
//! process exits non-zero when any were registered.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use checkpoint::{StateManager, StateStorage};
use clap::{Parser, Subcommand};
use sobject_sync::{load_schema, run_extract, run_load, OperationConfig, SurrealOpts};
use surreal_store::{surreal_connect, SurrealRecordStore};
use sync_core::{MemoryStore, OperationOutcome, RecordStore, DEFAULT_BATCH_SIZE};

#[derive(Parser)]
#[command(name = "sobject-sync")]
#[command(about = "Extract and load related records while keeping references intact")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract records to CSV files, following references between steps
    Extract {
        /// Operation file (YAML)
        #[arg(long)]
        config: PathBuf,

        /// Schema file describing object types and their fields (YAML)
        #[arg(long)]
        schema: PathBuf,

        /// SurrealDB options
        #[command(flatten)]
        surreal: SurrealOpts,

        /// Records per store call
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Load records from CSV files, remapping identifiers
    Load {
        /// Operation file (YAML)
        #[arg(long)]
        config: PathBuf,

        /// Schema file describing object types and their fields (YAML)
        #[arg(long)]
        schema: PathBuf,

        /// SurrealDB options
        #[command(flatten)]
        surreal: SurrealOpts,

        /// Records per store call
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Directory for saved load state
        #[arg(long, default_value = ".sobject-sync-state")]
        state_dir: String,

        /// Keep load state in this SurrealDB table instead of the state directory
        #[arg(long, conflicts_with = "no_state")]
        state_table: Option<String>,

        /// Do not save load state
        #[arg(long)]
        no_state: bool,

        /// Resume from saved load state
        #[arg(long, conflicts_with = "no_state")]
        resume: bool,

        /// Load into an in-memory store instead of SurrealDB
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Extract {
            config,
            schema,
            surreal,
            batch_size,
        } => {
            let operation = OperationConfig::from_file(&config)
                .with_context(|| format!("Failed to load operation from {}", config.display()))?;
            let catalog = Arc::new(load_schema(&schema)?);

            let opts: surreal_store::SurrealOpts = (&surreal).into();
            let client = surreal_connect(&opts, &surreal.namespace, &surreal.database).await?;
            let store: Arc<dyn RecordStore> = Arc::new(SurrealRecordStore::new(client));

            run_extract(&operation, catalog, store, batch_size).await?
        }
        Commands::Load {
            config,
            schema,
            surreal,
            batch_size,
            state_dir,
            state_table,
            no_state,
            resume,
            dry_run,
        } => {
            let operation = OperationConfig::from_file(&config)
                .with_context(|| format!("Failed to load operation from {}", config.display()))?;
            let catalog = Arc::new(load_schema(&schema)?);

            let (store, client): (Arc<dyn RecordStore>, _) = if dry_run {
                tracing::info!("Dry run: loading into an in-memory store");
                (Arc::new(MemoryStore::new()), None)
            } else {
                let opts: surreal_store::SurrealOpts = (&surreal).into();
                let client = surreal_connect(&opts, &surreal.namespace, &surreal.database).await?;
                (Arc::new(SurrealRecordStore::new(client.clone())), Some(client))
            };

            let storage = match (no_state || dry_run, state_table) {
                (true, _) => StateStorage::Disabled,
                (false, Some(table_name)) => StateStorage::SurrealDB { table_name },
                (false, None) => StateStorage::filesystem(state_dir),
            };
            let state = StateManager::from_storage(operation.name.clone(), &storage, client)?;

            run_load(&operation, catalog, store, batch_size, state, resume).await?
        }
    };

    if outcome == OperationOutcome::Failed {
        anyhow::bail!("Operation failed (code {}); see the result files", outcome.code());
    }
    Ok(())
}
