//! Dependency-aware extract/load engine.
//!
//! This crate moves records between a record store and per object type
//! files while keeping references between object types intact, including
//! self-references and reference cycles:
//!
//! - [`schema`] - Field descriptors and the YAML schema catalog
//! - [`classify`] - Reference field classification against a [`Scope`]
//! - [`step`] - The [`Step`] contract, one per object type
//! - [`operation`] - Two-pass, fail-fast execution over ordered steps
//! - [`extract`] / [`load`] - The two operation flavours
//! - [`store`] - The [`RecordStore`] contract
//!
//! # Architecture
//!
//! ```text
//! Operation ── OperationContext (scope, id map, error ledger)
//!    │               │
//!    │               ├─── MetadataProvider  (field maps)
//!    │               ├─── RecordStore       (query / create / update)
//!    │               └─── FileStore         (input / output / result files)
//!    │
//!    └─── Step × N   (ExtractStep or LoadStep, in execution order)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sync_core::{LoadOperation, MemoryStore, SchemaCatalog};
//! use sobject_sync_file::CsvFileStore;
//!
//! let mut load = LoadOperation::new(
//!     Arc::new(SchemaCatalog::from_file("schema.yaml")?),
//!     Arc::new(MemoryStore::new()),
//!     Box::new(CsvFileStore::new("data/")),
//! );
//! load.add_step("Account", ["Name", "ParentId"]);
//! load.add_step("Contact", ["LastName", "AccountId"]);
//! load.initialize().await?;
//! let outcome = load.execute().await;
//! ```

pub mod classify;
pub mod context;
pub mod extract;
pub mod load;
pub mod memory;
pub mod operation;
pub mod schema;
pub mod step;
pub mod store;

pub use classify::{classify_field, classify_fields, Classification, DescendentRef, FieldClass, Scope};
pub use context::{OperationContext, OperationError, DEFAULT_BATCH_SIZE};
pub use extract::{ExtractOperation, ExtractScope, ExtractStep};
pub use load::{LoadOperation, LoadStep};
pub use memory::MemoryStore;
pub use operation::{Operation, OperationOutcome};
pub use schema::{
    FieldDescriptor, FieldKind, FieldMap, MetadataProvider, ObjectTypeSchema, SchemaCatalog,
    SchemaError,
};
pub use step::{Step, StepFields};
pub use store::{Filter, Record, RecordResult, RecordStore, RecordUpdate, ID_COLUMN};
