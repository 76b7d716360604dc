//! State shared by every step of one operation.
//!
//! The context owns the collaborators (metadata provider, record store, file
//! store), the identifier map and the error ledger. Steps only touch the
//! identifier map and the ledger through [`OperationContext::register_new_id`],
//! [`OperationContext::get_new_id`] and [`OperationContext::register_error`].

use std::collections::BTreeMap;
use std::sync::Arc;

use sobject_sync_file::{
    result_headers, FileRole, FileStore, Record, ERROR_COLUMN, NEW_ID_COLUMN, ORIGINAL_ID_COLUMN,
};
use tracing::{debug, error, warn};

use crate::classify::Scope;
use crate::extract::ExtractionState;
use crate::schema::MetadataProvider;
use crate::store::RecordStore;

/// Default number of records per store call
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// One entry of the error ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub object_type: String,
    /// Source-side identifier of the failing record, if the failure has one
    pub original_id: Option<String>,
    pub message: String,
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.original_id {
            Some(id) => write!(f, "{} {}: {}", self.object_type, id, self.message),
            None => write!(f, "{}: {}", self.object_type, self.message),
        }
    }
}

/// Collaborators and bookkeeping for one operation run.
pub struct OperationContext {
    scope: Scope,
    metadata: Arc<dyn MetadataProvider>,
    store: Arc<dyn RecordStore>,
    files: Box<dyn FileStore>,
    batch_size: usize,
    id_map: BTreeMap<String, String>,
    errors: Vec<OperationError>,
    pub(crate) extraction: ExtractionState,
}

impl OperationContext {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        store: Arc<dyn RecordStore>,
        files: Box<dyn FileStore>,
    ) -> Self {
        Self {
            scope: Scope::default(),
            metadata,
            store,
            files,
            batch_size: DEFAULT_BATCH_SIZE,
            id_map: BTreeMap::new(),
            errors: Vec::new(),
            extraction: ExtractionState::default(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub(crate) fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    pub fn metadata(&self) -> &dyn MetadataProvider {
        self.metadata.as_ref()
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store)
    }

    pub fn files(&mut self) -> &mut dyn FileStore {
        self.files.as_mut()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    /// Record that `original_id` was created as `new_id`.
    ///
    /// Also writes an `{Original Id, New Id}` row to the object type's result
    /// file. A repeated `original_id` overwrites the earlier mapping.
    pub fn register_new_id(&mut self, object_type: &str, original_id: &str, new_id: &str) {
        if let Some(previous) = self
            .id_map
            .insert(original_id.to_string(), new_id.to_string())
        {
            debug!("{object_type} {original_id} was already mapped to {previous}; now {new_id}");
        }

        let mut row = Record::new();
        row.insert(ORIGINAL_ID_COLUMN.to_string(), original_id.to_string());
        row.insert(NEW_ID_COLUMN.to_string(), new_id.to_string());
        self.write_result(object_type, &row);
    }

    /// Identifier assigned to `original_id`, if it has been loaded.
    pub fn get_new_id(&self, original_id: &str) -> Option<&str> {
        self.id_map.get(original_id).map(String::as_str)
    }

    /// Append a failure to the error ledger.
    ///
    /// Also writes an `{Original Id, Error}` row (just `{Error}` without an
    /// originating record) to the object type's result file.
    pub fn register_error(
        &mut self,
        object_type: &str,
        original_id: Option<&str>,
        message: impl Into<String>,
    ) {
        let error = OperationError {
            object_type: object_type.to_string(),
            original_id: original_id.map(String::from),
            message: message.into(),
        };
        warn!("Error registered: {error}");

        let mut row = Record::new();
        if let Some(id) = &error.original_id {
            row.insert(ORIGINAL_ID_COLUMN.to_string(), id.clone());
        }
        row.insert(ERROR_COLUMN.to_string(), error.message.clone());
        self.write_result(object_type, &row);

        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// The error ledger, in registration order.
    pub fn errors(&self) -> &[OperationError] {
        &self.errors
    }

    /// Number of mapped identifiers.
    pub fn id_count(&self) -> usize {
        self.id_map.len()
    }

    /// The identifier map, for persisting.
    pub(crate) fn id_map(&self) -> &BTreeMap<String, String> {
        &self.id_map
    }

    /// Seed the identifier map from a persisted state.
    ///
    /// Restored mappings are not written to result files again.
    pub(crate) fn restore_id_map(&mut self, id_map: BTreeMap<String, String>) {
        self.id_map.extend(id_map);
    }

    pub fn flush_files(&mut self) {
        if let Err(e) = self.files.flush() {
            error!("Failed to flush output files: {e:#}");
        }
    }

    fn write_result(&mut self, object_type: &str, row: &Record) {
        let result = self
            .files
            .writer(object_type, FileRole::Result, &result_headers())
            .and_then(|writer| writer.write(row));
        // The ledger stays authoritative when the result file cannot be written
        if let Err(e) = result {
            error!("Failed to write result row for {object_type}: {e:#}");
        }
    }
}
