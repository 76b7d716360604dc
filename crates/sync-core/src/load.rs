//! Two-pass load with identifier remapping.
//!
//! The main pass creates every INPUT row with the references that already
//! resolve through the identifier map and leaves the others unset. The
//! dependent pass re-reads INPUT and patches what the main pass could not
//! resolve, once every object type's records exist.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use checkpoint::StateManager;
use sobject_sync_file::{FileRole, FileStore, Record, ID_COLUMN};
use tracing::{debug, info, warn};

use crate::context::OperationContext;
use crate::operation::{Operation, OperationOutcome};
use crate::schema::MetadataProvider;
use crate::step::{Step, StepFields};
use crate::store::{RecordStore, RecordUpdate};

/// Loads one object type from its INPUT file.
pub struct LoadStep {
    fields: StepFields,
}

impl LoadStep {
    pub fn new(fields: StepFields) -> Self {
        Self { fields }
    }

    fn read_input(&self, context: &mut OperationContext) -> Result<Vec<Record>> {
        let object_type = self.fields.object_type();
        let rows = context
            .files()
            .read(object_type, FileRole::Input)
            .with_context(|| format!("Failed to read input for {object_type}"))?;

        if let Some(first) = rows.first() {
            let missing: Vec<&str> = self
                .fields
                .field_names()
                .iter()
                .filter(|f| !first.contains_key(*f))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                anyhow::bail!(
                    "Input for {object_type} is missing columns: {}",
                    missing.join(", ")
                );
            }
        }
        Ok(rows)
    }

    /// Record to create for `row`: requested fields, references remapped.
    fn prepare(&self, context: &OperationContext, row: &Record) -> Record {
        let mut record = Record::new();
        for field in self.fields.field_names() {
            if field == ID_COLUMN {
                continue;
            }
            let value = row.get(field).cloned().unwrap_or_default();
            let value = if !value.is_empty() && self.fields.all_lookups.contains(field) {
                // Unresolved references wait for the dependent pass
                context.get_new_id(&value).map(String::from).unwrap_or_default()
            } else {
                value
            };
            record.insert(field.clone(), value);
        }
        record
    }

    async fn load(&self, context: &mut OperationContext) -> Result<usize> {
        let object_type = self.fields.object_type();
        let store = context.store();
        let rows = self.read_input(context)?;

        let mut pending: Vec<&Record> = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for (index, row) in rows.iter().enumerate() {
            match row.get(ID_COLUMN).filter(|id| !id.is_empty()) {
                None => context.register_error(
                    object_type,
                    None,
                    format!("Input row {} has no {ID_COLUMN}", index + 1),
                ),
                Some(id) if context.get_new_id(id).is_some() => skipped += 1,
                Some(_) => pending.push(row),
            }
        }
        if skipped > 0 {
            info!("Skipping {skipped} {object_type} records loaded by an earlier run");
        }

        let mut created = 0;
        for batch in pending.chunks(context.batch_size()) {
            // Built per batch so references to earlier batches resolve
            let records: Vec<Record> = batch.iter().map(|row| self.prepare(context, row)).collect();
            let results = store
                .create(object_type, &records)
                .await
                .with_context(|| format!("Failed to create {object_type} records"))?;
            if results.len() != batch.len() {
                anyhow::bail!(
                    "Record store returned {} results for {} {object_type} records",
                    results.len(),
                    batch.len()
                );
            }

            for (row, result) in batch.iter().zip(results) {
                let original_id = row.get(ID_COLUMN).map(String::as_str).unwrap_or_default();
                match result {
                    Ok(new_id) => {
                        context.register_new_id(object_type, original_id, &new_id);
                        created += 1;
                    }
                    Err(message) => context.register_error(object_type, Some(original_id), message),
                }
            }
            debug!("Created batch of {} {object_type} records", batch.len());
        }

        Ok(created)
    }

    async fn update_dependents(&self, context: &mut OperationContext) -> Result<usize> {
        let object_type = self.fields.object_type();
        let store = context.store();
        let rows = self.read_input(context)?;

        let mut updates: Vec<(String, RecordUpdate)> = Vec::new();
        for row in &rows {
            let Some(original_id) = row.get(ID_COLUMN).filter(|id| !id.is_empty()) else {
                continue;
            };
            let Some(new_id) = context.get_new_id(original_id) else {
                continue;
            };

            let mut fields = Record::new();
            for field in self.fields.deferred_fields() {
                let Some(value) = row.get(field).filter(|v| !v.is_empty()) else {
                    continue;
                };
                match context.get_new_id(value) {
                    Some(target) => {
                        fields.insert(field.clone(), target.to_string());
                    }
                    None => warn!(
                        "{object_type} {original_id}: {field} references {value}, which was not loaded; leaving it unset"
                    ),
                }
            }

            if !fields.is_empty() {
                updates.push((
                    original_id.clone(),
                    RecordUpdate {
                        id: new_id.to_string(),
                        fields,
                    },
                ));
            }
        }

        let mut updated = 0;
        for batch in updates.chunks(context.batch_size()) {
            let payload: Vec<RecordUpdate> = batch.iter().map(|(_, u)| u.clone()).collect();
            let results = store
                .update(object_type, &payload)
                .await
                .with_context(|| format!("Failed to update {object_type} records"))?;
            if results.len() != batch.len() {
                anyhow::bail!(
                    "Record store returned {} results for {} {object_type} updates",
                    results.len(),
                    batch.len()
                );
            }

            for ((original_id, _), result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => updated += 1,
                    Err(message) => {
                        context.register_error(object_type, Some(original_id.as_str()), message)
                    }
                }
            }
        }

        Ok(updated)
    }
}

#[async_trait]
impl Step for LoadStep {
    fn fields(&self) -> &StepFields {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut StepFields {
        &mut self.fields
    }

    async fn execute(&mut self, context: &mut OperationContext) {
        let object_type = self.fields.object_type().to_string();
        info!("Loading {object_type}: {}", self.get_field_list());

        match self.load(context).await {
            Ok(created) => info!("Created {created} {object_type} records"),
            Err(e) => context.register_error(&object_type, None, format!("{e:#}")),
        }
    }

    async fn execute_dependent_updates(&mut self, context: &mut OperationContext) {
        let object_type = self.fields.object_type().to_string();
        if self.fields.deferred_fields().next().is_none() {
            debug!("{object_type} has no references to resolve");
            return;
        }

        match self.update_dependents(context).await {
            Ok(updated) => info!("Resolved references on {updated} {object_type} records"),
            Err(e) => context.register_error(&object_type, None, format!("{e:#}")),
        }
    }
}

/// Operation loading each step's INPUT file into the record store.
pub struct LoadOperation {
    operation: Operation,
}

impl LoadOperation {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        store: Arc<dyn RecordStore>,
        files: Box<dyn FileStore>,
    ) -> Self {
        Self {
            operation: Operation::new(metadata, store, files),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.operation.context_mut().set_batch_size(batch_size);
        self
    }

    pub fn with_state_manager(mut self, manager: StateManager) -> Self {
        self.operation = self.operation.with_state_manager(manager);
        self
    }

    /// Append a load step; `Id` is added to `fields` when missing.
    pub fn add_step<I, S>(&mut self, object_type: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let step = LoadStep::new(StepFields::with_id(object_type, fields));
        self.operation.add_step(Box::new(step));
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn operation_mut(&mut self) -> &mut Operation {
        &mut self.operation
    }

    pub async fn initialize(&mut self) -> Result<()> {
        self.operation.initialize().await
    }

    /// Pick up stage and identifier map saved by an interrupted run.
    pub async fn resume(&mut self) -> Result<bool> {
        self.operation.resume().await
    }

    pub async fn execute(&mut self) -> OperationOutcome {
        self.operation.execute().await
    }

    pub fn get_new_id(&self, original_id: &str) -> Option<&str> {
        self.operation.get_new_id(original_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::schema::{FieldDescriptor, ObjectTypeSchema, SchemaCatalog};
    use checkpoint::{FilesystemStore, Stage};
    use sobject_sync_file::{MemoryFileStore, ERROR_COLUMN, NEW_ID_COLUMN, ORIGINAL_ID_COLUMN};
    use tempfile::TempDir;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn catalog() -> Arc<SchemaCatalog> {
        Arc::new(
            SchemaCatalog::new(vec![
                ObjectTypeSchema::new(
                    "Account",
                    vec![
                        FieldDescriptor::scalar("Name"),
                        FieldDescriptor::reference("ParentId", ["Account"]),
                        FieldDescriptor::reference("PrimaryContact__c", ["Contact"]),
                        FieldDescriptor::reference("OwnerId", ["User"]),
                    ],
                ),
                ObjectTypeSchema::new(
                    "Contact",
                    vec![
                        FieldDescriptor::scalar("LastName"),
                        FieldDescriptor::reference("AccountId", ["Account"]),
                    ],
                ),
            ])
            .unwrap(),
        )
    }

    fn input_files() -> MemoryFileStore {
        let files = MemoryFileStore::new();
        files.insert_rows(
            "Account",
            FileRole::Input,
            vec![
                record(&[
                    ("Id", "001C"),
                    ("Name", "Child"),
                    ("ParentId", "001P"),
                    ("PrimaryContact__c", ""),
                    ("OwnerId", "005A"),
                ]),
                record(&[
                    ("Id", "001P"),
                    ("Name", "Parent"),
                    ("ParentId", ""),
                    ("PrimaryContact__c", "003A"),
                    ("OwnerId", "005A"),
                ]),
            ],
        );
        files.insert_rows(
            "Contact",
            FileRole::Input,
            vec![record(&[
                ("Id", "003A"),
                ("LastName", "Primary"),
                ("AccountId", "001P"),
            ])],
        );
        files
    }

    fn operation(store: &MemoryStore, files: &MemoryFileStore) -> LoadOperation {
        let mut op = LoadOperation::new(catalog(), Arc::new(store.clone()), Box::new(files.clone()));
        op.add_step("Account", ["Name", "ParentId", "PrimaryContact__c", "OwnerId"]);
        op.add_step("Contact", ["LastName", "AccountId"]);
        op
    }

    #[tokio::test]
    async fn test_load_resolves_self_and_cyclic_references() {
        let store = MemoryStore::new();
        let files = input_files();
        let mut op = operation(&store, &files);
        op.initialize().await.unwrap();

        assert_eq!(op.execute().await, OperationOutcome::Success);

        let child_id = op.get_new_id("001C").unwrap().to_string();
        let parent_id = op.get_new_id("001P").unwrap().to_string();
        let contact_id = op.get_new_id("003A").unwrap().to_string();

        let child = store.get("Account", &child_id).unwrap();
        assert_eq!(child["ParentId"], parent_id);
        // Out of scope, copied verbatim
        assert_eq!(child["OwnerId"], "005A");

        let parent = store.get("Account", &parent_id).unwrap();
        assert_eq!(parent["PrimaryContact__c"], contact_id);

        let contact = store.get("Contact", &contact_id).unwrap();
        // Account rows existed by the time Contact was created
        assert_eq!(contact["AccountId"], parent_id);

        let results = files.rows("Account", FileRole::Result);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0][ORIGINAL_ID_COLUMN], "001C");
        assert_eq!(results[0][NEW_ID_COLUMN], child_id);
    }

    #[tokio::test]
    async fn test_main_pass_leaves_unresolved_references_unset() {
        let store = MemoryStore::new();
        let files = input_files();
        let mut op = operation(&store, &files);
        op.initialize().await.unwrap();

        // Only the main pass of Account, by failing Contact's input
        files.insert_rows("Contact", FileRole::Input, vec![record(&[("Id", "003A")])]);
        assert_eq!(op.execute().await, OperationOutcome::Failed);

        let child = store.get("Account", op.get_new_id("001C").unwrap()).unwrap();
        assert_eq!(child["ParentId"], "");
        let errors = op.operation().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].object_type, "Contact");
        assert!(errors[0].message.contains("missing columns: LastName, AccountId"));
    }

    #[tokio::test]
    async fn test_record_failure_skips_dependent_pass() {
        let store = MemoryStore::new().with_required_field("Account", "Name");
        let files = input_files();
        files.insert_rows(
            "Account",
            FileRole::Input,
            vec![
                record(&[("Id", "001C"), ("Name", ""), ("ParentId", ""), ("PrimaryContact__c", ""), ("OwnerId", "")]),
                record(&[("Id", "001P"), ("Name", "Parent"), ("ParentId", ""), ("PrimaryContact__c", ""), ("OwnerId", "")]),
            ],
        );
        let mut op = operation(&store, &files);
        op.initialize().await.unwrap();

        assert_eq!(op.execute().await, OperationOutcome::Failed);

        // The whole Account step ran; Contact never did
        assert!(op.get_new_id("001P").is_some());
        assert!(op.get_new_id("001C").is_none());
        assert!(store.records("Contact").is_empty());

        let results = files.rows("Account", FileRole::Result);
        let error_row = results.iter().find(|r| r[ORIGINAL_ID_COLUMN] == "001C").unwrap();
        assert!(error_row[ERROR_COLUMN].starts_with("REQUIRED_FIELD_MISSING"));
    }

    #[tokio::test]
    async fn test_row_without_id_is_an_error() {
        let store = MemoryStore::new();
        let files = MemoryFileStore::new();
        files.insert_rows(
            "Contact",
            FileRole::Input,
            vec![record(&[("Id", ""), ("LastName", "Nobody"), ("AccountId", "")])],
        );
        let mut op = LoadOperation::new(catalog(), Arc::new(store.clone()), Box::new(files.clone()));
        op.add_step("Contact", ["LastName", "AccountId"]);
        op.initialize().await.unwrap();

        assert_eq!(op.execute().await, OperationOutcome::Failed);
        let errors = op.operation().errors();
        assert_eq!(errors[0].original_id, None);
        assert_eq!(errors[0].message, "Input row 1 has no Id");
    }

    #[tokio::test]
    async fn test_unmapped_reference_is_skipped_in_dependent_pass() {
        let store = MemoryStore::new();
        let files = MemoryFileStore::new();
        files.insert_rows(
            "Account",
            FileRole::Input,
            vec![record(&[("Id", "001C"), ("Name", "Orphan"), ("ParentId", "001GONE")])],
        );
        let mut op = LoadOperation::new(catalog(), Arc::new(store.clone()), Box::new(files.clone()));
        op.add_step("Account", ["Name", "ParentId"]);
        op.initialize().await.unwrap();

        assert!(op.execute().await.is_success());
        let orphan = store.get("Account", op.get_new_id("001C").unwrap()).unwrap();
        assert_eq!(orphan["ParentId"], "");
    }

    #[tokio::test]
    async fn test_batches_resolve_earlier_batches() {
        let store = MemoryStore::new();
        let files = MemoryFileStore::new();
        files.insert_rows(
            "Account",
            FileRole::Input,
            vec![
                record(&[("Id", "001P"), ("Name", "Parent"), ("ParentId", "")]),
                record(&[("Id", "001C"), ("Name", "Child"), ("ParentId", "001P")]),
            ],
        );
        let mut op = LoadOperation::new(catalog(), Arc::new(store.clone()), Box::new(files.clone()))
            .with_batch_size(1);
        op.add_step("Account", ["Name", "ParentId"]);
        op.initialize().await.unwrap();

        assert!(op.execute().await.is_success());
        let records = store.records("Account");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["ParentId"], records[0]["Id"]);
    }

    #[tokio::test]
    async fn test_resume_does_not_create_twice() {
        let temp_dir = TempDir::new().unwrap();
        let manager = || StateManager::new("load", Box::new(FilesystemStore::new(temp_dir.path())));
        let store = MemoryStore::new();
        let files = input_files();
        files.insert_rows("Contact", FileRole::Input, vec![record(&[("Id", "003A")])]);

        let mut op = operation(&store, &files).with_state_manager(manager());
        op.initialize().await.unwrap();
        assert_eq!(op.execute().await, OperationOutcome::Failed);
        assert_eq!(store.records("Account").len(), 2);

        // Fix the input and run again
        files.insert_rows(
            "Contact",
            FileRole::Input,
            vec![record(&[("Id", "003A"), ("LastName", "Primary"), ("AccountId", "001P")])],
        );
        let mut resumed = operation(&store, &files).with_state_manager(manager());
        resumed.initialize().await.unwrap();
        assert!(resumed.resume().await.unwrap());
        assert_eq!(resumed.operation().stage(), Stage::Initial);

        assert!(resumed.execute().await.is_success());
        assert_eq!(store.records("Account").len(), 2);
        assert_eq!(store.records("Contact").len(), 1);

        let parent = store.get("Account", resumed.get_new_id("001P").unwrap()).unwrap();
        assert_eq!(parent["PrimaryContact__c"], resumed.get_new_id("003A").unwrap());

        // Rows of the failed run are kept next to the new ones
        assert_eq!(files.rows("Account", FileRole::Result).len(), 2);
        let contact_results = files.rows("Contact", FileRole::Result);
        assert_eq!(contact_results.len(), 2);
        assert!(!contact_results[0]["Error"].is_empty());
        assert_eq!(contact_results[1]["Original Id"], "003A");
        assert_eq!(
            contact_results[1]["New Id"],
            resumed.get_new_id("003A").unwrap()
        );
    }
}
