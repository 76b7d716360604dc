//! Reference-following extraction.
//!
//! Every extracted record feeds the steps that have not run yet:
//!
//! - values of its self/dependent reference fields become *required ids*
//!   of the referenced object type
//! - its own id is signalled to every descendent reference `(child, field)`
//!   as a *pending lookup*: children whose `field` holds that id
//!
//! A step drains both until no new record turns up, which also closes
//! self-reference chains of any depth.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sobject_sync_file::{FileRole, FileStore, Record, ID_COLUMN};
use tracing::{debug, info};

use crate::context::OperationContext;
use crate::operation::{Operation, OperationOutcome};
use crate::schema::MetadataProvider;
use crate::step::{Step, StepFields};
use crate::store::{Filter, RecordStore};

/// Which records of an object type an extraction starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractScope {
    /// Every record
    All,
    /// Only records pulled in by other extracted records
    Descendents,
    /// The listed records, plus whatever `Descendents` would pull in
    Ids(BTreeSet<String>),
}

/// Ids requested from, and already written by, each object type.
#[derive(Debug, Default)]
pub(crate) struct ExtractionState {
    required: HashMap<String, BTreeSet<String>>,
    extracted: HashMap<String, BTreeSet<String>>,
    /// object type -> field -> ids the field should hold
    lookups: HashMap<String, BTreeMap<String, BTreeSet<String>>>,
    completed: BTreeSet<String>,
}

impl ExtractionState {
    pub(crate) fn require(&mut self, object_type: &str, id: &str) {
        if self.completed.contains(object_type) {
            debug!("{object_type} already extracted; dropping request for {id}");
            return;
        }
        if self.is_extracted(object_type, id) {
            return;
        }
        self.required
            .entry(object_type.to_string())
            .or_default()
            .insert(id.to_string());
    }

    pub(crate) fn signal(&mut self, object_type: &str, field: &str, id: &str) {
        if self.completed.contains(object_type) {
            debug!("{object_type} already extracted; dropping {field} lookup for {id}");
            return;
        }
        self.lookups
            .entry(object_type.to_string())
            .or_default()
            .entry(field.to_string())
            .or_default()
            .insert(id.to_string());
    }

    /// Remove and return the required ids of `object_type` not yet written.
    pub(crate) fn take_required(&mut self, object_type: &str) -> BTreeSet<String> {
        let mut ids = self.required.remove(object_type).unwrap_or_default();
        if let Some(extracted) = self.extracted.get(object_type) {
            ids.retain(|id| !extracted.contains(id));
        }
        ids
    }

    pub(crate) fn take_lookups(&mut self, object_type: &str) -> BTreeMap<String, BTreeSet<String>> {
        self.lookups.remove(object_type).unwrap_or_default()
    }

    /// Returns false if the record was written before.
    pub(crate) fn mark_extracted(&mut self, object_type: &str, id: &str) -> bool {
        self.extracted
            .entry(object_type.to_string())
            .or_default()
            .insert(id.to_string())
    }

    pub(crate) fn is_extracted(&self, object_type: &str, id: &str) -> bool {
        self.extracted
            .get(object_type)
            .is_some_and(|ids| ids.contains(id))
    }

    pub(crate) fn extracted_count(&self, object_type: &str) -> usize {
        self.extracted.get(object_type).map_or(0, BTreeSet::len)
    }

    pub(crate) fn complete(&mut self, object_type: &str) {
        self.required.remove(object_type);
        self.lookups.remove(object_type);
        self.completed.insert(object_type.to_string());
    }
}

/// Extracts one object type to its OUTPUT file.
pub struct ExtractStep {
    fields: StepFields,
    scope: ExtractScope,
}

impl ExtractStep {
    pub fn new(fields: StepFields, scope: ExtractScope) -> Self {
        Self { fields, scope }
    }

    async fn extract(&self, context: &mut OperationContext) -> Result<usize> {
        let object_type = self.fields.object_type();
        // A step extracting nothing still leaves a header-only file to load from
        context
            .files()
            .writer(object_type, FileRole::Output, self.fields.field_names())?;
        let store = context.store();
        let mut written = 0;

        if self.scope == ExtractScope::All {
            let records = store
                .query(object_type, self.fields.field_names(), &Filter::All)
                .await
                .with_context(|| format!("Failed to query all {object_type} records"))?;
            for record in records {
                if self.store_record(context, record)? {
                    written += 1;
                }
            }
            // Every record is out already
            context.extraction.take_required(object_type);
            context.extraction.take_lookups(object_type);
            return Ok(written);
        }

        loop {
            let ids = context.extraction.take_required(object_type);
            let lookups = context.extraction.take_lookups(object_type);
            if ids.is_empty() && lookups.is_empty() {
                break;
            }

            let mut filters = chunked(ids, context.batch_size())
                .map(Filter::Ids)
                .collect::<Vec<_>>();
            for (field, values) in lookups {
                filters.extend(
                    chunked(values, context.batch_size()).map(|values| Filter::FieldIn {
                        field: field.clone(),
                        values,
                    }),
                );
            }

            for filter in filters {
                written += self.query_and_store(context, &store, &filter).await?;
            }
        }

        Ok(written)
    }

    async fn query_and_store(
        &self,
        context: &mut OperationContext,
        store: &Arc<dyn RecordStore>,
        filter: &Filter,
    ) -> Result<usize> {
        let object_type = self.fields.object_type();
        let records = store
            .query(object_type, self.fields.field_names(), filter)
            .await
            .with_context(|| format!("Failed to query {object_type} records"))?;
        debug!("{filter:?} matched {} {object_type} records", records.len());

        let mut written = 0;
        for record in records {
            if self.store_record(context, record)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Write `record` and feed its references to the steps still to run.
    fn store_record(&self, context: &mut OperationContext, record: Record) -> Result<bool> {
        let object_type = self.fields.object_type();
        let id = match record.get(ID_COLUMN) {
            Some(id) if !id.is_empty() => id.clone(),
            _ => anyhow::bail!("{object_type} record returned without an Id"),
        };
        if !context.extraction.mark_extracted(object_type, &id) {
            return Ok(false);
        }

        context
            .files()
            .writer(object_type, FileRole::Output, self.fields.field_names())?
            .write(&record)?;

        for (field, targets) in &self.fields.lookup_targets {
            let Some(value) = record.get(field).filter(|v| !v.is_empty()) else {
                continue;
            };
            for target in targets {
                context.extraction.require(target, value);
            }
        }
        for descendent in &self.fields.descendent_lookups {
            context
                .extraction
                .signal(&descendent.object_type, &descendent.field, &id);
        }
        for field in &self.fields.self_lookups {
            context.extraction.signal(object_type, field, &id);
        }

        Ok(true)
    }
}

fn chunked(values: BTreeSet<String>, size: usize) -> impl Iterator<Item = BTreeSet<String>> {
    let values: Vec<String> = values.into_iter().collect();
    values
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().cloned().collect::<BTreeSet<_>>())
        .collect::<Vec<_>>()
        .into_iter()
}

#[async_trait]
impl Step for ExtractStep {
    fn fields(&self) -> &StepFields {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut StepFields {
        &mut self.fields
    }

    async fn execute(&mut self, context: &mut OperationContext) {
        let object_type = self.fields.object_type().to_string();
        info!("Extracting {object_type}: {}", self.get_field_list());

        match self.extract(context).await {
            Ok(written) => info!("Extracted {written} {object_type} records"),
            Err(e) => context.register_error(&object_type, None, format!("{e:#}")),
        }
        context.extraction.complete(&object_type);
    }

    async fn execute_dependent_updates(&mut self, _context: &mut OperationContext) {
        debug!("No dependent updates for extraction of {}", self.object_type());
    }
}

/// Operation writing each step's object type to its OUTPUT file.
pub struct ExtractOperation {
    operation: Operation,
}

impl ExtractOperation {
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

    /// Append an extract step; `Id` is added to `fields` when missing.
    pub fn add_step<I, S>(&mut self, object_type: &str, fields: I, scope: ExtractScope)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ExtractScope::Ids(ids) = &scope {
            let extraction = &mut self.operation.context_mut().extraction;
            for id in ids {
                extraction.require(object_type, id);
            }
        }
        let step = ExtractStep::new(StepFields::with_id(object_type, fields), scope);
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

    pub async fn execute(&mut self) -> OperationOutcome {
        self.operation.execute().await
    }

    /// Records of `object_type` written so far.
    pub fn extracted_count(&self, object_type: &str) -> usize {
        self.operation.context().extraction.extracted_count(object_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::schema::{FieldDescriptor, ObjectTypeSchema, SchemaCatalog};
    use crate::store::{RecordResult, RecordUpdate};
    use sobject_sync_file::MemoryFileStore;

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

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_records(
                "Account",
                vec![
                    record(&[("Id", "001P"), ("Name", "Parent"), ("OwnerId", "005A")]),
                    record(&[
                        ("Id", "001A"),
                        ("Name", "Acme"),
                        ("ParentId", "001P"),
                        ("PrimaryContact__c", "003A"),
                        ("OwnerId", "005A"),
                    ]),
                    record(&[("Id", "001C"), ("Name", "Child"), ("ParentId", "001A")]),
                    record(&[("Id", "001X"), ("Name", "Unrelated")]),
                ],
            )
            .with_records(
                "Contact",
                vec![
                    record(&[("Id", "003A"), ("LastName", "Primary"), ("AccountId", "001A")]),
                    record(&[("Id", "003B"), ("LastName", "Other"), ("AccountId", "001A")]),
                    record(&[("Id", "003X"), ("LastName", "Elsewhere"), ("AccountId", "001X")]),
                ],
            )
    }

    fn output_ids(files: &MemoryFileStore, object_type: &str) -> Vec<String> {
        files
            .rows(object_type, FileRole::Output)
            .iter()
            .map(|r| r["Id"].clone())
            .collect()
    }

    #[tokio::test]
    async fn test_extract_all_records() {
        let files = MemoryFileStore::new();
        let mut op = ExtractOperation::new(catalog(), Arc::new(store()), Box::new(files.clone()));
        op.add_step("Account", ["Name", "OwnerId"], ExtractScope::All);
        op.initialize().await.unwrap();

        assert_eq!(op.execute().await, OperationOutcome::Success);

        assert_eq!(
            files.headers("Account", FileRole::Output),
            vec!["Id", "Name", "OwnerId"]
        );
        assert_eq!(output_ids(&files, "Account"), vec!["001P", "001A", "001C", "001X"]);
        let rows = files.rows("Account", FileRole::Output);
        // Out-of-scope references are copied as they are
        assert_eq!(rows[1]["OwnerId"], "005A");
        assert_eq!(op.extracted_count("Account"), 4);
    }

    #[tokio::test]
    async fn test_extract_ids_follows_self_references_both_ways() {
        let files = MemoryFileStore::new();
        let mut op = ExtractOperation::new(catalog(), Arc::new(store()), Box::new(files.clone()));
        op.add_step(
            "Account",
            ["Name", "ParentId"],
            ExtractScope::Ids(BTreeSet::from(["001A".to_string()])),
        );
        op.initialize().await.unwrap();

        assert!(op.execute().await.is_success());

        let mut ids = output_ids(&files, "Account");
        ids.sort();
        assert_eq!(ids, vec!["001A", "001C", "001P"]);
    }

    #[tokio::test]
    async fn test_extract_descendents_and_cycle() {
        let files = MemoryFileStore::new();
        let mut op = ExtractOperation::new(catalog(), Arc::new(store()), Box::new(files.clone()));
        op.add_step(
            "Account",
            ["Name", "PrimaryContact__c"],
            ExtractScope::Ids(BTreeSet::from(["001A".to_string()])),
        );
        op.add_step("Contact", ["LastName", "AccountId"], ExtractScope::Descendents);
        op.initialize().await.unwrap();

        assert!(op.execute().await.is_success());

        assert_eq!(output_ids(&files, "Account"), vec!["001A"]);
        let mut contacts = output_ids(&files, "Contact");
        contacts.sort();
        assert_eq!(contacts, vec!["003A", "003B"]);
    }

    #[tokio::test]
    async fn test_extract_descendents_without_signals_is_empty() {
        let files = MemoryFileStore::new();
        let mut op = ExtractOperation::new(catalog(), Arc::new(store()), Box::new(files.clone()));
        op.add_step("Contact", ["LastName"], ExtractScope::Descendents);
        op.initialize().await.unwrap();

        assert!(op.execute().await.is_success());
        assert_eq!(op.extracted_count("Contact"), 0);
        assert_eq!(files.headers("Contact", FileRole::Output), vec!["Id", "LastName"]);
        assert!(files.rows("Contact", FileRole::Output).is_empty());
    }

    #[tokio::test]
    async fn test_extract_writes_each_record_once() {
        let files = MemoryFileStore::new();
        let mut op = ExtractOperation::new(catalog(), Arc::new(store()), Box::new(files.clone()))
            .with_batch_size(1);
        op.add_step(
            "Account",
            ["Name", "ParentId"],
            ExtractScope::Ids(BTreeSet::from(["001A".to_string(), "001C".to_string()])),
        );
        op.initialize().await.unwrap();

        assert!(op.execute().await.is_success());
        assert_eq!(files.rows("Account", FileRole::Output).len(), 3);
    }

    struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn query(
            &self,
            _object_type: &str,
            _fields: &[String],
            _filter: &Filter,
        ) -> Result<Vec<Record>> {
            anyhow::bail!("connection reset")
        }

        async fn create(
            &self,
            _object_type: &str,
            _records: &[Record],
        ) -> Result<Vec<RecordResult<String>>> {
            anyhow::bail!("connection reset")
        }

        async fn update(
            &self,
            _object_type: &str,
            _updates: &[RecordUpdate],
        ) -> Result<Vec<RecordResult<()>>> {
            anyhow::bail!("connection reset")
        }
    }

    #[tokio::test]
    async fn test_query_failure_registers_error_and_stops() {
        let files = MemoryFileStore::new();
        let mut op = ExtractOperation::new(catalog(), Arc::new(FailingStore), Box::new(files.clone()));
        op.add_step("Account", ["Name"], ExtractScope::All);
        op.add_step("Contact", ["LastName"], ExtractScope::All);
        op.initialize().await.unwrap();

        assert_eq!(op.execute().await, OperationOutcome::Failed);

        let errors = op.operation().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].object_type, "Account");
        assert_eq!(errors[0].original_id, None);
        assert!(errors[0].message.contains("connection reset"));
        assert!(files.rows("Contact", FileRole::Result).is_empty());
    }
}
