//! In-memory record store.
//!
//! Backs dry runs and tests. Identifiers are assigned from a counter so runs
//! are reproducible.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use sobject_sync_file::ID_COLUMN;

use crate::store::{project, Filter, Record, RecordResult, RecordStore, RecordUpdate};

#[derive(Default)]
struct MemoryTables {
    tables: HashMap<String, Vec<Record>>,
    required: HashMap<String, BTreeSet<String>>,
    next_id: u64,
}

/// Record store holding every object type in memory.
///
/// Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, MemoryTables> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add existing records (with their own `Id`) to `object_type`.
    pub fn with_records(self, object_type: &str, records: Vec<Record>) -> Self {
        self.tables()
            .tables
            .entry(object_type.to_string())
            .or_default()
            .extend(records);
        self
    }

    /// Reject creates and updates leaving `field` of `object_type` empty.
    pub fn with_required_field(self, object_type: &str, field: &str) -> Self {
        self.tables()
            .required
            .entry(object_type.to_string())
            .or_default()
            .insert(field.to_string());
        self
    }

    /// Snapshot of every record of `object_type`, in insertion order.
    pub fn records(&self, object_type: &str) -> Vec<Record> {
        self.tables()
            .tables
            .get(object_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Find a record of `object_type` by identifier.
    pub fn get(&self, object_type: &str, id: &str) -> Option<Record> {
        self.tables().tables.get(object_type).and_then(|records| {
            records
                .iter()
                .find(|r| r.get(ID_COLUMN).is_some_and(|v| v == id))
                .cloned()
        })
    }
}

impl MemoryTables {
    fn missing_required(&self, object_type: &str, record: &Record) -> Option<String> {
        self.required.get(object_type).and_then(|fields| {
            fields
                .iter()
                .find(|f| record.get(*f).map_or(true, |v| v.is_empty()))
                .map(|f| format!("REQUIRED_FIELD_MISSING: Required fields are missing: [{f}]"))
        })
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query(
        &self,
        object_type: &str,
        fields: &[String],
        filter: &Filter,
    ) -> anyhow::Result<Vec<Record>> {
        let tables = self.tables();
        Ok(tables
            .tables
            .get(object_type)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| filter.matches(r))
                    .map(|r| project(r, fields))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default())
    }

    async fn create(
        &self,
        object_type: &str,
        records: &[Record],
    ) -> anyhow::Result<Vec<RecordResult<String>>> {
        let mut tables = self.tables();
        let mut results = Vec::with_capacity(records.len());

        for record in records {
            if let Some(message) = tables.missing_required(object_type, record) {
                results.push(Err(message));
                continue;
            }

            tables.next_id += 1;
            let id = format!("NEW{:012}", tables.next_id);
            let mut stored = record.clone();
            stored.insert(ID_COLUMN.to_string(), id.clone());
            tables
                .tables
                .entry(object_type.to_string())
                .or_default()
                .push(stored);
            results.push(Ok(id));
        }

        Ok(results)
    }

    async fn update(
        &self,
        object_type: &str,
        updates: &[RecordUpdate],
    ) -> anyhow::Result<Vec<RecordResult<()>>> {
        let mut tables = self.tables();
        let mut results = Vec::with_capacity(updates.len());

        for update in updates {
            let Some(position) = tables.tables.get(object_type).and_then(|records| {
                records
                    .iter()
                    .position(|r| r.get(ID_COLUMN).is_some_and(|v| *v == update.id))
            }) else {
                results.push(Err(format!(
                    "ENTITY_IS_DELETED: {object_type} {} does not exist",
                    update.id
                )));
                continue;
            };

            let mut merged = tables.tables[object_type][position].clone();
            merged.extend(update.fields.clone());
            if let Some(message) = tables.missing_required(object_type, &merged) {
                results.push(Err(message));
                continue;
            }

            if let Some(records) = tables.tables.get_mut(object_type) {
                records[position] = merged;
            }
            results.push(Ok(()));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let results = store
            .create(
                "Account",
                &[record(&[("Name", "Acme")]), record(&[("Name", "Widgets")])],
            )
            .await
            .unwrap();

        assert_eq!(
            results,
            vec![Ok("NEW000000000001".to_string()), Ok("NEW000000000002".to_string())]
        );
        assert_eq!(store.get("Account", "NEW000000000002").unwrap()["Name"], "Widgets");
    }

    #[tokio::test]
    async fn test_create_rejects_missing_required_field() {
        let store = MemoryStore::new().with_required_field("Contact", "LastName");
        let results = store
            .create(
                "Contact",
                &[record(&[("LastName", "")]), record(&[("LastName", "Smith")])],
            )
            .await
            .unwrap();

        assert!(results[0].as_ref().unwrap_err().contains("LastName"));
        assert!(results[1].is_ok());
        assert_eq!(store.records("Contact").len(), 1);
    }

    #[tokio::test]
    async fn test_query_filters_and_projects() {
        let store = MemoryStore::new().with_records(
            "Contact",
            vec![
                record(&[("Id", "003A"), ("AccountId", "001A"), ("LastName", "Smith")]),
                record(&[("Id", "003B"), ("AccountId", "001B"), ("LastName", "Jones")]),
            ],
        );

        let fields = vec!["Id".to_string(), "LastName".to_string()];
        let all = store.query("Contact", &fields, &Filter::All).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(!all[0].contains_key("AccountId"));

        let children = store
            .query(
                "Contact",
                &fields,
                &Filter::FieldIn {
                    field: "AccountId".to_string(),
                    values: BTreeSet::from(["001B".to_string()]),
                },
            )
            .await
            .unwrap();
        assert_eq!(children, vec![record(&[("Id", "003B"), ("LastName", "Jones")])]);

        let none = store.query("Lead", &fields, &Filter::All).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new().with_records(
            "Account",
            vec![record(&[("Id", "001A"), ("Name", "Acme"), ("ParentId", "")])],
        );

        let results = store
            .update(
                "Account",
                &[
                    RecordUpdate {
                        id: "001A".to_string(),
                        fields: record(&[("ParentId", "001Z")]),
                    },
                    RecordUpdate {
                        id: "001Q".to_string(),
                        fields: record(&[("ParentId", "001Z")]),
                    },
                ],
            )
            .await
            .unwrap();

        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().contains("does not exist"));
        let updated = store.get("Account", "001A").unwrap();
        assert_eq!(updated["Name"], "Acme");
        assert_eq!(updated["ParentId"], "001Z");
    }
}
