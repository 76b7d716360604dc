//! Record store contract.
//!
//! The record store is the external system records are extracted from and
//! loaded into. The engine only needs three operations, all working on
//! string-valued [`Record`]s keyed by field name.

use async_trait::async_trait;
use std::collections::BTreeSet;

pub use sobject_sync_file::{Record, ID_COLUMN};

/// Which records of an object type a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Every record
    All,
    /// Records whose `Id` is in the set
    Ids(BTreeSet<String>),
    /// Records whose `field` holds one of `values`
    FieldIn {
        field: String,
        values: BTreeSet<String>,
    },
}

impl Filter {
    /// Whether `record` passes this filter.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::Ids(ids) => record
                .get(sobject_sync_file::ID_COLUMN)
                .is_some_and(|id| ids.contains(id)),
            Filter::FieldIn { field, values } => record
                .get(field)
                .is_some_and(|value| !value.is_empty() && values.contains(value)),
        }
    }
}

/// New values for some fields of an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    /// Identifier of the record in the store
    pub id: String,
    /// Fields to overwrite
    pub fields: Record,
}

/// Outcome of one record in a batch: `Err` carries the store's message.
pub type RecordResult<T> = Result<T, String>;

/// Trait for reading and writing records of the external store.
///
/// `Err` from any method means the whole call failed; per-record failures
/// are reported inside the returned vector, one entry per input, in order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch records of `object_type` matching `filter`, projected to `fields`.
    async fn query(
        &self,
        object_type: &str,
        fields: &[String],
        filter: &Filter,
    ) -> anyhow::Result<Vec<Record>>;

    /// Create records; each success carries the identifier the store assigned.
    ///
    /// Any `Id` value in the input records is ignored.
    async fn create(
        &self,
        object_type: &str,
        records: &[Record],
    ) -> anyhow::Result<Vec<RecordResult<String>>>;

    /// Overwrite fields of existing records.
    async fn update(
        &self,
        object_type: &str,
        updates: &[RecordUpdate],
    ) -> anyhow::Result<Vec<RecordResult<()>>>;
}

/// Project `record` onto `fields`, filling missing fields with "".
pub fn project(record: &Record, fields: &[String]) -> Record {
    fields
        .iter()
        .map(|f| (f.clone(), record.get(f).cloned().unwrap_or_default()))
        .collect()
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

    #[test]
    fn test_filter_matches() {
        let r = record(&[("Id", "003A"), ("AccountId", "001A"), ("ReportsToId", "")]);

        assert!(Filter::All.matches(&r));
        assert!(Filter::Ids(BTreeSet::from(["003A".to_string()])).matches(&r));
        assert!(!Filter::Ids(BTreeSet::from(["003B".to_string()])).matches(&r));
        assert!(Filter::FieldIn {
            field: "AccountId".to_string(),
            values: BTreeSet::from(["001A".to_string()]),
        }
        .matches(&r));
        // An empty value never matches, even against an empty candidate
        assert!(!Filter::FieldIn {
            field: "ReportsToId".to_string(),
            values: BTreeSet::from([String::new()]),
        }
        .matches(&r));
    }

    #[test]
    fn test_project() {
        let r = record(&[("Id", "001A"), ("Name", "Acme"), ("Phone", "555")]);
        let projected = project(&r, &["Id".to_string(), "ParentId".to_string()]);
        assert_eq!(projected, record(&[("Id", "001A"), ("ParentId", "")]));
    }
}
