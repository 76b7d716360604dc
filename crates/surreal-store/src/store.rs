//! Record store backed by SurrealDB v2.
//!
//! Each object type is a table. A record is stored at
//! `<object_type>:<ulid>` as `{ record_id, fields }`, where `record_id`
//! repeats the ulid and `fields` holds the string-valued columns.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::sql::{Id, Thing};
use surrealdb::Surreal;
use sync_core::{Filter, Record, RecordResult, RecordStore, RecordUpdate, ID_COLUMN};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    record_id: String,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

impl StoredRecord {
    fn into_record(self, projection: &[String]) -> Record {
        projection
            .iter()
            .map(|name| {
                let value = if name == ID_COLUMN {
                    self.record_id.clone()
                } else {
                    self.fields.get(name).cloned().unwrap_or_default()
                };
                (name.clone(), value)
            })
            .collect()
    }

    fn as_record(&self) -> Record {
        let mut record: Record = self.fields.clone();
        record.insert(ID_COLUMN.to_string(), self.record_id.clone());
        record
    }
}

/// SurrealDB implementation of [`RecordStore`].
pub struct SurrealRecordStore {
    client: Surreal<Any>,
}

impl SurrealRecordStore {
    pub fn new(client: Surreal<Any>) -> Self {
        Self { client }
    }

    fn thing(object_type: &str, id: &str) -> Thing {
        Thing::from((object_type, Id::String(id.to_string())))
    }

    async fn select(&self, object_type: &str, filter: &Filter) -> Result<Vec<StoredRecord>> {
        let query = self.client.query(match filter {
            Filter::All => "SELECT * FROM type::table($tb)",
            Filter::Ids(_) => "SELECT * FROM type::table($tb) WHERE record_id IN $ids",
            Filter::FieldIn { field, .. } if field == ID_COLUMN => {
                "SELECT * FROM type::table($tb) WHERE record_id IN $ids"
            }
            Filter::FieldIn { .. } => {
                "SELECT * FROM type::table($tb) WHERE fields[$field] IN $values"
            }
        });
        let query = query.bind(("tb", object_type.to_string()));
        let mut response = match filter {
            Filter::All => query.await?,
            Filter::Ids(ids) => query.bind(("ids", ids.iter().cloned().collect::<Vec<_>>())).await?,
            Filter::FieldIn { field, values } if field == ID_COLUMN => {
                query.bind(("ids", values.iter().cloned().collect::<Vec<_>>())).await?
            }
            Filter::FieldIn { field, values } => {
                query
                    .bind(("field", field.clone()))
                    .bind(("values", values.iter().cloned().collect::<Vec<_>>()))
                    .await?
            }
        };
        let records: Vec<StoredRecord> = response
            .take(0)
            .with_context(|| format!("Failed to read {object_type} records"))?;
        Ok(records)
    }

    /// Create one record. The outer error means the statement never ran.
    async fn create_one(&self, object_type: &str, record: &Record) -> Result<RecordResult<String>> {
        let record_id = ulid::Ulid::new().to_string();
        let content = StoredRecord {
            record_id: record_id.clone(),
            fields: record
                .iter()
                .filter(|(name, _)| name.as_str() != ID_COLUMN)
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        };

        let response = self
            .client
            .query("CREATE $record_id CONTENT $content")
            .bind(("record_id", Self::thing(object_type, &record_id)))
            .bind(("content", content))
            .await
            .with_context(|| format!("Failed to create {object_type} record"))?;
        Ok(match response.check() {
            Ok(_) => Ok(record_id),
            Err(e) => Err(e.to_string()),
        })
    }

    /// Update one record. The outer error means the statements never ran.
    async fn update_one(&self, object_type: &str, update: &RecordUpdate) -> Result<RecordResult<()>> {
        let thing = Self::thing(object_type, &update.id);
        let mut response = self
            .client
            .query("SELECT * FROM $record_id")
            .bind(("record_id", thing.clone()))
            .await
            .with_context(|| format!("Failed to read {object_type} record {}", update.id))?;
        let existing: Vec<StoredRecord> = response.take(0)?;
        let Some(mut stored) = existing.into_iter().next() else {
            return Ok(Err(format!(
                "ENTITY_IS_DELETED: {object_type} {} does not exist",
                update.id
            )));
        };

        stored.fields.extend(
            update
                .fields
                .iter()
                .filter(|(name, _)| name.as_str() != ID_COLUMN)
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        let response = self
            .client
            .query("UPDATE $record_id CONTENT $content")
            .bind(("record_id", thing))
            .bind(("content", stored))
            .await
            .with_context(|| format!("Failed to update {object_type} record {}", update.id))?;
        Ok(match response.check() {
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        })
    }
}

#[async_trait]
impl RecordStore for SurrealRecordStore {
    async fn query(&self, object_type: &str, fields: &[String], filter: &Filter) -> Result<Vec<Record>> {
        let stored = self.select(object_type, filter).await?;
        let records: Vec<Record> = stored
            .into_iter()
            .filter(|r| filter.matches(&r.as_record()))
            .map(|r| r.into_record(fields))
            .collect();
        debug!("Queried {} {object_type} records", records.len());
        Ok(records)
    }

    /// A failure reaching the database on the first record fails the call;
    /// on a later record it becomes that record's outcome, so the ids of
    /// records already created are still returned.
    async fn create(&self, object_type: &str, records: &[Record]) -> Result<Vec<RecordResult<String>>> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            match self.create_one(object_type, record).await {
                Ok(result) => results.push(result),
                Err(e) if results.is_empty() => return Err(e),
                Err(e) => results.push(Err(format!("{e:#}"))),
            }
        }
        Ok(results)
    }

    async fn update(&self, object_type: &str, updates: &[RecordUpdate]) -> Result<Vec<RecordResult<()>>> {
        let mut results = Vec::with_capacity(updates.len());
        for update in updates {
            match self.update_one(object_type, update).await {
                Ok(result) => results.push(result),
                Err(e) if results.is_empty() => return Err(e),
                Err(e) => results.push(Err(format!("{e:#}"))),
            }
        }
        Ok(results)
    }
}
