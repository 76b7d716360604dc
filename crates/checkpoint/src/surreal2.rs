//! SurrealDB v2 SDK load state storage implementation.

use anyhow::Result;
use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::sql::{Id, Thing};

use crate::store::{StateID, StateStore};
use crate::LoadState;

/// SurrealDB v2 SDK implementation of StateStore trait.
///
/// Stores one record per operation in a SurrealDB table.
pub struct Surreal2Store {
    client: surrealdb::Surreal<Any>,
    table_name: String,
}

impl Surreal2Store {
    /// Create a new Surreal2Store with the given client and table name.
    pub fn new(client: surrealdb::Surreal<Any>, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Convert a StateID to a SurrealDB Thing (record ID).
    fn to_thing(&self, id: &StateID) -> Thing {
        Thing::from((self.table_name.as_str(), Id::String(id.key())))
    }
}

#[async_trait]
impl StateStore for Surreal2Store {
    async fn store_state(&self, id: &StateID, state: &LoadState) -> Result<()> {
        let thing = self.to_thing(id);
        self.client
            .query("UPSERT $record_id CONTENT $content")
            .bind(("record_id", thing))
            .bind(("content", state.clone()))
            .await?
            .check()?;
        tracing::info!(
            "Stored load state ({}, {} mapped ids) in SurrealDB table '{}'",
            state.stage,
            state.id_map.len(),
            self.table_name
        );
        Ok(())
    }

    async fn read_state(&self, id: &StateID) -> Result<Option<LoadState>> {
        let thing = self.to_thing(id);
        let mut response = self
            .client
            .query("SELECT * FROM $record_id")
            .bind(("record_id", thing))
            .await?;
        let states: Vec<LoadState> = response.take(0)?;
        Ok(states.into_iter().next())
    }

    async fn clear_state(&self, id: &StateID) -> Result<()> {
        let thing = self.to_thing(id);
        self.client
            .query("DELETE $record_id")
            .bind(("record_id", thing))
            .await?
            .check()?;
        Ok(())
    }
}
