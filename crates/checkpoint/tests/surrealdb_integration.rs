//! Integration tests for load state storage in SurrealDB.
//!
//! These tests run against an embedded in-memory SurrealDB instance.

use checkpoint::{LoadState, Stage, StateID, StateStore, Surreal2Store};
use std::collections::BTreeMap;
use surrealdb::engine::any;

async fn connect() -> anyhow::Result<surrealdb::Surreal<any::Any>> {
    let surreal = any::connect("mem://").await?;
    surreal.use_ns("test").use_db("test").await?;
    Ok(surreal)
}

#[tokio::test]
async fn test_state_store_roundtrip() -> anyhow::Result<()> {
    let surreal = connect().await?;
    let store = Surreal2Store::new(surreal, "load_state".to_string());
    let id = StateID::new("accounts");

    let mut id_map = BTreeMap::new();
    id_map.insert("001000000000000".to_string(), "001000000000001".to_string());
    let state = LoadState::new("accounts", Stage::Dependents, id_map);

    store.store_state(&id, &state).await?;

    let loaded = store.read_state(&id).await?;
    assert!(loaded.is_some(), "State should be found after storing");

    let loaded = loaded.unwrap();
    assert_eq!(loaded.operation, "accounts");
    assert_eq!(loaded.stage, Stage::Dependents);
    assert_eq!(loaded.id_map["001000000000000"], "001000000000001");

    store.clear_state(&id).await?;
    assert!(store.read_state(&id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_state_store_not_found() -> anyhow::Result<()> {
    let surreal = connect().await?;
    let store = Surreal2Store::new(surreal, "load_state".to_string());

    let loaded = store.read_state(&StateID::new("never-stored")).await?;
    assert!(loaded.is_none());

    Ok(())
}
