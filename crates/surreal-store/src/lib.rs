//! SurrealDB v2 backend for sobject-sync.
//!
//! - [`surreal_connect`] opens a client with retries
//! - [`SurrealRecordStore`] implements the engine's record store contract

mod connect;
mod store;

pub use connect::{surreal_connect, surreal_connect_with_retries, SurrealOpts};
pub use store::SurrealRecordStore;
