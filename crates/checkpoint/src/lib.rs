//! Load state management for sobject-sync
//!
//! A load runs in two passes: a main pass creating every record with the
//! references that can already be resolved, then a dependent-update pass
//! patching the rest. Persisting the [`Stage`] together with the identifier
//! map lets an interrupted load resume without creating records twice.
//!
//! # Architecture
//!
//! - [`LoadState`] is the persisted document (stage, identifier map)
//! - [`StateStore`] abstracts the storage backend
//! - [`StateManager`] binds a store to one operation
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - Stores state as JSON files
//! - `Surreal2Store` - Stores state in SurrealDB v2

mod config;
mod file;
mod filesystem;
mod manager;
mod phase;
pub mod store;
mod surreal2;


pub use config::StateStorage;
pub use file::LoadState;
pub use filesystem::FilesystemStore;
pub use manager::StateManager;
pub use phase::Stage;
pub use store::{StateID, StateStore};
pub use surreal2::Surreal2Store;
