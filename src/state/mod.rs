//! Persisted application state
//!
//! State documents are plain JSON values carrying a `schema_version` tag.
//! Storage goes through the [`StateStore`] port:
//! - `JsonFileStore`: atomic JSON file on disk
//! - `MemoryStore`: in-memory document with a save counter, for tests
//!
//! [`migrate`] upgrades older documents step by step before they are deserialized.

pub mod migrate;
mod store;

pub use migrate::{migrate_dataset, migrate_manager, CURRENT_SCHEMA_VERSION, SCHEMA_VERSION_KEY};
pub use store::{JsonFileStore, MemoryStore, StateStore};
