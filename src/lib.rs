/*!
 * fieldvault - field data lifecycle management
 *
 * Organizes raw field recordings into datasets (expeditions) and missions
 * (deployments), with:
 * - Staging with SHA-256 digests captured up front
 * - Verified commits that reject any copy not matching its staged digest
 * - Per-dataset and per-mission integrity manifests
 * - Verified duplication to backup destinations
 * - Readme- and validation-gated push to permanent storage
 * - Schema-versioned persisted state with pure migrations
 */

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod manager;
pub mod state;

// Re-export commonly used types
pub use config::{AppConfig, LogLevel};
pub use self::core::{Dataset, Mission, StageWindow, StagedFile, StagingArea};
pub use error::{ErrorCategory, FieldError, Result};
pub use fieldvault_core_manifest::{Manifest, Metadata, ValidationMethod};
pub use manager::DataManager;
pub use state::{JsonFileStore, MemoryStore, StateStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
