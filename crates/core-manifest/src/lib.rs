//! Integrity manifests and mission descriptors for fieldvault
//!
//! This crate owns the on-disk documents that protect field data:
//!
//! - **Manifest**: `manifest.json`, a map of relative path to SHA-256 digest and size
//!   for a directory subtree. Generated at directory creation, grown at commit,
//!   consulted at validation and duplication.
//! - **Descriptor**: `metadata.json`, the schema-validated record describing one
//!   mission (timestamp with offset, device, location taxonomy, notes, properties).
//!
//! # Example
//!
//! ```no_run
//! use fieldvault_core_manifest::{Manifest, ValidationMethod};
//! use std::path::Path;
//!
//! let manifest = Manifest::new("/data/2023.03.02.Reef.Palmyra/manifest.json");
//! let entries = manifest.read().unwrap();
//! let ok = Manifest::validate(
//!     &entries,
//!     [Path::new("/data/2023.03.02.Reef.Palmyra/readme.md")],
//!     ValidationMethod::Hash,
//!     manifest.root(),
//! )
//! .unwrap();
//! ```

pub mod checksum;
pub mod descriptor;
pub mod error;
pub mod manifest;
pub mod validate;

// Re-export main types for convenience
pub use checksum::calculate_checksum;
pub use descriptor::{Metadata, DESCRIPTOR_FILE_NAME};
pub use error::{Error, Result};
pub use manifest::{
    Discrepancy, FileEntry, Manifest, ManifestEntries, ValidationMethod, MANIFEST_FILE_NAME,
};
pub use validate::validate_descriptor;
