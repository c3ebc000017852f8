//! Storage backends for state documents

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FieldError, Result};

/// Where state documents are read from and written to
pub trait StateStore {
    /// Stored document, or `None` when nothing has been saved yet
    fn load(&self) -> Result<Option<Value>>;

    /// Replace the stored document
    fn save(&self, document: &Value) -> Result<()>;
}

/// Pretty JSON file at a fixed path, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, content)?;
        if let Err(e) = fs::File::open(&tmp_path).and_then(|file| file.sync_all()) {
            warn!(error = %e, "Failed to sync temp file to disk");
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), "Atomic write completed");
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let document = serde_json::from_str(&contents)
            .map_err(|e| FieldError::CorruptState(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(document))
    }

    fn save(&self, document: &Value) -> Result<()> {
        let content = serde_json::to_string_pretty(document)?;
        self.write_atomic(&content)
    }
}

/// In-memory store; clones share the same document and counter
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    document: Arc<RwLock<Option<Value>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `document`
    pub fn with_document(document: Value) -> Self {
        Self {
            document: Arc::new(RwLock::new(Some(document))),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last saved document
    pub fn document(&self) -> Option<Value> {
        self.document.read().ok().and_then(|doc| doc.clone())
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<Value>> {
        self.document
            .read()
            .map(|doc| doc.clone())
            .map_err(|_| FieldError::CorruptState("memory store lock poisoned".into()))
    }

    fn save(&self, document: &Value) -> Result<()> {
        let mut slot = self
            .document
            .write()
            .map_err(|_| FieldError::CorruptState("memory store lock poisoned".into()))?;
        *slot = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
