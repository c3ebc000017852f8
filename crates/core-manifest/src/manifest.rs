//! Integrity manifests
//!
//! A manifest maps the POSIX-style relative path of every tracked file under a
//! fixed root to its SHA-256 digest and size. Manifests are stored as
//! pretty-printed JSON objects:
//!
//! ```json
//! {
//!   "ED-00/RUN001/metadata.json": { "sha256sum": "9f86d0...", "size": 212 }
//! }
//! ```

use crate::checksum::calculate_checksum;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// File name used for every dataset and mission manifest
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Digest and size recorded for one file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Lowercase hex SHA-256 of the file content
    pub sha256sum: String,

    /// File size in bytes
    pub size: u64,
}

/// Relative path -> entry, ordered for stable output
pub type ManifestEntries = BTreeMap<String, FileEntry>;

/// How files are compared against manifest entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMethod {
    /// Recompute the SHA-256 digest
    #[default]
    Hash,
    /// Compare the current file size only
    Size,
}

impl ValidationMethod {
    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            ValidationMethod::Hash => "hash",
            ValidationMethod::Size => "size",
        }
    }
}

impl FromStr for ValidationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hash" => Ok(ValidationMethod::Hash),
            "size" => Ok(ValidationMethod::Size),
            other => Err(Error::UnsupportedMethod(other.to_string())),
        }
    }
}

/// A single disagreement between files and a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// File exists but has no manifest entry
    Untracked { key: String },
    /// Manifest entry whose file is gone
    Missing { key: String },
    /// Content digest differs
    HashMismatch {
        key: String,
        expected: String,
        actual: String,
    },
    /// Size differs
    SizeMismatch { key: String, expected: u64, actual: u64 },
}

impl Discrepancy {
    /// Manifest key this discrepancy refers to
    pub fn key(&self) -> &str {
        match self {
            Discrepancy::Untracked { key }
            | Discrepancy::Missing { key }
            | Discrepancy::HashMismatch { key, .. }
            | Discrepancy::SizeMismatch { key, .. } => key,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::Untracked { key } => write!(f, "{}: not in manifest", key),
            Discrepancy::Missing { key } => write!(f, "{}: missing on disk", key),
            Discrepancy::HashMismatch {
                key,
                expected,
                actual,
            } => write!(f, "{}: sha256 expected {}, got {}", key, expected, actual),
            Discrepancy::SizeMismatch {
                key,
                expected,
                actual,
            } => write!(f, "{}: size expected {}, got {}", key, expected, actual),
        }
    }
}

/// Manifest file bound to the directory its keys are relative to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    path: PathBuf,
    root: PathBuf,
}

impl Manifest {
    /// Manifest at `path`, keyed relative to the directory containing it
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { path, root }
    }

    /// Manifest at `path`, keyed relative to an explicit root
    pub fn with_root<P: Into<PathBuf>, R: Into<PathBuf>>(path: P, root: R) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
        }
    }

    /// Location of the manifest file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the keys are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Move both the manifest file location and its root from one tree to another
    pub fn rebase(&mut self, from: &Path, to: &Path) {
        if let Ok(rest) = self.path.strip_prefix(from) {
            self.path = to.join(rest);
        }
        if let Ok(rest) = self.root.strip_prefix(from) {
            self.root = to.join(rest);
        }
    }

    /// Load the stored entries
    pub fn read(&self) -> Result<ManifestEntries> {
        Self::read_from(&self.path)
    }

    /// Load entries from an arbitrary manifest file
    pub fn read_from(path: &Path) -> Result<ManifestEntries> {
        if !path.exists() {
            return Err(Error::manifest_not_found(path));
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Replace the stored entries
    pub fn write(&self, entries: &ManifestEntries) -> Result<()> {
        Self::write_to(entries, &self.path)
    }

    /// Write entries to an arbitrary location
    pub fn write_to(entries: &ManifestEntries, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Hash exactly `files` and overwrite any previous manifest content
    pub fn generate<I, P>(&self, files: I) -> Result<ManifestEntries>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let entries = Self::compute_entries(&self.root, files)?;
        self.write(&entries)?;
        debug!(
            "Generated manifest {} with {} entries",
            self.path.display(),
            entries.len()
        );
        Ok(entries)
    }

    /// Hash `files` and merge them into the stored entries (new values win)
    pub fn update<I, P>(&self, files: I) -> Result<ManifestEntries>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut entries = self.read()?;
        let fresh = Self::compute_entries(&self.root, files)?;
        let added = fresh.len();
        entries.extend(fresh);
        self.write(&entries)?;
        debug!("Updated manifest {} with {} files", self.path.display(), added);
        Ok(entries)
    }

    /// Compute entries for `files` keyed relative to `root`
    pub fn compute_entries<I, P>(root: &Path, files: I) -> Result<ManifestEntries>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut entries = ManifestEntries::new();
        for file in files {
            let file = file.as_ref();
            let key = Self::relative_key(root, file)?;
            let sha256sum = calculate_checksum(file)?;
            let size = fs::symlink_metadata(file)?.len();
            entries.insert(key, FileEntry { sha256sum, size });
        }
        Ok(entries)
    }

    /// POSIX-style key of `file` relative to `root`
    pub fn relative_key(root: &Path, file: &Path) -> Result<String> {
        let relative = file
            .strip_prefix(root)
            .map_err(|_| Error::invalid_path(file, root))?;

        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if parts.is_empty() {
            return Err(Error::invalid_path(file, root));
        }
        Ok(parts.join("/"))
    }

    /// Compare `files` (absolute, under `root`) against `entries`, collecting every disagreement
    pub fn verify<I, P>(
        entries: &ManifestEntries,
        files: I,
        method: ValidationMethod,
        root: &Path,
    ) -> Result<Vec<Discrepancy>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut discrepancies = Vec::new();
        for file in files {
            let file = file.as_ref();
            let key = Self::relative_key(root, file)?;
            let Some(entry) = entries.get(&key) else {
                discrepancies.push(Discrepancy::Untracked { key });
                continue;
            };

            match method {
                ValidationMethod::Hash => {
                    let actual = calculate_checksum(file)?;
                    if actual != entry.sha256sum {
                        discrepancies.push(Discrepancy::HashMismatch {
                            key,
                            expected: entry.sha256sum.clone(),
                            actual,
                        });
                    }
                }
                ValidationMethod::Size => {
                    let actual = fs::symlink_metadata(file)?.len();
                    if actual != entry.size {
                        discrepancies.push(Discrepancy::SizeMismatch {
                            key,
                            expected: entry.size,
                            actual,
                        });
                    }
                }
            }
        }
        Ok(discrepancies)
    }

    /// `true` when every file is tracked and matches its entry
    pub fn validate<I, P>(
        entries: &ManifestEntries,
        files: I,
        method: ValidationMethod,
        root: &Path,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Ok(Self::verify(entries, files, method, root)?.is_empty())
    }

    /// Entries whose file no longer exists under `root`
    pub fn missing_entries(entries: &ManifestEntries, root: &Path) -> Vec<Discrepancy> {
        entries
            .keys()
            .filter(|key| !root.join(key.as_str()).is_file())
            .map(|key| Discrepancy::Missing { key: key.clone() })
            .collect()
    }
}
