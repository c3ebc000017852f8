/*!
 * Staging area shared by missions and datasets
 *
 * Staging records the intent to add a file: where it comes from, where it
 * will land and the SHA-256 digest of its bytes at staging time. Nothing is
 * copied until `commit`, which verifies every copy against that digest.
 */

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use fieldvault_core_manifest::calculate_checksum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::transfer::copy_verified;
use crate::error::{FieldError, Result};

/// One file waiting to be committed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StagedFile {
    /// Absolute source path
    pub origin_path: PathBuf,

    /// Absolute destination path
    pub target_path: PathBuf,

    /// SHA-256 of the origin when it was staged
    pub hash: String,
}

/// Inclusive modification-time window used to filter staged files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageWindow {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl StageWindow {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Result<Self> {
        if start > end {
            return Err(FieldError::InvertedTimeWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    /// Whether the file's modification time falls inside the window
    pub fn contains(&self, path: &Path) -> Result<bool> {
        let modified: DateTime<Utc> = fs::metadata(path)?.modified()?.into();
        Ok(modified >= self.start.with_timezone(&Utc) && modified <= self.end.with_timezone(&Utc))
    }
}

/// Set of staged files, ordered and deduplicated on (origin, target, hash)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagingArea {
    files: BTreeSet<StagedFile>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedFile> {
        self.files.iter()
    }

    /// Drop every staged entry, returning how many were discarded
    pub fn discard(&mut self) -> usize {
        let count = self.files.len();
        self.files.clear();
        if count > 0 {
            info!("Discarded {} staged files", count);
        }
        count
    }

    /// Stage `paths` into `dest_dir`
    ///
    /// A regular file lands at `dest_dir/<file name>`. A directory is walked and
    /// every regular file beneath it keeps its layout relative to that directory.
    /// With a `window`, files whose modification time lies outside it are skipped.
    ///
    /// Targets listed in `reserved` are refused before anything is staged.
    /// Re-staging an origin onto the same target replaces the earlier entry,
    /// so a source that changed after staging can simply be added again.
    /// Returns the number of newly staged or replaced entries.
    pub fn stage<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        dest_dir: &Path,
        reserved: &[PathBuf],
        window: Option<&StageWindow>,
    ) -> Result<usize> {
        let pairs = resolve_targets(paths, dest_dir)?;
        if let Some((_, target)) = pairs.iter().find(|(_, target)| reserved.contains(target)) {
            return Err(FieldError::ReservedTarget(target.clone()));
        }

        let mut added = 0;
        for (origin, target) in pairs {
            if let Some(window) = window {
                if !window.contains(&origin)? {
                    debug!("Skipping {} (outside time window)", origin.display());
                    continue;
                }
            }

            let hash = calculate_checksum(&origin)?;
            let previous: Vec<StagedFile> = self
                .files
                .iter()
                .filter(|s| s.origin_path == origin && s.target_path == target)
                .cloned()
                .collect();
            if previous.iter().any(|s| s.hash == hash) {
                continue;
            }
            for stale in &previous {
                debug!("Replacing stale entry for {} ({})", origin.display(), stale.hash);
                self.files.remove(stale);
            }

            info!(
                "Staging {} ({}) to {}",
                origin.display(),
                hash,
                target.display()
            );
            self.files.insert(StagedFile {
                origin_path: origin,
                target_path: target,
                hash,
            });
            added += 1;
        }
        Ok(added)
    }

    /// Copy and verify every staged file, clearing the set on success
    ///
    /// The first integrity failure aborts the commit and leaves the set untouched.
    pub fn commit(&mut self) -> Result<Vec<PathBuf>> {
        let mut committed = Vec::with_capacity(self.files.len());
        for staged in &self.files {
            copy_verified(&staged.origin_path, &staged.target_path, &staged.hash)?;
            info!(
                "Copied {} to {}",
                staged.origin_path.display(),
                staged.target_path.display()
            );
            committed.push(staged.target_path.clone());
        }
        self.files.clear();
        Ok(committed)
    }

    /// Rewrite every target under `from` to sit under `to`
    pub fn relocate(&mut self, from: &Path, to: &Path) {
        self.files = std::mem::take(&mut self.files)
            .into_iter()
            .map(|mut staged| {
                if let Ok(rest) = staged.target_path.strip_prefix(from) {
                    staged.target_path = to.join(rest);
                }
                staged
            })
            .collect();
    }
}

/// Expand `paths` into (absolute origin, target) pairs
fn resolve_targets<P: AsRef<Path>>(paths: &[P], dest_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut pairs = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let origin = fs::canonicalize(path)?;
        let file_type = fs::metadata(&origin)?.file_type();

        if file_type.is_file() {
            let name = origin
                .file_name()
                .ok_or_else(|| FieldError::UnsupportedPathType(path.to_path_buf()))?;
            pairs.push((origin.clone(), dest_dir.join(name)));
        } else if file_type.is_dir() {
            for entry in WalkDir::new(&origin).follow_links(true).sort_by_file_name() {
                let entry = entry.map_err(io::Error::from)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&origin)
                    .map_err(|_| FieldError::UnsupportedPathType(entry.path().to_path_buf()))?;
                pairs.push((entry.path().to_path_buf(), dest_dir.join(relative)));
            }
        } else {
            return Err(FieldError::UnsupportedPathType(path.to_path_buf()));
        }
    }
    Ok(pairs)
}
