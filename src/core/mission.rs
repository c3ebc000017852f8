/*!
 * Missions: one field deployment inside a dataset
 */

use std::fs;
use std::path::{Component, Path, PathBuf};

use fieldvault_core_manifest::{Manifest, Metadata, DESCRIPTOR_FILE_NAME, MANIFEST_FILE_NAME};
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use super::staging::{StageWindow, StagingArea};
use crate::error::{FieldError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    path: PathBuf,
    metadata: Metadata,
    #[serde(default)]
    staging: StagingArea,
    /// Committed files, relative to the mission directory
    #[serde(default)]
    committed_files: Vec<PathBuf>,
    manifest: Manifest,
}

impl Mission {
    /// Mission bound to `path`; nothing is touched on disk
    pub fn new<P: Into<PathBuf>>(path: P, metadata: Metadata) -> Self {
        let path = path.into();
        let manifest = Manifest::new(path.join(MANIFEST_FILE_NAME));
        Self {
            path,
            metadata,
            staging: StagingArea::new(),
            committed_files: Vec::new(),
            manifest,
        }
    }

    /// Rebuild a mission from the descriptor stored in `path`
    pub fn load(path: &Path) -> Result<Self> {
        let metadata = Metadata::load(path)?;
        Ok(Self::new(path, metadata))
    }

    /// Create the mission directory, its descriptor and its initial manifest
    pub fn create(&self) -> Result<()> {
        if self.path.exists() {
            return Err(FieldError::MissionExists(self.path.clone()));
        }
        fs::create_dir_all(&self.path)?;
        self.metadata.write(&self.path)?;
        self.manifest.generate(self.files()?)?;
        info!("Created mission {} at {}", self.key(), self.path.display());
        Ok(())
    }

    /// Canonical registry key: `"<day dir> <mission name>"`
    pub fn key(&self) -> String {
        let name = |p: Option<&Path>| {
            p.and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        format!("{} {}", name(self.path.parent()), name(Some(self.path.as_path())))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn committed_files(&self) -> &[PathBuf] {
        &self.committed_files
    }

    /// Every regular file under the mission directory except its manifest
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let manifest_path = self.manifest.path();
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.path).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && entry.path() != manifest_path {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Stage `paths` under the mission directory, optionally below `destination`
    pub fn stage<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        destination: Option<&Path>,
        window: Option<&StageWindow>,
    ) -> Result<usize> {
        let dest_dir = match destination {
            Some(dest) => self.path.join(checked_destination(dest)?),
            None => self.path.clone(),
        };
        let reserved = self.reserved_files();
        self.staging.stage(paths, &dest_dir, &reserved, window)
    }

    /// Files the mission maintains itself and never accepts from staging
    pub fn reserved_files(&self) -> Vec<PathBuf> {
        vec![
            self.manifest.path().to_path_buf(),
            self.path.join(DESCRIPTOR_FILE_NAME),
        ]
    }

    /// Drop everything staged for this mission
    pub fn discard(&mut self) -> usize {
        self.staging.discard()
    }

    /// Copy and verify staged files, then record them in the mission manifest
    pub fn commit(&mut self) -> Result<Vec<PathBuf>> {
        let committed = self.staging.commit()?;
        self.manifest.update(&committed)?;
        for file in &committed {
            if let Ok(relative) = file.strip_prefix(&self.path) {
                self.committed_files.push(relative.to_path_buf());
            }
        }
        info!("Committed {} files to mission {}", committed.len(), self.key());
        Ok(committed)
    }

    /// Move every recorded path from one dataset root to another
    pub fn relocate(&mut self, from: &Path, to: &Path) {
        if let Ok(rest) = self.path.strip_prefix(from) {
            self.path = to.join(rest);
        }
        self.manifest.rebase(from, to);
        self.staging.relocate(from, to);
    }
}

/// Destination must be relative and stay inside the mission directory
fn checked_destination(dest: &Path) -> Result<&Path> {
    let escapes = dest
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(FieldError::InvalidDestination(dest.to_path_buf()));
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn metadata(mission: &str) -> Metadata {
        Metadata::new(
            Metadata::parse_timestamp("2023-03-02T00:11:00-08:00").unwrap(),
            "Device 1",
            "USA",
            "California",
            "Site 1",
            mission,
        )
    }

    #[test]
    fn test_create_layout() {
        let dir = tempdir().unwrap();
        let mission = Mission::new(dir.path().join("ED-00/TSF001"), metadata("TSF001"));
        mission.create().unwrap();

        assert!(mission.path().join("metadata.json").is_file());
        let entries = mission.manifest().read().unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["metadata.json"]);
        assert_eq!(mission.key(), "ED-00 TSF001");
    }

    #[test]
    fn test_create_never_overwrites() {
        let dir = tempdir().unwrap();
        let mission = Mission::new(dir.path().join("ED-00/TSF001"), metadata("TSF001"));
        mission.create().unwrap();
        let err = mission.create().unwrap_err();
        assert!(matches!(err, FieldError::MissionExists(_)));
    }

    #[test]
    fn test_stage_and_commit() {
        let dir = tempdir().unwrap();
        let src = tempdir().unwrap();
        fs::write(src.path().join("0001.bin"), vec![7u8; 1024]).unwrap();

        let mut mission = Mission::new(dir.path().join("ED-00/TSF001"), metadata("TSF001"));
        mission.create().unwrap();
        mission
            .stage(&[src.path().join("0001.bin")], Some(Path::new("sonar")), None)
            .unwrap();
        assert_eq!(mission.staging().len(), 1);

        let committed = mission.commit().unwrap();
        assert_eq!(committed, vec![mission.path().join("sonar/0001.bin")]);
        assert_eq!(mission.committed_files(), &[PathBuf::from("sonar/0001.bin")]);
        assert!(mission.staging().is_empty());
        assert!(mission
            .manifest()
            .read()
            .unwrap()
            .contains_key("sonar/0001.bin"));
    }

    #[test]
    fn test_destination_must_stay_inside() {
        let dir = tempdir().unwrap();
        let src = tempdir().unwrap();
        fs::write(src.path().join("a.bin"), b"a").unwrap();
        let mut mission = Mission::new(dir.path().join("ED-00/M"), metadata("M"));
        mission.create().unwrap();

        for bad in ["../escape", "/abs"] {
            let err = mission
                .stage(&[src.path().join("a.bin")], Some(Path::new(bad)), None)
                .unwrap_err();
            assert!(matches!(err, FieldError::InvalidDestination(_)));
        }
    }

    #[test]
    fn test_stage_refuses_own_files() {
        let dir = tempdir().unwrap();
        let src = tempdir().unwrap();
        fs::write(src.path().join("manifest.json"), b"{}").unwrap();
        fs::write(src.path().join("metadata.json"), b"{}").unwrap();
        let mut mission = Mission::new(dir.path().join("ED-00/M"), metadata("M"));
        mission.create().unwrap();

        for name in ["manifest.json", "metadata.json"] {
            let err = mission
                .stage(&[src.path().join(name)], None, None)
                .unwrap_err();
            assert!(matches!(err, FieldError::ReservedTarget(_)));
        }
        let err = mission
            .stage(&[src.path().join("metadata.json")], Some(Path::new(".")), None)
            .unwrap_err();
        assert!(matches!(err, FieldError::ReservedTarget(_)));

        // same names are fine below a subdirectory
        mission
            .stage(&[src.path().join("manifest.json")], Some(Path::new("gps")), None)
            .unwrap();
        assert_eq!(mission.staging().len(), 1);
        assert_eq!(mission.discard(), 1);
        assert!(mission.staging().is_empty());
    }

    #[test]
    fn test_load_from_descriptor() {
        let dir = tempdir().unwrap();
        let mission = Mission::new(dir.path().join("ED-01/RUN"), metadata("RUN"));
        mission.create().unwrap();

        let loaded = Mission::load(mission.path()).unwrap();
        assert_eq!(loaded.metadata(), mission.metadata());
        assert_eq!(loaded.key(), "ED-01 RUN");
    }
}
