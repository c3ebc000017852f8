/*!
 * Datasets: one expedition with its missions, manifest and own state file
 *
 * Layout on disk:
 *
 * ```text
 * <root>/
 *   manifest.json          dataset manifest (every tracked file below root)
 *   .fieldvault.json       dataset state, never tracked
 *   readme.md              dataset-level files committed with the readme flag
 *   ED-00/<mission>/       one directory per mission, by expedition day
 * ```
 */

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{Duration, NaiveDate};
use fieldvault_core_manifest::{
    Discrepancy, Manifest, Metadata, ValidationMethod, DESCRIPTOR_FILE_NAME, MANIFEST_FILE_NAME,
};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::mission::Mission;
use super::staging::{StageWindow, StagingArea};
use crate::error::{FieldError, Result};
use crate::state::{
    migrate_dataset, JsonFileStore, StateStore, CURRENT_SCHEMA_VERSION, SCHEMA_VERSION_KEY,
};

/// File name of the per-dataset state file
pub const DATASET_STATE_FILE_NAME: &str = ".fieldvault.json";

/// Readme extensions accepted at push time
pub const READMES_ALLOWED: &[&str] = &["md", "docx"];

const README_PATTERN: &str = "readme.*";
const DAY_DIR_PREFIX: &str = "ED-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    root: PathBuf,
    day_zero: NaiveDate,
    #[serde(default)]
    missions: BTreeMap<String, Mission>,
    #[serde(default)]
    countries: BTreeSet<String>,
    #[serde(default)]
    regions: BTreeSet<String>,
    #[serde(default)]
    sites: BTreeSet<String>,
    #[serde(default)]
    devices: BTreeSet<String>,
    #[serde(default)]
    last_country: Option<String>,
    #[serde(default)]
    last_region: Option<String>,
    #[serde(default)]
    last_site: Option<String>,
    #[serde(default)]
    staging: StagingArea,
    /// Dataset-level committed files, relative to root
    #[serde(default)]
    committed_files: Vec<PathBuf>,
    #[serde(default)]
    pushed: bool,
    manifest: Manifest,
}

/// Directory name for an expedition day, e.g. `ED-03`
pub fn day_dir_name(day: i64) -> String {
    format!("{}{:02}", DAY_DIR_PREFIX, day)
}

/// Registry key of the mission `mission` on expedition day `day`
pub fn mission_key(day: i64, mission: &str) -> String {
    format!("{} {}", day_dir_name(day), mission)
}

impl Dataset {
    pub fn new<P: Into<PathBuf>>(root: P, day_zero: NaiveDate) -> Self {
        let root = root.into();
        let manifest = Manifest::new(root.join(MANIFEST_FILE_NAME));
        Self {
            root,
            day_zero,
            missions: BTreeMap::new(),
            countries: BTreeSet::new(),
            regions: BTreeSet::new(),
            sites: BTreeSet::new(),
            devices: BTreeSet::new(),
            last_country: None,
            last_region: None,
            last_site: None,
            staging: StagingArea::new(),
            committed_files: Vec::new(),
            pushed: false,
            manifest,
        }
    }

    /// Create the root directory, the initial manifest and the state file
    pub fn create(&self) -> Result<()> {
        if self.root.exists() {
            return Err(FieldError::DatasetExists(self.name()));
        }
        fs::create_dir_all(&self.root)?;
        self.manifest.generate(self.files()?)?;
        self.save()?;
        info!("Created dataset {} at {}", self.name(), self.root.display());
        Ok(())
    }

    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn day_zero(&self) -> NaiveDate {
        self.day_zero
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

    pub fn is_pushed(&self) -> bool {
        self.pushed
    }

    pub fn missions(&self) -> impl Iterator<Item = (&String, &Mission)> {
        self.missions.iter()
    }

    pub fn mission(&self, key: &str) -> Option<&Mission> {
        self.missions.get(key)
    }

    pub fn mission_mut(&mut self, key: &str) -> Option<&mut Mission> {
        self.missions.get_mut(key)
    }

    pub fn countries(&self) -> &BTreeSet<String> {
        &self.countries
    }

    pub fn regions(&self) -> &BTreeSet<String> {
        &self.regions
    }

    pub fn sites(&self) -> &BTreeSet<String> {
        &self.sites
    }

    pub fn devices(&self) -> &BTreeSet<String> {
        &self.devices
    }

    pub fn last_country(&self) -> Option<&str> {
        self.last_country.as_deref()
    }

    pub fn last_region(&self) -> Option<&str> {
        self.last_region.as_deref()
    }

    pub fn last_site(&self) -> Option<&str> {
        self.last_site.as_deref()
    }

    /// Expedition day of `date` relative to day zero
    pub fn expedition_day(&self, date: NaiveDate) -> i64 {
        (date - self.day_zero).num_days()
    }

    /// Create a mission for `metadata` under `ED-NN/<mission>` and register it
    pub fn add_mission(&mut self, metadata: Metadata) -> Result<&Mission> {
        check_mission_name(&metadata.mission)?;
        let day = self.expedition_day(metadata.timestamp.date_naive());
        if day < 0 {
            return Err(FieldError::NegativeExpeditionDay { days: -day });
        }

        let path = self.root.join(day_dir_name(day)).join(&metadata.mission);
        let mission = Mission::new(path, metadata.clone());
        mission.create()?;
        let key = mission.key();

        let new_files = self.new_files()?;
        self.manifest.update(&new_files)?;

        self.countries.insert(metadata.country.clone());
        self.last_country = Some(metadata.country);
        self.regions.insert(metadata.region.clone());
        self.last_region = Some(metadata.region);
        self.sites.insert(metadata.site.clone());
        self.last_site = Some(metadata.site);
        self.devices.insert(metadata.device);

        self.missions.insert(key.clone(), mission);
        self.save()?;
        self.missions
            .get(&key)
            .ok_or(FieldError::MissionNotFound(key))
    }

    /// Every regular file under root except the manifest and the state file
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let excluded = [
            self.manifest.path().to_path_buf(),
            self.root.join(DATASET_STATE_FILE_NAME),
        ];
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && !excluded.iter().any(|p| p == entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Files on disk that the dataset manifest does not track yet
    pub fn new_files(&self) -> Result<Vec<PathBuf>> {
        let tracked = self.manifest.read()?;
        let mut fresh = Vec::new();
        for file in self.files()? {
            let key = Manifest::relative_key(&self.root, &file)?;
            if !tracked.contains_key(&key) {
                fresh.push(file);
            }
        }
        Ok(fresh)
    }

    /// Stage dataset-level files (readme and the like) directly under root
    pub fn stage<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        window: Option<&StageWindow>,
    ) -> Result<usize> {
        let reserved = self.reserved_files();
        let added = self.staging.stage(paths, &self.root, &reserved, window)?;
        self.save()?;
        Ok(added)
    }

    /// Manifests, descriptors and the state file; never overwritten by staging
    pub fn reserved_files(&self) -> Vec<PathBuf> {
        let mut reserved = vec![
            self.manifest.path().to_path_buf(),
            self.root.join(DATASET_STATE_FILE_NAME),
        ];
        for mission in self.missions.values() {
            reserved.extend(mission.reserved_files());
        }
        reserved
    }

    /// Drop dataset-level staged files
    pub fn discard(&mut self) -> Result<usize> {
        let count = self.staging.discard();
        self.save()?;
        Ok(count)
    }

    /// Copy and verify dataset-level staged files, then track them
    pub fn commit(&mut self) -> Result<Vec<PathBuf>> {
        let committed = self.staging.commit()?;
        self.manifest.update(&committed)?;
        for file in &committed {
            if let Ok(relative) = file.strip_prefix(&self.root) {
                self.committed_files.push(relative.to_path_buf());
            }
        }
        info!(
            "Committed {} dataset files to {}",
            committed.len(),
            self.name()
        );
        self.save()?;
        Ok(committed)
    }

    /// Staged files across the dataset and all of its missions
    pub fn pending_count(&self) -> usize {
        self.staging.len()
            + self
                .missions
                .values()
                .map(|m| m.staging().len())
                .sum::<usize>()
    }

    /// Every disagreement between the files under root and the dataset manifest
    pub fn verify(&self) -> Result<Vec<Discrepancy>> {
        let entries = self.manifest.read()?;
        let mut discrepancies =
            Manifest::verify(&entries, self.files()?, ValidationMethod::Hash, &self.root)?;
        discrepancies.extend(Manifest::missing_entries(&entries, &self.root));
        for discrepancy in &discrepancies {
            warn!("{}: {}", self.name(), discrepancy);
        }
        Ok(discrepancies)
    }

    /// `true` when every file is tracked, present and hashes as recorded
    pub fn validate(&self) -> Result<bool> {
        let valid = self.verify()?.is_empty();
        debug!("Dataset {} valid: {}", self.name(), valid);
        Ok(valid)
    }

    /// Files at root whose name matches `readme.*`, ignoring case
    pub fn readmes(&self) -> Result<Vec<PathBuf>> {
        let pattern = Pattern::new(README_PATTERN)
            .map_err(|e| FieldError::Config(format!("bad readme pattern: {}", e)))?;
        let options = MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };

        let mut readmes = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.file_type()?.is_file()
                && pattern.matches_with(&name.to_string_lossy(), options)
            {
                readmes.push(entry.path());
            }
        }
        readmes.sort();
        Ok(readmes)
    }

    /// Require at least one readme and only `.md` / `.docx` readmes
    pub fn check_readmes(&self) -> Result<Vec<PathBuf>> {
        let readmes = self.readmes()?;
        if readmes.is_empty() {
            return Err(FieldError::ReadmeNotFound(self.root.clone()));
        }
        for readme in &readmes {
            let allowed = readme
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| READMES_ALLOWED.contains(&ext.as_str()));
            if !allowed {
                return Err(FieldError::IllegalReadmeFormat(readme.clone()));
            }
        }
        Ok(readmes)
    }

    /// Track readmes placed at root by hand so they are validated and pushed
    pub fn track_readmes(&mut self) -> Result<Vec<PathBuf>> {
        let tracked = self.manifest.read()?;
        let mut adopted = Vec::new();
        for readme in self.readmes()? {
            if !tracked.contains_key(&Manifest::relative_key(&self.root, &readme)?) {
                adopted.push(readme);
            }
        }
        if !adopted.is_empty() {
            self.manifest.update(&adopted)?;
            for readme in &adopted {
                info!("Tracking readme {}", readme.display());
                if let Ok(relative) = readme.strip_prefix(&self.root) {
                    self.committed_files.push(relative.to_path_buf());
                }
            }
            self.save()?;
        }
        Ok(adopted)
    }

    pub fn mark_pushed(&mut self) -> Result<()> {
        self.pushed = true;
        self.save()
    }

    /// Serialized form with its schema version
    pub fn to_document(&self) -> Result<Value> {
        let mut document = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut document {
            map.insert(SCHEMA_VERSION_KEY.into(), Value::from(CURRENT_SCHEMA_VERSION));
        }
        Ok(document)
    }

    /// Rebuild from a (possibly older) serialized form
    pub fn from_document(document: Value) -> Result<Self> {
        let mut document = migrate_dataset(document)?;
        if let Value::Object(map) = &mut document {
            map.remove(SCHEMA_VERSION_KEY);
        }
        serde_json::from_value(document).map_err(|e| FieldError::CorruptState(e.to_string()))
    }

    /// Write the state file under root
    pub fn save(&self) -> Result<()> {
        JsonFileStore::new(self.root.join(DATASET_STATE_FILE_NAME)).save(&self.to_document()?)
    }

    /// Load the dataset rooted at `path`
    ///
    /// Reads the state file when it is usable, otherwise rebuilds the dataset
    /// from the mission descriptors found under `path`. Recorded paths are moved
    /// to `path` when the dataset has been relocated since it was saved.
    pub fn load(path: &Path) -> Result<Self> {
        let store = JsonFileStore::new(path.join(DATASET_STATE_FILE_NAME));
        let loaded = store
            .load()
            .and_then(|doc| doc.ok_or_else(|| FieldError::CorruptState("no state file".into())))
            .and_then(Self::from_document);

        let mut dataset = match loaded {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(
                    "Unable to read dataset state in {}: {}; rebuilding from descriptors",
                    path.display(),
                    e
                );
                Self::reconstruct(path)?
            }
        };

        if dataset.root != path {
            let from = dataset.root.clone();
            dataset.relocate(&from, path);
        }
        Ok(dataset)
    }

    /// Rebuild a dataset from the mission descriptors under `path`
    fn reconstruct(path: &Path) -> Result<Self> {
        let mut descriptors = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && entry.file_name() == DESCRIPTOR_FILE_NAME {
                descriptors.push(entry.into_path());
            }
        }
        let Some(first) = descriptors.first() else {
            return Err(FieldError::CorruptState(format!(
                "{} has neither a state file nor mission descriptors",
                path.display()
            )));
        };

        let first_dir = first.parent().unwrap_or(path);
        let first_meta = Metadata::load(first_dir)?;
        let mission_date = first_meta.timestamp.date_naive();
        let day_zero = match day_of(path, first_dir) {
            Some(day) => mission_date - Duration::days(day),
            None => mission_date,
        };

        let mut dataset = Self::new(path, day_zero);
        for descriptor in &descriptors {
            let Some(dir) = descriptor.parent() else {
                continue;
            };
            let mission = Mission::load(dir)?;
            let metadata = mission.metadata().clone();
            dataset.countries.insert(metadata.country.clone());
            dataset.regions.insert(metadata.region.clone());
            dataset.sites.insert(metadata.site.clone());
            dataset.devices.insert(metadata.device);
            dataset.last_country = Some(metadata.country);
            dataset.last_region = Some(metadata.region);
            dataset.last_site = Some(metadata.site);
            dataset.missions.insert(mission.key(), mission);
        }
        info!(
            "Rebuilt dataset {} with {} missions",
            dataset.name(),
            dataset.missions.len()
        );
        Ok(dataset)
    }

    /// Point every recorded path at a new root
    pub fn relocate(&mut self, from: &Path, to: &Path) {
        debug!("Relocating dataset {} -> {}", from.display(), to.display());
        self.root = to.to_path_buf();
        self.manifest.rebase(from, to);
        self.staging.relocate(from, to);
        for mission in self.missions.values_mut() {
            mission.relocate(from, to);
        }
    }
}

/// Mission names become a single directory below the day directory
fn check_mission_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(only)), None) if only == name => Ok(()),
        _ => Err(FieldError::InvalidMissionName(name.to_string())),
    }
}

/// Expedition day encoded in the first path component of `mission_dir` below `root`
fn day_of(root: &Path, mission_dir: &Path) -> Option<i64> {
    let relative = mission_dir.strip_prefix(root).ok()?;
    match relative.components().next()? {
        Component::Normal(first) => first
            .to_str()?
            .strip_prefix(DAY_DIR_PREFIX)?
            .parse()
            .ok(),
        _ => None,
    }
}
