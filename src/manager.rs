/*!
 * Application state and orchestration
 *
 * `DataManager` owns the registry of datasets, the active dataset/mission
 * pointers and every cross-entity rule (initialize, add, commit, duplicate,
 * push, prune, activate). After each successful mutating call the whole
 * registry is written through the injected [`StateStore`].
 *
 * Persistence is last-writer-wins: two processes sharing one state location
 * overwrite each other. A crash between a file copy and the following save
 * leaves the copied file on disk without a registry entry.
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use fieldvault_core_manifest::{Manifest, Metadata, ValidationMethod, MANIFEST_FILE_NAME};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::core::transfer::copy_preserving;
use crate::core::{mission_key, Dataset, Mission, StageWindow};
use crate::error::{FieldError, Result};
use crate::state::{
    migrate_manager, JsonFileStore, StateStore, CURRENT_SCHEMA_VERSION, SCHEMA_VERSION_KEY,
};

/// Serialized application state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManagerState {
    dataset_dir: PathBuf,
    #[serde(default)]
    datasets: BTreeMap<String, Dataset>,
    #[serde(default)]
    active_dataset: Option<String>,
    #[serde(default)]
    active_mission: Option<String>,
}

impl ManagerState {
    fn empty(config: &AppConfig) -> Self {
        Self {
            dataset_dir: config.dataset_dir.clone(),
            datasets: BTreeMap::new(),
            active_dataset: None,
            active_mission: None,
        }
    }

    /// Active pointers must name registered entries
    fn check_pointers(&self) -> Result<()> {
        match (&self.active_dataset, &self.active_mission) {
            (None, Some(mission)) => Err(FieldError::CorruptState(format!(
                "active mission {} without an active dataset",
                mission
            ))),
            (Some(name), mission) => {
                let dataset = self.datasets.get(name).ok_or_else(|| {
                    FieldError::CorruptState(format!("active dataset {} is not registered", name))
                })?;
                if let Some(key) = mission {
                    if dataset.mission(key).is_none() {
                        return Err(FieldError::CorruptState(format!(
                            "active mission {} is not part of {}",
                            key, name
                        )));
                    }
                }
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }
}

pub struct DataManager<S: StateStore = JsonFileStore> {
    config: AppConfig,
    store: S,
    state: ManagerState,
}

impl DataManager<JsonFileStore> {
    /// Manager backed by the state file named in `config`
    pub fn open(config: AppConfig) -> Self {
        let store = JsonFileStore::new(config.state_path());
        Self::load(config, store)
    }
}

impl<S: StateStore> DataManager<S> {
    /// Restore state from `store`
    ///
    /// Never fails: unreadable, mistyped or too-new state is discarded with a
    /// warning and an empty registry is used instead. Loading writes nothing.
    pub fn load(config: AppConfig, store: S) -> Self {
        let state = match Self::read_state(&config, &store) {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("No stored state, starting empty");
                ManagerState::empty(&config)
            }
            Err(e) => {
                warn!("Discarding unreadable application state: {}", e);
                ManagerState::empty(&config)
            }
        };
        Self {
            config,
            store,
            state,
        }
    }

    fn read_state(config: &AppConfig, store: &S) -> Result<Option<ManagerState>> {
        let Some(document) = store.load()? else {
            return Ok(None);
        };
        let mut document = migrate_manager(document, &config.dataset_dir)?;
        if let Value::Object(map) = &mut document {
            map.remove(SCHEMA_VERSION_KEY);
        }
        let state: ManagerState =
            serde_json::from_value(document).map_err(|e| FieldError::CorruptState(e.to_string()))?;
        state.check_pointers()?;
        Ok(Some(state))
    }

    fn persist(&self) -> Result<()> {
        let mut document = serde_json::to_value(&self.state)?;
        if let Value::Object(map) = &mut document {
            map.insert(SCHEMA_VERSION_KEY.into(), Value::from(CURRENT_SCHEMA_VERSION));
        }
        self.store.save(&document)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn active_dataset(&self) -> Option<&Dataset> {
        self.state
            .active_dataset
            .as_deref()
            .and_then(|name| self.state.datasets.get(name))
    }

    pub fn active_mission(&self) -> Option<&Mission> {
        let key = self.state.active_mission.as_deref()?;
        self.active_dataset()?.mission(key)
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.state.datasets.get(name)
    }

    fn require_dataset(&self) -> Result<&Dataset> {
        let name = self
            .state
            .active_dataset
            .as_deref()
            .ok_or(FieldError::NoActiveDataset)?;
        self.state
            .datasets
            .get(name)
            .ok_or_else(|| FieldError::DatasetNotFound(name.to_string()))
    }

    fn require_dataset_mut(&mut self) -> Result<&mut Dataset> {
        let name = self
            .state
            .active_dataset
            .as_deref()
            .ok_or(FieldError::NoActiveDataset)?;
        self.state
            .datasets
            .get_mut(name)
            .ok_or_else(|| FieldError::DatasetNotFound(name.to_string()))
    }

    /// Create `<directory>/<YYYY.MM.DD.project.location>` and make it active
    pub fn initialize_dataset(
        &mut self,
        date: NaiveDate,
        project: &str,
        location: &str,
        directory: &Path,
    ) -> Result<String> {
        let name = format!("{}.{}.{}", date.format("%Y.%m.%d"), project, location);
        if self.state.datasets.contains_key(&name) {
            return Err(FieldError::DatasetExists(name));
        }

        let directory = if directory.is_relative() {
            std::env::current_dir()?.join(directory)
        } else {
            directory.to_path_buf()
        };
        let dataset = Dataset::new(directory.join(&name), date);
        dataset.create()?;

        self.state.datasets.insert(name.clone(), dataset);
        self.state.active_dataset = Some(name.clone());
        self.state.active_mission = None;
        self.persist()?;
        info!("Initialized dataset {}", name);
        Ok(name)
    }

    /// Add a mission to the active dataset and make it active
    pub fn initialize_mission(&mut self, metadata: Metadata) -> Result<String> {
        let key = self.require_dataset_mut()?.add_mission(metadata)?.key();
        self.state.active_mission = Some(key.clone());
        self.persist()?;
        info!("Initialized mission {}", key);
        Ok(key)
    }

    /// Stage files at dataset level (`readme`) or into the active mission
    pub fn add<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        readme: bool,
        destination: Option<&Path>,
    ) -> Result<usize> {
        self.stage(paths, readme, destination, None)
    }

    /// Like [`DataManager::add`], keeping only files modified inside `window`
    pub fn add_window<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        readme: bool,
        destination: Option<&Path>,
        window: &StageWindow,
    ) -> Result<usize> {
        self.stage(paths, readme, destination, Some(window))
    }

    fn stage<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        readme: bool,
        destination: Option<&Path>,
        window: Option<&StageWindow>,
    ) -> Result<usize> {
        let mission = self.state.active_mission.clone();
        let dataset = self.require_dataset_mut()?;

        let added = if readme {
            dataset.stage(paths, window)?
        } else {
            let key = mission.ok_or(FieldError::NoActiveMission)?;
            let added = dataset
                .mission_mut(&key)
                .ok_or_else(|| FieldError::MissionNotFound(key.clone()))?
                .stage(paths, destination, window)?;
            dataset.save()?;
            added
        };

        self.persist()?;
        Ok(added)
    }

    /// Commit dataset-level (`readme`) or active-mission staged files
    ///
    /// The dataset manifest then tracks the new files and the active mission's
    /// manifest, so it always covers every mission manifest.
    pub fn commit(&mut self, readme: bool) -> Result<Vec<PathBuf>> {
        let mission = self.state.active_mission.clone();
        let dataset = self.require_dataset_mut()?;

        let committed = if readme {
            dataset.commit()?
        } else {
            let key = mission.as_deref().ok_or(FieldError::NoActiveMission)?;
            dataset
                .mission_mut(key)
                .ok_or_else(|| FieldError::MissionNotFound(key.to_string()))?
                .commit()?
        };

        let mut tracked = if readme { Vec::new() } else { committed.clone() };
        if let Some(mission) = mission.as_deref().and_then(|key| dataset.mission(key)) {
            tracked.push(mission.manifest().path().to_path_buf());
        }
        if !tracked.is_empty() {
            dataset.manifest().update(&tracked)?;
        }
        dataset.save()?;

        self.persist()?;
        Ok(committed)
    }

    /// Drop staged files at dataset level (`readme`) or from the active mission
    pub fn discard(&mut self, readme: bool) -> Result<usize> {
        let mission = self.state.active_mission.clone();
        let dataset = self.require_dataset_mut()?;

        let count = if readme {
            dataset.discard()?
        } else {
            let key = mission.as_deref().ok_or(FieldError::NoActiveMission)?;
            let count = dataset
                .mission_mut(key)
                .ok_or_else(|| FieldError::MissionNotFound(key.to_string()))?
                .discard();
            dataset.save()?;
            count
        };

        self.persist()?;
        Ok(count)
    }

    /// Copy every file tracked by the active dataset to each of `paths`
    ///
    /// Each destination is verified against the dataset manifest and receives
    /// a copy of it. The source is not re-verified.
    pub fn duplicate<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let dataset = self.require_dataset()?;
        check_destinations(dataset.root(), paths)?;
        let entries = dataset.manifest().read()?;

        for destination in paths {
            let destination = destination.as_ref();
            fs::create_dir_all(destination)?;

            let mut copied = Vec::with_capacity(entries.len());
            for key in entries.keys() {
                let target = destination.join(key);
                copy_preserving(&dataset.root().join(key), &target)?;
                copied.push(target);
            }

            let discrepancies =
                Manifest::verify(&entries, &copied, ValidationMethod::Hash, destination)?;
            if !discrepancies.is_empty() {
                for discrepancy in &discrepancies {
                    warn!("{}: {}", destination.display(), discrepancy);
                }
                return Err(FieldError::DuplicateMismatch {
                    destination: destination.to_path_buf(),
                    mismatches: discrepancies.len(),
                });
            }

            Manifest::write_to(&entries, &destination.join(MANIFEST_FILE_NAME))?;
            info!(
                "Duplicated {} ({} files) to {}",
                dataset.name(),
                copied.len(),
                destination.display()
            );
        }
        Ok(())
    }

    /// Self-check of the active dataset
    pub fn validate(&self) -> Result<bool> {
        let dataset = self.require_dataset()?;
        if self.active_mission().is_none() {
            return Err(FieldError::NoActiveMission);
        }
        dataset.validate()
    }

    /// Duplicate the finished dataset to `path/<dataset name>`
    ///
    /// Requires empty staging everywhere, `.md`/`.docx` readmes only, and a
    /// dataset that validates. Readmes placed at the root without a commit are
    /// tracked first.
    pub fn push(&mut self, path: &Path) -> Result<PathBuf> {
        let destination = {
            let dataset = self.require_dataset()?;
            let count = dataset.pending_count();
            if count > 0 {
                return Err(FieldError::FilesStaged { count });
            }
            dataset.check_readmes()?;
            let destination = path.join(dataset.name());
            check_destinations(dataset.root(), &[&destination])?;
            destination
        };

        self.require_dataset_mut()?.track_readmes()?;
        let dataset = self.require_dataset()?;
        if !dataset.validate()? {
            return Err(FieldError::DatasetInvalid {
                name: dataset.name(),
            });
        }

        self.duplicate(&[&destination])?;

        self.require_dataset_mut()?.mark_pushed()?;
        self.persist()?;
        info!("Pushed to {}", destination.display());
        Ok(destination)
    }

    /// Select the active dataset and optionally a mission within it
    ///
    /// Unknown names are looked up under `root_dir` and registered when found.
    pub fn activate(
        &mut self,
        dataset: &str,
        day: Option<i64>,
        mission: Option<&str>,
        root_dir: Option<&Path>,
    ) -> Result<()> {
        let loaded = if self.state.datasets.contains_key(dataset) {
            None
        } else {
            let path = root_dir
                .map(|root| root.join(dataset))
                .filter(|path| path.is_dir())
                .ok_or_else(|| FieldError::DatasetNotFound(dataset.to_string()))?;
            Some(Dataset::load(&path)?)
        };

        let mission_key = match mission {
            Some(name) => {
                let day = day.ok_or_else(|| FieldError::DayRequired(name.to_string()))?;
                let key = mission_key(day, name);
                let target = loaded
                    .as_ref()
                    .or_else(|| self.state.datasets.get(dataset));
                if target.and_then(|d| d.mission(&key)).is_none() {
                    return Err(FieldError::MissionNotFound(key));
                }
                Some(key)
            }
            None => None,
        };

        if let Some(loaded) = loaded {
            info!("Registered dataset {} from {}", dataset, loaded.root().display());
            self.state.datasets.insert(dataset.to_string(), loaded);
        }
        self.state.active_dataset = Some(dataset.to_string());
        self.state.active_mission = mission_key;
        self.persist()
    }

    /// Forget datasets whose root directory has disappeared
    pub fn prune(&mut self) -> Result<Vec<String>> {
        let removed: Vec<String> = self
            .state
            .datasets
            .iter()
            .filter(|(_, dataset)| !dataset.root().exists())
            .map(|(name, _)| name.clone())
            .collect();

        for name in &removed {
            self.state.datasets.remove(name);
            info!("Pruned dataset {}", name);
        }
        let active_removed = self
            .state
            .active_dataset
            .as_ref()
            .is_some_and(|active| removed.contains(active));
        if active_removed {
            self.state.active_dataset = None;
            self.state.active_mission = None;
        }

        self.persist()?;
        Ok(removed)
    }

    /// Human-readable summary of the active selection and pending files
    pub fn status(&self) -> String {
        let mut lines = Vec::new();
        let Some(dataset) = self.active_dataset() else {
            return "No dataset active".to_string();
        };
        lines.push(format!(
            "Dataset {} at {} activated",
            dataset.name(),
            dataset.root().display()
        ));

        let Some(mission) = self.active_mission() else {
            lines.push("No mission active".to_string());
            return lines.join("\n");
        };
        lines.push(format!(
            "Mission {} at {} activated",
            mission.key(),
            mission.path().display()
        ));

        if !mission.staging().is_empty() {
            lines.push(format!("{} staged files:", mission.staging().len()));
            for staged in mission.staging().iter() {
                let target = staged
                    .target_path
                    .strip_prefix(mission.path())
                    .unwrap_or(staged.target_path.as_path());
                lines.push(format!(
                    "\t{} -> {}",
                    staged.origin_path.display(),
                    target.display()
                ));
            }
        }
        if !dataset.staging().is_empty() {
            lines.push(format!("{} staged dataset files:", dataset.staging().len()));
            for staged in dataset.staging().iter() {
                let target = staged
                    .target_path
                    .strip_prefix(dataset.root())
                    .unwrap_or(staged.target_path.as_path());
                lines.push(format!(
                    "\t{} -> {}",
                    staged.origin_path.display(),
                    target.display()
                ));
            }
        }
        lines.join("\n")
    }

    /// Names of all registered datasets, sorted
    pub fn list_datasets(&self) -> Vec<String> {
        self.state.datasets.keys().cloned().collect()
    }

    /// Default parent directory for new datasets
    pub fn dataset_dir(&self) -> &Path {
        &self.state.dataset_dir
    }

    pub fn set_dataset_dir(&mut self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(FieldError::NotADirectory(path.to_path_buf()));
        }
        self.state.dataset_dir = path.to_path_buf();
        self.persist()
    }
}

/// Refuse destinations that are the dataset root or lie inside it
fn check_destinations<P: AsRef<Path>>(root: &Path, paths: &[P]) -> Result<()> {
    let root = fs::canonicalize(root)?;
    for destination in paths {
        let resolved = resolve_existing(destination.as_ref())?;
        if resolved.starts_with(&root) {
            return Err(FieldError::DestinationInsideDataset {
                destination: destination.as_ref().to_path_buf(),
                root,
            });
        }
    }
    Ok(())
}

/// Canonicalize the longest existing ancestor of `path` and append the rest
fn resolve_existing(path: &Path) -> Result<PathBuf> {
    let path = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };
    let mut missing = Vec::new();
    let mut existing = path.as_path();
    loop {
        match fs::canonicalize(existing) {
            Ok(resolved) => {
                return Ok(missing
                    .iter()
                    .rev()
                    .fold(resolved, |acc: PathBuf, part| acc.join(part)))
            }
            Err(_) => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Ok(path);
                };
                missing.push(name.to_os_string());
                existing = parent;
            }
        }
    }
}
