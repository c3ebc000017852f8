/*!
 * Application state persistence, migration, activation and pruning
 */

mod common;

use std::fs;

use common::{day_zero, memory_manager, metadata};
use fieldvault::state::SCHEMA_VERSION_KEY;
use fieldvault::{AppConfig, DataManager, FieldError, MemoryStore, StateStore};
use serde_json::Value;
use tempfile::tempdir;

#[test]
fn test_state_survives_restart() {
    let config_dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let config = AppConfig::with_config_dir(config_dir.path());

    let mut app = DataManager::open(config.clone());
    let name = app
        .initialize_dataset(day_zero(), "Reef", "Palmyra", data.path())
        .unwrap();
    app.initialize_mission(metadata("2023-03-03T08:00:00-10:00", "RUN"))
        .unwrap();
    drop(app);

    let raw: Value =
        serde_json::from_str(&fs::read_to_string(config.state_path()).unwrap()).unwrap();
    assert_eq!(raw[SCHEMA_VERSION_KEY], 2);

    let app = DataManager::open(config);
    assert_eq!(app.list_datasets(), vec![name.clone()]);
    assert_eq!(app.active_dataset().unwrap().name(), name);
    assert_eq!(app.active_mission().unwrap().key(), "ED-01 RUN");
    assert_eq!(
        app.active_mission().unwrap().metadata().timestamp.offset().local_minus_utc(),
        -10 * 3600
    );
}

#[test]
fn test_corrupt_state_file_starts_fresh() {
    let config_dir = tempdir().unwrap();
    let config = AppConfig::with_config_dir(config_dir.path());
    fs::write(config.state_path(), "\u{0}\u{1} definitely not json").unwrap();

    let app = DataManager::open(config.clone());
    assert!(app.list_datasets().is_empty());
    assert!(app.active_dataset().is_none());
    // loading does not rewrite the file
    assert!(fs::read_to_string(config.state_path())
        .unwrap()
        .contains("definitely not json"));
}

#[test]
fn test_future_schema_starts_fresh() {
    let config_dir = tempdir().unwrap();
    let store = MemoryStore::with_document(serde_json::json!({
        "schema_version": 99,
        "dataset_dir": "/data",
        "datasets": {}
    }));
    let app = DataManager::load(AppConfig::with_config_dir(config_dir.path()), store);
    assert!(app.list_datasets().is_empty());
}

#[test]
fn test_version_one_state_is_migrated() {
    let config_dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let mut app = memory_manager(config_dir.path());
    let name = app
        .initialize_dataset(day_zero(), "Reef", "Palmyra", data.path())
        .unwrap();

    let mut document = app.store().document().unwrap();
    let map = document.as_object_mut().unwrap();
    map.remove(SCHEMA_VERSION_KEY);
    map.remove("dataset_dir");
    map["datasets"][&name]
        .as_object_mut()
        .unwrap()
        .remove("pushed");

    let config = AppConfig::with_config_dir(config_dir.path());
    let app = DataManager::load(config.clone(), MemoryStore::with_document(document));
    assert_eq!(app.list_datasets(), vec![name.clone()]);
    assert_eq!(app.dataset_dir(), config.dataset_dir.as_path());
    assert!(!app.dataset(&name).unwrap().is_pushed());
}

#[test]
fn test_prune_removes_missing_datasets() {
    let config_dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let mut app = memory_manager(config_dir.path());

    let keep_a = app
        .initialize_dataset(day_zero(), "Reef", "A", data.path())
        .unwrap();
    let keep_b = app
        .initialize_dataset(day_zero(), "Reef", "B", data.path())
        .unwrap();
    let gone = app
        .initialize_dataset(day_zero(), "Reef", "C", data.path())
        .unwrap();
    app.initialize_mission(metadata("2023-03-02T09:00:00-08:00", "RUN"))
        .unwrap();

    fs::remove_dir_all(data.path().join(&gone)).unwrap();
    let saves = app.store().save_count();
    let removed = app.prune().unwrap();

    assert_eq!(removed, vec![gone]);
    assert_eq!(app.list_datasets(), vec![keep_a, keep_b]);
    assert!(app.active_dataset().is_none());
    assert!(app.active_mission().is_none());
    assert_eq!(app.store().save_count(), saves + 1);
}

#[test]
fn test_prune_keeps_active_when_present() {
    let config_dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let mut app = memory_manager(config_dir.path());

    let gone = app
        .initialize_dataset(day_zero(), "Reef", "A", data.path())
        .unwrap();
    let active = app
        .initialize_dataset(day_zero(), "Reef", "B", data.path())
        .unwrap();
    fs::remove_dir_all(data.path().join(&gone)).unwrap();

    app.prune().unwrap();
    assert_eq!(app.active_dataset().unwrap().name(), active);
}

#[test]
fn test_activate_registered_mission() {
    let config_dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let mut app = memory_manager(config_dir.path());
    let name = app
        .initialize_dataset(day_zero(), "Reef", "Palmyra", data.path())
        .unwrap();
    app.initialize_mission(metadata("2023-03-04T09:00:00-08:00", "RUN"))
        .unwrap();
    app.initialize_dataset(day_zero(), "Reef", "Other", data.path())
        .unwrap();

    assert!(matches!(
        app.activate(&name, None, Some("RUN"), None),
        Err(FieldError::DayRequired(_))
    ));
    assert!(matches!(
        app.activate(&name, Some(1), Some("RUN"), None),
        Err(FieldError::MissionNotFound(k)) if k == "ED-01 RUN"
    ));

    app.activate(&name, Some(2), Some("RUN"), None).unwrap();
    assert_eq!(app.active_dataset().unwrap().name(), name);
    assert_eq!(app.active_mission().unwrap().key(), "ED-02 RUN");

    app.activate(&name, None, None, None).unwrap();
    assert!(app.active_mission().is_none());
}

#[test]
fn test_activate_from_root_dir_registers() {
    let config_dir = tempdir().unwrap();
    let other_config = tempdir().unwrap();
    let data = tempdir().unwrap();

    let mut first = memory_manager(config_dir.path());
    let name = first
        .initialize_dataset(day_zero(), "Reef", "Palmyra", data.path())
        .unwrap();
    first
        .initialize_mission(metadata("2023-03-02T09:00:00-08:00", "RUN"))
        .unwrap();

    let mut second = memory_manager(other_config.path());
    assert!(matches!(
        second.activate(&name, None, None, None),
        Err(FieldError::DatasetNotFound(_))
    ));
    second
        .activate(&name, Some(0), Some("RUN"), Some(data.path()))
        .unwrap();

    assert_eq!(second.list_datasets(), vec![name]);
    assert_eq!(second.active_mission().unwrap().key(), "ED-00 RUN");
    assert_eq!(second.store().save_count(), 1);
    assert!(second.store().load().unwrap().is_some());
}
