//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use fieldvault::{AppConfig, DataManager, MemoryStore, Metadata};

pub fn day_zero() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 3, 2).unwrap()
}

pub fn metadata(timestamp: &str, mission: &str) -> Metadata {
    Metadata::new(
        Metadata::parse_timestamp(timestamp).unwrap(),
        "Device 1",
        "USA",
        "California",
        "Site 1",
        mission,
    )
}

pub fn memory_manager(config_dir: &Path) -> DataManager<MemoryStore> {
    DataManager::load(AppConfig::with_config_dir(config_dir), MemoryStore::new())
}

/// Write `count` binary files of distinct content into `dir`
pub fn binary_files(dir: &Path, count: usize) -> Vec<PathBuf> {
    fs::create_dir_all(dir).unwrap();
    (0..count)
        .map(|i| {
            let path = dir.join(format!("{:04}.bin", i));
            let data: Vec<u8> = (0..4096u32).map(|b| ((b * 31 + i as u32) % 251) as u8).collect();
            fs::write(&path, data).unwrap();
            path
        })
        .collect()
}

/// Dataset `2023.03.02.Test.SD` under `datasets` with one mission holding `files` committed files
pub fn single_mission(
    app: &mut DataManager<MemoryStore>,
    datasets: &Path,
    source: &Path,
    files: usize,
) -> Vec<PathBuf> {
    app.initialize_dataset(day_zero(), "Test", "SD", datasets)
        .unwrap();
    app.initialize_mission(metadata("2023-03-02T10:00:00-08:00", "TSF001"))
        .unwrap();
    let data = binary_files(source, files);
    app.add(&data, false, None).unwrap();
    app.commit(false).unwrap()
}
