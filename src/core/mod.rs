/*!
 * Core data model: datasets, missions, staging and verified copies
 */

pub mod dataset;
pub mod metadata;
pub mod mission;
pub mod staging;
pub mod transfer;

pub use dataset::{day_dir_name, mission_key, Dataset, DATASET_STATE_FILE_NAME};
pub use mission::Mission;
pub use staging::{StageWindow, StagedFile, StagingArea};
