/*!
 * Error types for fieldvault
 */

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FieldError>;

/// Exit code constants for the command-line caller
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_REFUSED: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;

#[derive(Error, Debug)]
pub enum FieldError {
    /// An operation needs an active dataset
    #[error("No dataset is active")]
    NoActiveDataset,

    /// An operation needs an active mission
    #[error("No mission is active")]
    NoActiveMission,

    /// Dataset name already registered
    #[error("Dataset {0} already exists")]
    DatasetExists(String),

    /// Mission directory already present on disk
    #[error("Mission directory already exists: {}", .0.display())]
    MissionExists(PathBuf),

    /// Mission dated before the dataset's day zero
    #[error("Mission is dated {days} days before day zero")]
    NegativeExpeditionDay { days: i64 },

    /// Mission name given without its expedition day
    #[error("Expedition day is required to activate mission {0}")]
    DayRequired(String),

    /// Push attempted while files are still staged
    #[error("{count} files still in staging")]
    FilesStaged { count: usize },

    /// No readme at the dataset root
    #[error("Readme not found in {}", .0.display())]
    ReadmeNotFound(PathBuf),

    /// Readme with an extension other than .md or .docx
    #[error("Illegal readme format: {}", .0.display())]
    IllegalReadmeFormat(PathBuf),

    /// Staging time window with start after end
    #[error("Time window starts at {start} but ends at {end}")]
    InvertedTimeWindow { start: String, end: String },

    /// Dataset directory setting is not an existing directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Copied file does not hash to the value captured at staging
    #[error("Failed to copy {}: expected sha256 {}, got {}", .origin.display(), .expected, .actual)]
    CopyIntegrity {
        origin: PathBuf,
        expected: String,
        actual: String,
    },

    /// Duplicated files at a destination disagree with the source manifest
    #[error("Duplicate at {} failed verification ({} mismatches)", .destination.display(), .mismatches)]
    DuplicateMismatch {
        destination: PathBuf,
        mismatches: usize,
    },

    /// Dataset failed self-validation
    #[error("Dataset {name} failed validation")]
    DatasetInvalid { name: String },

    /// Path is neither a regular file nor a directory
    #[error("Unsupported path type: {}", .0.display())]
    UnsupportedPathType(PathBuf),

    /// Destination escapes the mission directory or is absolute
    #[error("Invalid destination: {}", .0.display())]
    InvalidDestination(PathBuf),

    /// Staged target would overwrite a file the tool maintains itself
    #[error("Reserved target: {}", .0.display())]
    ReservedTarget(PathBuf),

    /// Mission name that is not a single plain path component
    #[error("Invalid mission name: {0:?}")]
    InvalidMissionName(String),

    /// Duplicate destination is the dataset root or lies inside it
    #[error("Destination {} is inside dataset {}", .destination.display(), .root.display())]
    DestinationInsideDataset { destination: PathBuf, root: PathBuf },

    /// Unknown dataset name
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Unknown mission key
    #[error("Mission not found: {0}")]
    MissionNotFound(String),

    /// Persisted state could not be understood
    #[error("Corrupt state: {0}")]
    CorruptState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timestamps or permissions could not be carried over to a copy
    #[error("Metadata operation failed: {0}")]
    MetadataFailed(String),

    /// Manifest or descriptor error
    #[error(transparent)]
    Manifest(#[from] fieldvault_core_manifest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FieldError {
    /// Get error category for logging and reporting
    pub fn category(&self) -> ErrorCategory {
        use fieldvault_core_manifest::Error as ManifestError;

        match self {
            FieldError::NoActiveDataset
            | FieldError::NoActiveMission
            | FieldError::DatasetExists(_)
            | FieldError::MissionExists(_)
            | FieldError::NegativeExpeditionDay { .. }
            | FieldError::DayRequired(_)
            | FieldError::FilesStaged { .. }
            | FieldError::ReadmeNotFound(_)
            | FieldError::IllegalReadmeFormat(_)
            | FieldError::InvertedTimeWindow { .. }
            | FieldError::NotADirectory(_)
            | FieldError::DestinationInsideDataset { .. } => ErrorCategory::Precondition,
            FieldError::CopyIntegrity { .. }
            | FieldError::DuplicateMismatch { .. }
            | FieldError::DatasetInvalid { .. } => ErrorCategory::Integrity,
            FieldError::UnsupportedPathType(_)
            | FieldError::InvalidDestination(_)
            | FieldError::ReservedTarget(_)
            | FieldError::InvalidMissionName(_) => ErrorCategory::UnsupportedInput,
            FieldError::DatasetNotFound(_) | FieldError::MissionNotFound(_) => {
                ErrorCategory::NotFound
            }
            FieldError::CorruptState(_) | FieldError::Json(_) => ErrorCategory::CorruptState,
            FieldError::Config(_) => ErrorCategory::Configuration,
            FieldError::Io(_) | FieldError::MetadataFailed(_) => ErrorCategory::IoError,
            FieldError::Manifest(inner) => match inner {
                ManifestError::UnsupportedMethod(_) | ManifestError::InvalidPath { .. } => {
                    ErrorCategory::UnsupportedInput
                }
                ManifestError::Validation { .. }
                | ManifestError::MissingTimezone(_)
                | ManifestError::InvalidTimestamp(_)
                | ManifestError::Json(_) => ErrorCategory::CorruptState,
                ManifestError::ManifestNotFound { .. } => ErrorCategory::NotFound,
                ManifestError::Io(_) => ErrorCategory::IoError,
            },
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Precondition
            | ErrorCategory::NotFound
            | ErrorCategory::UnsupportedInput => EXIT_REFUSED,
            ErrorCategory::Integrity => EXIT_INTEGRITY,
            _ => EXIT_FAILURE,
        }
    }

    /// Integrity failures mean data on disk cannot be trusted
    pub fn is_integrity_failure(&self) -> bool {
        self.category() == ErrorCategory::Integrity
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Operation refused because the current state does not allow it
    Precondition,
    /// Copied or tracked data disagrees with its recorded digest
    Integrity,
    /// Input of a kind the system does not handle
    UnsupportedInput,
    /// Named dataset or mission does not exist
    NotFound,
    /// Persisted data could not be read back
    CorruptState,
    /// Configuration errors
    Configuration,
    /// I/O operation errors
    IoError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Precondition => write!(f, "precondition"),
            ErrorCategory::Integrity => write!(f, "integrity"),
            ErrorCategory::UnsupportedInput => write!(f, "unsupported-input"),
            ErrorCategory::NotFound => write!(f, "not-found"),
            ErrorCategory::CorruptState => write!(f, "corrupt-state"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::IoError => write!(f, "io"),
        }
    }
}
