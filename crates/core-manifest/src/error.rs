//! Error types for manifest and descriptor operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during manifest and descriptor operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document failed schema validation
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Timestamp carries no UTC offset
    #[error("Timestamp has no timezone offset: {0}")]
    MissingTimezone(String),

    /// Timestamp could not be parsed at all
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Validation method other than hash or size
    #[error("Unsupported validation method: {0}")]
    UnsupportedMethod(String),

    /// File does not live under the manifest root
    #[error("Path {} is not under manifest root {}", .path.display(), .root.display())]
    InvalidPath { path: PathBuf, root: PathBuf },

    /// Manifest file not found
    #[error("Manifest not found: {}", .path.display())]
    ManifestNotFound { path: PathBuf },
}

impl Error {
    /// Create a validation error with a message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path<P: Into<PathBuf>, R: Into<PathBuf>>(path: P, root: R) -> Self {
        Error::InvalidPath {
            path: path.into(),
            root: root.into(),
        }
    }

    /// Create a manifest not found error
    pub fn manifest_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Error::ManifestNotFound { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = Error::validation("missing field `device`");
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.to_string(), "Validation error: missing field `device`");
    }

    #[test]
    fn test_invalid_path_error() {
        let err = Error::invalid_path("/elsewhere/file.bin", "/data/root");
        let msg = err.to_string();
        assert!(msg.contains("/elsewhere/file.bin"));
        assert!(msg.contains("/data/root"));
    }

    #[test]
    fn test_unsupported_method_display() {
        let err = Error::UnsupportedMethod("crc32".to_string());
        assert_eq!(err.to_string(), "Unsupported validation method: crc32");
    }
}
