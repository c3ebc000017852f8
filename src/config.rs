/*!
 * Configuration types for fieldvault
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FieldError, Result};

/// Application directory name under the platform config/data roots
pub const APP_DIR_NAME: &str = "fieldvault";

/// Name of the TOML configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "fieldvault.toml";

/// Name of the persisted application state inside the config directory
pub const STATE_FILE_NAME: &str = "state.json";

/// Process-wide configuration, built once at start-up and handed to the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the configuration file and persisted state
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Default parent directory for new datasets
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            dataset_dir: default_dataset_dir(),
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn default_dataset_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

impl AppConfig {
    /// Configuration rooted at an explicit directory, datasets stored beneath it
    pub fn with_config_dir<P: Into<PathBuf>>(config_dir: P) -> Self {
        let config_dir = config_dir.into();
        Self {
            dataset_dir: config_dir.join("datasets"),
            config_dir,
            ..Default::default()
        }
    }

    /// Location of the persisted application state
    pub fn state_path(&self) -> PathBuf {
        self.config_dir.join(STATE_FILE_NAME)
    }

    /// Location of the TOML configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| FieldError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| FieldError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Read the platform configuration file, falling back to defaults when absent
    pub fn load_or_default() -> Result<Self> {
        let defaults = Self::default();
        let path = defaults.config_file();
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(defaults)
        }
    }
}
