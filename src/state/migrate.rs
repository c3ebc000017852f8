//! Schema migrations for state documents
//!
//! Each step is a pure `Value -> Value` function taking a document from
//! version `n` to `n + 1`. Documents without a version tag are version 1.
//!
//! | version | change                                                   |
//! |---------|----------------------------------------------------------|
//! | 1       | initial layout                                           |
//! | 2       | manager gains `dataset_dir`, datasets gain `pushed`      |

use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FieldError, Result};

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: u64 = 2;

/// Key holding the schema version in every document
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Upgrade an application state document to the current schema
pub fn migrate_manager(document: Value, default_dataset_dir: &Path) -> Result<Value> {
    let mut document = into_object(document)?;
    let mut version = stored_version(&document)?;

    while version < CURRENT_SCHEMA_VERSION {
        match version {
            1 => {
                document
                    .entry("dataset_dir")
                    .or_insert_with(|| Value::String(default_dataset_dir.display().to_string()));
                if let Some(Value::Object(datasets)) = document.get_mut("datasets") {
                    for dataset in datasets.values_mut() {
                        if let Value::Object(dataset) = dataset {
                            dataset_v1_to_v2(dataset);
                        }
                    }
                }
            }
            other => return Err(unknown_version(other)),
        }
        version += 1;
        debug!("Migrated application state to schema version {}", version);
    }

    document.insert(SCHEMA_VERSION_KEY.into(), Value::from(CURRENT_SCHEMA_VERSION));
    Ok(Value::Object(document))
}

/// Upgrade a per-dataset state document to the current schema
pub fn migrate_dataset(document: Value) -> Result<Value> {
    let mut document = into_object(document)?;
    let mut version = stored_version(&document)?;

    while version < CURRENT_SCHEMA_VERSION {
        match version {
            1 => dataset_v1_to_v2(&mut document),
            other => return Err(unknown_version(other)),
        }
        version += 1;
        debug!("Migrated dataset state to schema version {}", version);
    }

    document.insert(SCHEMA_VERSION_KEY.into(), Value::from(CURRENT_SCHEMA_VERSION));
    Ok(Value::Object(document))
}

fn dataset_v1_to_v2(dataset: &mut Map<String, Value>) {
    dataset.entry("pushed").or_insert(Value::Bool(false));
}

fn into_object(document: Value) -> Result<Map<String, Value>> {
    match document {
        Value::Object(map) => Ok(map),
        other => Err(FieldError::CorruptState(format!(
            "expected a JSON object, found {}",
            type_name(&other)
        ))),
    }
}

fn stored_version(document: &Map<String, Value>) -> Result<u64> {
    let version = match document.get(SCHEMA_VERSION_KEY) {
        None => 1,
        Some(value) => value.as_u64().ok_or_else(|| {
            FieldError::CorruptState(format!("invalid schema version: {}", value))
        })?,
    };
    if version == 0 || version > CURRENT_SCHEMA_VERSION {
        return Err(unknown_version(version));
    }
    Ok(version)
}

fn unknown_version(version: u64) -> FieldError {
    FieldError::CorruptState(format!(
        "unsupported schema version {} (this build understands up to {})",
        version, CURRENT_SCHEMA_VERSION
    ))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
