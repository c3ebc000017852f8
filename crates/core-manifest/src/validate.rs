//! JSON Schema validation for mission descriptor documents

use crate::error::{Error, Result};
use jsonschema::{ValidationError, Validator};
use serde_json::{json, Value};

/// Validate a raw descriptor document against its JSON Schema
pub fn validate_descriptor(document: &Value) -> Result<()> {
    let schema = get_descriptor_schema();
    let compiled = Validator::new(&schema)
        .map_err(|e| Error::validation(format!("Failed to compile schema: {}", e)))?;

    if let Err(errors) = compiled.validate(document) {
        let error_messages: Vec<String> = errors.map(|e| format_validation_error(&e)).collect();

        return Err(Error::validation(format!(
            "Mission descriptor validation failed:\n  - {}",
            error_messages.join("\n  - ")
        )));
    }

    Ok(())
}

/// Format a validation error into a readable string
fn format_validation_error(error: &ValidationError) -> String {
    format!("{}: {}", error.instance_path, error)
}

/// Get the mission descriptor JSON Schema
fn get_descriptor_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": [
            "timestamp", "device", "country", "region", "site", "mission", "notes", "properties"
        ],
        "additionalProperties": false,
        "properties": {
            "timestamp": { "type": "string", "minLength": 1 },
            "device": { "type": "string" },
            "country": { "type": "string" },
            "region": { "type": "string" },
            "site": { "type": "string" },
            "mission": { "type": "string", "minLength": 1 },
            "notes": { "type": "string" },
            "properties": { "type": "object" }
        }
    })
}
