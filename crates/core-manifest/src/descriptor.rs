//! Mission descriptor (`metadata.json`)
//!
//! Every mission directory carries one descriptor: a flat JSON record with the
//! mission's timestamp, device, location taxonomy, notes and an open property
//! bag. Descriptors are written once at mission creation and validated against
//! a fixed schema whenever they are read back.

use crate::error::{Error, Result};
use crate::validate::validate_descriptor;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// File name of the descriptor inside a mission directory
pub const DESCRIPTOR_FILE_NAME: &str = "metadata.json";

/// Descriptive record of one mission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    /// Mission start, always with a UTC offset
    pub timestamp: DateTime<FixedOffset>,

    /// Recording device identifier
    pub device: String,

    /// Country
    pub country: String,

    /// Region within the country
    pub region: String,

    /// Site within the region
    pub site: String,

    /// Mission name, also the mission directory name
    pub mission: String,

    /// Free-text notes
    #[serde(default)]
    pub notes: String,

    /// Open property bag
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Metadata {
    /// Create a descriptor with empty notes and properties
    pub fn new<S: Into<String>>(
        timestamp: DateTime<FixedOffset>,
        device: S,
        country: S,
        region: S,
        site: S,
        mission: S,
    ) -> Self {
        Self {
            timestamp,
            device: device.into(),
            country: country.into(),
            region: region.into(),
            site: site.into(),
            mission: mission.into(),
            notes: String::new(),
            properties: Map::new(),
        }
    }

    /// Set the notes
    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = notes.into();
        self
    }

    /// Add one property
    pub fn with_property<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Parse an ISO-8601 timestamp, rejecting values without an offset
    pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts);
        }
        if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z") {
            return Ok(ts);
        }

        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"));
        match naive {
            Ok(_) => Err(Error::MissingTimezone(raw.to_string())),
            Err(_) => Err(Error::InvalidTimestamp(raw.to_string())),
        }
    }

    /// Flat JSON document as stored on disk
    pub fn to_document(&self) -> Value {
        let mut document = Map::new();
        document.insert("timestamp".into(), Value::String(self.timestamp.to_rfc3339()));
        document.insert("device".into(), Value::String(self.device.clone()));
        document.insert("country".into(), Value::String(self.country.clone()));
        document.insert("region".into(), Value::String(self.region.clone()));
        document.insert("site".into(), Value::String(self.site.clone()));
        document.insert("mission".into(), Value::String(self.mission.clone()));
        document.insert("notes".into(), Value::String(self.notes.clone()));
        document.insert("properties".into(), Value::Object(self.properties.clone()));
        Value::Object(document)
    }

    /// Build a descriptor from a raw document, validating its schema first
    pub fn from_document(document: &Value) -> Result<Self> {
        validate_descriptor(document)?;

        let field = |name: &str| -> Result<String> {
            document[name]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::validation(format!("field `{}` is not a string", name)))
        };

        Ok(Self {
            timestamp: Self::parse_timestamp(&field("timestamp")?)?,
            device: field("device")?,
            country: field("country")?,
            region: field("region")?,
            site: field("site")?,
            mission: field("mission")?,
            notes: field("notes")?,
            properties: document["properties"]
                .as_object()
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// Write the descriptor into `directory`
    pub fn write(&self, directory: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_document())?;
        fs::write(directory.join(DESCRIPTOR_FILE_NAME), json)?;
        Ok(())
    }

    /// Load and validate the descriptor stored in `directory`
    pub fn load(directory: &Path) -> Result<Self> {
        let contents = fs::read_to_string(directory.join(DESCRIPTOR_FILE_NAME))?;
        let document: Value = serde_json::from_str(&contents)?;
        Self::from_document(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> Metadata {
        Metadata::new(
            Metadata::parse_timestamp("2023-03-02T00:11:00-08:00").unwrap(),
            "Device 1",
            "USA",
            "California",
            "Site 1",
            "TSF001",
        )
    }

    #[test]
    fn test_round_trip_keeps_offset() {
        let dir = tempdir().unwrap();
        let metadata = sample()
            .with_notes("calm seas")
            .with_property("depth_m", json!(12.5));

        metadata.write(dir.path()).unwrap();
        let loaded = Metadata::load(dir.path()).unwrap();

        assert_eq!(loaded, metadata);
        assert_eq!(loaded.timestamp.offset(), metadata.timestamp.offset());
        assert_eq!(loaded.timestamp.offset().local_minus_utc(), -8 * 3600);
        assert_eq!(loaded.properties["depth_m"], json!(12.5));
    }

    #[test]
    fn test_naive_timestamp_rejected() {
        let err = Metadata::parse_timestamp("2023-03-02T00:11:00").unwrap_err();
        assert!(matches!(err, Error::MissingTimezone(_)));

        let err = Metadata::parse_timestamp("2023-03-02T00:11").unwrap_err();
        assert!(matches!(err, Error::MissingTimezone(_)));
    }

    #[test]
    fn test_garbage_timestamp_rejected() {
        let err = Metadata::parse_timestamp("last tuesday").unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp(_)));
    }

    #[test]
    fn test_minute_precision_with_offset() {
        let ts = Metadata::parse_timestamp("2023-03-02T15:06-08:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-03-02T15:06:00-08:00");
    }

    #[test]
    fn test_load_rejects_naive_timestamp_on_disk() {
        let dir = tempdir().unwrap();
        let mut document = sample().to_document();
        document["timestamp"] = json!("2023-03-02T00:11:00");
        fs::write(
            dir.path().join(DESCRIPTOR_FILE_NAME),
            serde_json::to_string(&document).unwrap(),
        )
        .unwrap();

        let err = Metadata::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::MissingTimezone(_)));
    }

    #[test]
    fn test_load_rejects_missing_field() {
        let dir = tempdir().unwrap();
        let mut document = sample().to_document();
        document.as_object_mut().unwrap().remove("device");
        fs::write(
            dir.path().join(DESCRIPTOR_FILE_NAME),
            serde_json::to_string(&document).unwrap(),
        )
        .unwrap();

        let err = Metadata::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_document_has_fixed_keys() {
        let document = sample().to_document();
        let mut keys: Vec<&String> = document.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "country",
                "device",
                "mission",
                "notes",
                "properties",
                "region",
                "site",
                "timestamp"
            ]
        );
    }
}
