//! Remote record representation.

use crate::place::RecordName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Record type used for places in the remote store.
pub const PLACE_RECORD_TYPE: &str = "Place";

/// Field keys of a place record.
pub mod keys {
    /// Client-chosen place ID (dedup key).
    pub const PLACE_ID: &str = "placeID";
    /// Display name. Also the sort key for paginated queries.
    pub const NAME: &str = "name";
    /// Address.
    pub const LOCATION: &str = "location";
    /// Category.
    pub const TYPE: &str = "type";
    /// Star rating.
    pub const RATING: &str = "rating";
    /// Photo asset.
    pub const IMAGE_DATA: &str = "imageData";
    /// Creation timestamp.
    pub const CREATED_AT: &str = "createdAt";

    /// Every key except the photo, requested for lightweight page fetches.
    pub const LIGHTWEIGHT: [&str; 6] = [PLACE_ID, NAME, LOCATION, TYPE, RATING, CREATED_AT];
}

/// Reference to binary data stored out of band.
///
/// A handle is a location (file path or URL) the remote store or transport
/// knows how to read from. Record fields never carry the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetHandle(String);

impl AssetHandle {
    /// Creates a handle from an opaque location string.
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Creates a handle that points at a local file.
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    /// Returns the location string.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.0
    }

    /// Interprets the location as a filesystem path.
    #[must_use]
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scalar or asset-reference value stored under a record key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// UTF-8 text.
    Text(String),
    /// Double-precision number.
    Double(f64),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Reference to out-of-band binary data.
    Asset(AssetHandle),
}

/// A flat, typed key/value record as held by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Record type, e.g. [`PLACE_RECORD_TYPE`].
    pub record_type: String,
    /// Name assigned by the remote store; `None` before the first save.
    pub record_name: Option<RecordName>,
    /// Field values keyed by field name.
    pub fields: BTreeMap<String, FieldValue>,
}

impl RemoteRecord {
    /// Creates an empty, unsaved record of the given type.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            record_name: None,
            fields: BTreeMap::new(),
        }
    }

    /// Sets the record name.
    #[must_use]
    pub fn with_name(mut self, name: RecordName) -> Self {
        self.record_name = Some(name);
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, key: &str, value: FieldValue) {
        self.fields.insert(key.to_string(), value);
    }

    /// Sets a text field when `value` is present and removes it otherwise.
    pub fn set_optional_text(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(text) => self.set(key, FieldValue::Text(text.to_string())),
            None => {
                self.fields.remove(key);
            }
        }
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Returns a text field, or `None` if absent or not text.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns a numeric field, or `None` if absent or not a number.
    #[must_use]
    pub fn double(&self, key: &str) -> Option<f64> {
        match self.fields.get(key) {
            Some(FieldValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns a timestamp field.
    #[must_use]
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(key) {
            Some(FieldValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    /// Returns an asset field.
    #[must_use]
    pub fn asset(&self, key: &str) -> Option<&AssetHandle> {
        match self.fields.get(key) {
            Some(FieldValue::Asset(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Returns a copy holding only the requested keys.
    ///
    /// Record type and name are always kept.
    #[must_use]
    pub fn project(&self, desired_keys: &[&str]) -> Self {
        Self {
            record_type: self.record_type.clone(),
            record_name: self.record_name.clone(),
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| desired_keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Name used in log lines and error messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.record_name
            .as_ref()
            .map_or_else(|| "<unsaved>".to_string(), |n| n.to_string())
    }
}
