//! The synchronized `Place` entity and its identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Upper bound of the star rating.
pub const MAX_RATING: f64 = 5.0;

/// Unique identifier for a place.
///
/// Place IDs are UUIDs that are:
/// - Assigned once, when the place is created locally
/// - Immutable afterwards
/// - The only key used to decide whether a remote record is already present locally
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(Uuid);

impl PlaceId {
    /// Creates a new random place ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a place ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a place ID from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlaceId({})", self.0)
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PlaceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for PlaceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier the remote store assigns to a record on its first save.
///
/// Opaque to the client: it is only ever compared for equality and passed
/// back to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordName(String);

impl RecordName {
    /// Wraps a remote-assigned name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A place in the user's catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Dedup key, assigned at local creation.
    pub place_id: PlaceId,
    /// Set once the remote store has accepted the first save.
    pub remote_record_name: Option<RecordName>,
    /// Display name.
    pub name: String,
    /// Free-form address.
    pub location: Option<String>,
    /// Category such as "Restaurant".
    pub place_type: Option<String>,
    /// Star rating in `0.0..=MAX_RATING`.
    pub rating: f64,
    /// Encoded photo.
    #[serde(with = "serde_bytes")]
    pub image_data: Option<Vec<u8>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Place {
    /// Creates a new, never-synchronized place with a fresh ID.
    pub fn new(
        name: impl Into<String>,
        location: Option<String>,
        place_type: Option<String>,
        image_data: Option<Vec<u8>>,
        rating: f64,
    ) -> Self {
        Self {
            place_id: PlaceId::new(),
            remote_record_name: None,
            name: name.into(),
            location,
            place_type,
            rating: clamp_rating(rating),
            image_data,
            created_at: Utc::now(),
        }
    }

    /// Replaces the place ID.
    #[must_use]
    pub fn with_id(mut self, place_id: PlaceId) -> Self {
        self.place_id = place_id;
        self
    }

    /// Sets the remote record name.
    #[must_use]
    pub fn with_record_name(mut self, name: RecordName) -> Self {
        self.remote_record_name = Some(name);
        self
    }

    /// Sets the rating, clamped to the star range.
    pub fn set_rating(&mut self, rating: f64) {
        self.rating = clamp_rating(rating);
    }

    /// Returns true once the remote store has assigned a record name.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.remote_record_name.is_some()
    }
}

fn clamp_rating(rating: f64) -> f64 {
    if rating.is_nan() {
        0.0
    } else {
        rating.clamp(0.0, MAX_RATING)
    }
}
