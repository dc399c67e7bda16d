//! Local store trait definition.

use crate::error::StoreResult;
use placesync_codec::{Place, PlaceId};

/// Persistent row storage for places, keyed by [`PlaceId`].
///
/// # Invariants
///
/// - At most one row per `place_id`
/// - `insert` fails on an existing ID, `update` and `delete` fail on a missing one
/// - `all` returns places in insertion order
/// - Implementations must be `Send + Sync` for concurrent access
pub trait LocalStore: Send + Sync {
    /// Returns every stored place.
    ///
    /// The sync engine calls this once per sync session to build its dedup index.
    fn all(&self) -> StoreResult<Vec<Place>>;

    /// Returns a single place.
    fn get(&self, place_id: &PlaceId) -> StoreResult<Option<Place>>;

    /// Stores a new place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if the ID is taken.
    fn insert(&self, place: Place) -> StoreResult<()>;

    /// Replaces an existing place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// ID is not stored.
    fn update(&self, place: Place) -> StoreResult<()>;

    /// Removes a place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// ID is not stored.
    fn delete(&self, place_id: &PlaceId) -> StoreResult<()>;

    /// Returns the number of stored places.
    fn len(&self) -> StoreResult<usize> {
        Ok(self.all()?.len())
    }

    /// Returns true when nothing is stored.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}
