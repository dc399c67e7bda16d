//! In-memory local store.

use crate::error::{StoreError, StoreResult};
use crate::store::LocalStore;
use parking_lot::RwLock;
use placesync_codec::{Place, PlaceId};
use std::collections::HashMap;

/// Insertion-ordered table of places keyed by ID.
///
/// Shared by the memory store and the file store's in-memory view.
#[derive(Debug, Default, Clone)]
pub(crate) struct PlaceTable {
    order: Vec<PlaceId>,
    rows: HashMap<PlaceId, Place>,
}

impl PlaceTable {
    pub(crate) fn all(&self) -> Vec<Place> {
        self.order
            .iter()
            .filter_map(|id| self.rows.get(id))
            .cloned()
            .collect()
    }

    pub(crate) fn get(&self, place_id: &PlaceId) -> Option<&Place> {
        self.rows.get(place_id)
    }

    pub(crate) fn contains(&self, place_id: &PlaceId) -> bool {
        self.rows.contains_key(place_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Inserts or replaces a row. A replaced row keeps its position.
    pub(crate) fn put(&mut self, place: Place) {
        if !self.rows.contains_key(&place.place_id) {
            self.order.push(place.place_id);
        }
        self.rows.insert(place.place_id, place);
    }

    pub(crate) fn remove(&mut self, place_id: &PlaceId) -> Option<Place> {
        let removed = self.rows.remove(place_id)?;
        self.order.retain(|id| id != place_id);
        Some(removed)
    }
}

/// An in-memory local store.
///
/// This store keeps all rows in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Catalogues that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    table: RwLock<PlaceTable>,
}

impl MemoryLocalStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with places.
    ///
    /// Later duplicates of an ID replace earlier ones.
    #[must_use]
    pub fn with_places(places: impl IntoIterator<Item = Place>) -> Self {
        let mut table = PlaceTable::default();
        for place in places {
            table.put(place);
        }
        Self {
            table: RwLock::new(table),
        }
    }

    /// Removes every row.
    pub fn clear(&self) {
        *self.table.write() = PlaceTable::default();
    }
}

impl LocalStore for MemoryLocalStore {
    fn all(&self) -> StoreResult<Vec<Place>> {
        Ok(self.table.read().all())
    }

    fn get(&self, place_id: &PlaceId) -> StoreResult<Option<Place>> {
        Ok(self.table.read().get(place_id).cloned())
    }

    fn insert(&self, place: Place) -> StoreResult<()> {
        let mut table = self.table.write();
        if table.contains(&place.place_id) {
            return Err(StoreError::AlreadyExists(place.place_id));
        }
        table.put(place);
        Ok(())
    }

    fn update(&self, place: Place) -> StoreResult<()> {
        let mut table = self.table.write();
        if !table.contains(&place.place_id) {
            return Err(StoreError::NotFound(place.place_id));
        }
        table.put(place);
        Ok(())
    }

    fn delete(&self, place_id: &PlaceId) -> StoreResult<()> {
        self.table
            .write()
            .remove(place_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(*place_id))
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.table.read().len())
    }
}
