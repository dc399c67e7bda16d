//! Place ID to remote record name lookups.

use parking_lot::RwLock;
use placesync_codec::{PlaceId, RecordName};
use std::collections::HashMap;

/// Remembers which remote record holds which place.
///
/// Filled while paging through the remote set and after saves, read by lazy
/// asset fetches. Shared between the engine's operations.
#[derive(Debug, Default)]
pub struct RecordRefCache {
    refs: RwLock<HashMap<PlaceId, RecordName>>,
}

impl RecordRefCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records where a place lives remotely.
    pub fn record(&self, place_id: PlaceId, name: RecordName) {
        self.refs.write().insert(place_id, name);
    }

    /// Returns the remote record name of a place.
    #[must_use]
    pub fn lookup(&self, place_id: &PlaceId) -> Option<RecordName> {
        self.refs.read().get(place_id).cloned()
    }

    /// Drops every entry pointing at `name`.
    pub fn forget(&self, name: &RecordName) {
        self.refs.write().retain(|_, v| v != name);
    }

    /// Number of cached references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.read().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.refs.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lookup_forget() {
        let cache = RecordRefCache::new();
        let id = PlaceId::new();
        let name = RecordName::new("rec-1");

        assert!(cache.lookup(&id).is_none());
        cache.record(id, name.clone());
        assert_eq!(cache.lookup(&id), Some(name.clone()));
        assert_eq!(cache.len(), 1);

        cache.forget(&name);
        assert!(cache.is_empty());
    }

    #[test]
    fn later_record_wins() {
        let cache = RecordRefCache::new();
        let id = PlaceId::new();
        cache.record(id, RecordName::new("old"));
        cache.record(id, RecordName::new("new"));
        assert_eq!(cache.lookup(&id), Some(RecordName::new("new")));

        cache.clear();
        assert!(cache.lookup(&id).is_none());
    }
}
