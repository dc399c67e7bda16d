//! Set of place IDs already present locally.

use placesync_codec::{Place, PlaceId};
use std::collections::HashSet;

/// Index of place IDs built once per fetch session.
///
/// A remote record is new iff its place ID is absent. `remote_record_name` plays
/// no part in the decision.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    ids: HashSet<PlaceId>,
}

impl DedupIndex {
    /// Builds the index from the local record set.
    pub fn build<'a>(existing: impl IntoIterator<Item = &'a Place>) -> Self {
        Self {
            ids: existing.into_iter().map(|p| p.place_id).collect(),
        }
    }

    /// Returns true if the place is already known.
    #[must_use]
    pub fn contains(&self, place_id: &PlaceId) -> bool {
        self.ids.contains(place_id)
    }

    /// Marks a place as known. Returns false if it already was.
    pub fn insert(&mut self, place_id: PlaceId) -> bool {
        self.ids.insert(place_id)
    }

    /// Number of known places.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no place is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
