//! # placesync store
//!
//! Local persistent storage for places.
//!
//! The sync engine treats the local store as an external collaborator with a
//! small contract: list everything, and create/update/delete rows keyed by
//! [`PlaceId`](placesync_codec::PlaceId). This crate defines that contract
//! and ships two implementations.
//!
//! ## Available Stores
//!
//! - [`MemoryLocalStore`] - For testing and ephemeral catalogues
//! - [`FileLocalStore`] - Directory holding an append-only row log
//!
//! ## Example
//!
//! ```rust
//! use placesync_codec::Place;
//! use placesync_store::{LocalStore, MemoryLocalStore};
//!
//! let store = MemoryLocalStore::new();
//! let place = Place::new("Naschmarkt", None, Some("Market".into()), None, 4.0);
//! store.insert(place.clone()).unwrap();
//! assert_eq!(store.all().unwrap(), vec![place]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileLocalStore;
pub use memory::MemoryLocalStore;
pub use store::LocalStore;
