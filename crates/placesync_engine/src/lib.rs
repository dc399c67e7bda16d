//! # placesync Engine
//!
//! Remote-to-local synchronization of places.
//!
//! This crate provides:
//! - Paginated, deduplicating fetch of the remote place set
//! - Save, update and delete propagation to the remote store
//! - Lazy download of full-size photos
//! - Photo staging (downscale, JPEG re-encode, scoped temporary files)
//! - Callback contexts that decide where consumer callbacks run
//! - In-memory and HTTP/CBOR remote store clients
//!
//! ## Architecture
//!
//! A fetch session reads the local place set once, builds a [`DedupIndex`]
//! and pages through the remote set sorted by name. Every remote record whose
//! place ID is unknown is handed to the consumer's `on_new_place` callback,
//! which is expected to insert it locally. The next page is requested only
//! after the callback context has run the current page's callbacks.
//!
//! ## Key Invariants
//!
//! - A place is delivered at most once per session
//! - Place IDs are the only dedup key; remote record names never are
//! - Pagination is sequential and one session runs at a time
//! - A staged photo is removed once its save has finished, successfully or not
//! - Remote errors are logged and surfaced, never retried
//!
//! ## Example
//!
//! ```
//! use placesync_engine::{Immediate, MemoryRemoteStore, SyncConfig, SyncEngine};
//! use placesync_store::MemoryLocalStore;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = SyncEngine::new(
//!     SyncConfig::default().with_sweep_on_start(false),
//!     Arc::new(MemoryRemoteStore::new()),
//!     Arc::new(MemoryLocalStore::new()),
//!     Arc::new(Immediate),
//! );
//! let summary = engine.fetch_all(|place| println!("new place {}", place.name)).await.unwrap();
//! assert_eq!(summary.delivered, 0);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod asset;
mod cache;
mod config;
mod dedup;
mod dispatch;
mod error;
mod http;
mod memory_remote;
mod remote;
mod state;

pub use asset::{AssetStager, StagedAsset};
pub use cache::RecordRefCache;
pub use config::{
    DeleteStrategy, SyncConfig, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_IMAGE_DIMENSION,
    DEFAULT_PAGE_SIZE, STAGING_DIR_NAME,
};
pub use dedup::DedupIndex;
pub use dispatch::{main_queue, Callback, CallbackContext, Immediate, MainQueue, MainQueueReceiver};
pub use error::{SyncError, SyncResult};
pub use http::{
    decode_cbor, encode_cbor, endpoints, DeleteRequest, DownloadRequest, FetchRequest, HttpClient,
    HttpRemoteStore, LoopbackClient, LoopbackServer, QueryRequest, SaveRequest, UploadRequest,
    WireResponse,
};
pub use memory_remote::{MemoryRemoteStore, MAX_OPEN_CURSORS, MEMORY_ASSET_SCHEME};
pub use remote::{
    QueryFilter, QueryPage, RecordQuery, RemoteStoreClient, SortDescriptor, SyncCursor,
};
pub use state::{DeleteOutcome, FetchSummary, SyncEngine, SyncState, SyncStats, UpdateOutcome};
