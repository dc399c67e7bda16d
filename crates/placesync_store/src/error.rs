//! Error types for store operations.

use placesync_codec::{CodecError, PlaceId};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A row could not be encoded or decoded.
    #[error("row codec error: {0}")]
    Codec(#[from] CodecError),

    /// Insert of a place whose ID is already stored.
    #[error("place {0} already exists")]
    AlreadyExists(PlaceId),

    /// Update or delete of a place that is not stored.
    #[error("place {0} not found")]
    NotFound(PlaceId),

    /// Another process holds the store directory.
    #[error("store directory is locked by another process")]
    Locked,

    /// The row log is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}
