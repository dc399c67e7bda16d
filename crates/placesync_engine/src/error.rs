//! Error types for the sync engine.

use placesync_codec::CodecError;
use placesync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A remote call failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A single remote record could not be decoded.
    #[error(transparent)]
    MalformedRecord(CodecError),

    /// A photo could not be staged for upload.
    #[error("asset staging failed: {0}")]
    AssetWrite(String),

    /// The remote record targeted by an update or delete does not exist.
    #[error("remote record {0} not found")]
    NotFound(String),

    /// Local store error.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    /// A fetch session is already running.
    #[error("a sync session is already in progress")]
    SessionInProgress,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The callback context stopped accepting callbacks.
    #[error("callback context closed")]
    CallbackContextClosed,

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the caller may retry the operation.
    ///
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { retryable: true, .. })
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        if err.is_malformed_record() {
            SyncError::MalformedRecord(err)
        } else {
            SyncError::Protocol(err.to_string())
        }
    }
}

impl From<image::ImageError> for SyncError {
    fn from(err: image::ImageError) -> Self {
        SyncError::AssetWrite(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::NotFound("rec-1".into()).is_retryable());
    }

    #[test]
    fn codec_errors_split_by_kind() {
        let malformed: SyncError = CodecError::malformed("rec-1", "name", "is missing").into();
        assert!(matches!(malformed, SyncError::MalformedRecord(_)));
        assert!(malformed.to_string().contains("`name`"));

        let other: SyncError = CodecError::UnsupportedVersion(3).into();
        assert!(matches!(other, SyncError::Protocol(_)));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SyncError::SessionInProgress.to_string(),
            "a sync session is already in progress"
        );
        assert_eq!(
            SyncError::NotFound("rec-9".into()).to_string(),
            "remote record rec-9 not found"
        );
    }
}
