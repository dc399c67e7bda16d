//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while mapping between places, records and rows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A remote record lacks a required field or carries it with the wrong type.
    #[error("malformed record {record}: field `{field}` {reason}")]
    MalformedRecord {
        /// Record name, or `<unsaved>` when the record has none.
        record: String,
        /// Offending field key.
        field: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// Failed to encode a row.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a row.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A row was written by an unknown format version.
    #[error("unsupported row format version {0}")]
    UnsupportedVersion(u16),
}

impl CodecError {
    /// Create a malformed record error.
    pub fn malformed(record: impl Into<String>, field: &'static str, reason: &'static str) -> Self {
        Self::MalformedRecord {
            record: record.into(),
            field,
            reason,
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Returns true for errors caused by a single bad remote record.
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, CodecError::MalformedRecord { .. })
    }
}
