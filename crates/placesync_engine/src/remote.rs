//! Remote record store abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use placesync_codec::{AssetHandle, RecordName, RemoteRecord};
use serde::{Deserialize, Serialize};

/// Opaque continuation token returned with a page.
///
/// Valid until consumed once. No ordering or expiry is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor(#[serde(with = "serde_bytes")] Vec<u8>);

impl SyncCursor {
    /// Wraps remote-issued cursor bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Record filter of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryFilter {
    /// Every record of the type.
    All,
    /// Records whose text field equals a value.
    TextEquals {
        /// Field key.
        key: String,
        /// Expected value.
        value: String,
    },
}

/// Sort order of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    /// Field key.
    pub key: String,
    /// Ascending if true.
    pub ascending: bool,
}

impl SortDescriptor {
    /// Ascending sort by `key`.
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: true,
        }
    }
}

/// A paginated query against the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Record type to query.
    pub record_type: String,
    /// Record filter.
    pub filter: QueryFilter,
    /// Sort order.
    pub sort: Option<SortDescriptor>,
    /// Maximum records per page.
    pub page_size: u32,
    /// Keys to return; `None` returns every field.
    pub desired_keys: Option<Vec<String>>,
}

impl RecordQuery {
    /// Query for every record of a type.
    pub fn all(record_type: impl Into<String>, page_size: u32) -> Self {
        Self {
            record_type: record_type.into(),
            filter: QueryFilter::All,
            sort: None,
            page_size: page_size.max(1),
            desired_keys: None,
        }
    }

    /// Sets the sort order.
    #[must_use]
    pub fn sorted_by(mut self, sort: SortDescriptor) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Restricts the returned keys.
    #[must_use]
    pub fn with_desired_keys(mut self, keys: &[&str]) -> Self {
        self.desired_keys = Some(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    /// Returns true if a record passes the filter.
    #[must_use]
    pub fn matches(&self, record: &RemoteRecord) -> bool {
        if record.record_type != self.record_type {
            return false;
        }
        match &self.filter {
            QueryFilter::All => true,
            QueryFilter::TextEquals { key, value } => record.text(key) == Some(value.as_str()),
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    /// Records of this page.
    pub records: Vec<RemoteRecord>,
    /// Continuation token; `None` means the result set is exhausted.
    pub cursor: Option<SyncCursor>,
}

/// Client of the remote record store.
///
/// Implementations own timeouts and connection handling. The engine treats
/// every error the same way: it logs it and aborts the current operation.
#[async_trait]
pub trait RemoteStoreClient: Send + Sync {
    /// Runs a query, starting after `cursor` when one is given.
    async fn query(&self, query: &RecordQuery, cursor: Option<SyncCursor>)
        -> SyncResult<QueryPage>;

    /// Fetches one record by name, optionally restricted to `desired_keys`.
    ///
    /// Returns `NotFound` if no such record exists.
    async fn fetch_by_id(
        &self,
        name: &RecordName,
        desired_keys: Option<&[&str]>,
    ) -> SyncResult<RemoteRecord>;

    /// Saves a record, creating it when it has no name yet.
    async fn save(&self, record: RemoteRecord) -> SyncResult<RecordName>;

    /// Deletes a record by name.
    async fn delete(&self, name: &RecordName) -> SyncResult<()>;

    /// Reads the bytes an asset handle points at.
    ///
    /// The default reads the handle as a local file path.
    async fn read_asset(&self, handle: &AssetHandle) -> SyncResult<Vec<u8>> {
        tokio::fs::read(handle.to_path())
            .await
            .map_err(|e| SyncError::transport_fatal(format!("reading asset {handle}: {e}")))
    }
}
