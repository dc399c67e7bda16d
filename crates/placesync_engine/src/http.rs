//! HTTP remote store implementation.
//!
//! Requests and responses are CBOR bodies POSTed to fixed endpoints. The
//! actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.).
//!
//! Asset bytes never travel inside a record. Before a save, every asset
//! field pointing at a local file is uploaded to `/assets/upload` and replaced
//! by the handle the server returns.

use crate::error::{SyncError, SyncResult};
use crate::memory_remote::MemoryRemoteStore;
use crate::remote::{QueryPage, RecordQuery, RemoteStoreClient, SyncCursor};
use async_trait::async_trait;
use parking_lot::RwLock;
use placesync_codec::{AssetHandle, FieldValue, RecordName, RemoteRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Endpoint paths.
pub mod endpoints {
    /// Paginated query.
    pub const QUERY: &str = "/records/query";
    /// Fetch by record name.
    pub const FETCH: &str = "/records/fetch";
    /// Create or replace a record.
    pub const SAVE: &str = "/records/save";
    /// Delete by record name.
    pub const DELETE: &str = "/records/delete";
    /// Upload asset bytes.
    pub const UPLOAD: &str = "/assets/upload";
    /// Download asset bytes.
    pub const DOWNLOAD: &str = "/assets/download";
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// Body of `/records/query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The query.
    pub query: RecordQuery,
    /// Continuation token of the previous page.
    pub cursor: Option<SyncCursor>,
}

/// Body of `/records/fetch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Record to fetch.
    pub name: RecordName,
    /// Keys to return; `None` returns every field.
    pub desired_keys: Option<Vec<String>>,
}

/// Body of `/records/save`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    /// Record to save.
    pub record: RemoteRecord,
}

/// Body of `/records/delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Record to delete.
    pub name: RecordName,
}

/// Body of `/assets/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Asset bytes.
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

/// Body of `/assets/download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Asset to read.
    pub handle: AssetHandle,
}

/// Response envelope of every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireResponse<T> {
    /// The call succeeded.
    Ok(T),
    /// The addressed record or asset does not exist.
    NotFound(String),
    /// The call failed.
    Error {
        /// Error message.
        message: String,
        /// Whether the client may retry.
        retryable: bool,
    },
}

impl<T> WireResponse<T> {
    /// Wraps an operation result for the wire.
    pub fn from_result(result: SyncResult<T>) -> Self {
        match result {
            Ok(value) => WireResponse::Ok(value),
            Err(SyncError::NotFound(what)) => WireResponse::NotFound(what),
            Err(SyncError::Transport { message, retryable }) => {
                WireResponse::Error { message, retryable }
            }
            Err(other) => WireResponse::Error {
                message: other.to_string(),
                retryable: false,
            },
        }
    }

    /// Unwraps a wire response into an operation result.
    pub fn into_result(self) -> SyncResult<T> {
        match self {
            WireResponse::Ok(value) => Ok(value),
            WireResponse::NotFound(what) => Err(SyncError::NotFound(what)),
            WireResponse::Error { message, retryable } => {
                Err(SyncError::Transport { message, retryable })
            }
        }
    }
}

/// Encodes a value as CBOR.
pub fn encode_cbor<T: Serialize>(value: &T) -> SyncResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| SyncError::Protocol(format!("failed to encode body: {e}")))?;
    Ok(buf)
}

/// Decodes a CBOR value.
pub fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> SyncResult<T> {
    ciborium::from_reader(bytes)
        .map_err(|e| SyncError::Protocol(format!("failed to decode body: {e}")))
}

/// HTTP-based remote store client.
pub struct HttpRemoteStore<C: HttpClient> {
    /// Base URL of the record service (e.g., "https://places.example.com").
    base_url: String,
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemoteStore<C> {
    /// Creates a new HTTP remote store client.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Checks if the client is usable.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Marks the client closed; later calls fail without touching the network.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Re-enables a closed client.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    async fn post_cbor<Req, Res>(&self, endpoint: &str, request: &Req) -> SyncResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }

        let body = encode_cbor(request)?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.post(&url, body).await.map_err(|e| {
            warn!(url = %url, error = %e, "remote request failed");
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(e)
        })?;
        *self.last_error.write() = None;

        decode_cbor::<WireResponse<Res>>(&response)?.into_result()
    }

    async fn upload_local_assets(&self, record: &mut RemoteRecord) -> SyncResult<()> {
        let local: Vec<(String, AssetHandle)> = record
            .fields
            .iter()
            .filter_map(|(key, value)| match value {
                FieldValue::Asset(handle) if handle.to_path().is_file() => {
                    Some((key.clone(), handle.clone()))
                }
                _ => None,
            })
            .collect();

        for (key, handle) in local {
            let bytes = tokio::fs::read(handle.to_path())
                .await
                .map_err(|e| SyncError::AssetWrite(format!("reading {handle}: {e}")))?;
            let size = bytes.len();
            let uploaded: AssetHandle = self
                .post_cbor(endpoints::UPLOAD, &UploadRequest { bytes })
                .await?;
            debug!(field = %key, size, handle = %uploaded, "uploaded asset");
            record.set(&key, FieldValue::Asset(uploaded));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: HttpClient> RemoteStoreClient for HttpRemoteStore<C> {
    async fn query(
        &self,
        query: &RecordQuery,
        cursor: Option<SyncCursor>,
    ) -> SyncResult<QueryPage> {
        let request = QueryRequest {
            query: query.clone(),
            cursor,
        };
        self.post_cbor(endpoints::QUERY, &request).await
    }

    async fn fetch_by_id(
        &self,
        name: &RecordName,
        desired_keys: Option<&[&str]>,
    ) -> SyncResult<RemoteRecord> {
        let request = FetchRequest {
            name: name.clone(),
            desired_keys: desired_keys.map(|keys| keys.iter().map(|k| k.to_string()).collect()),
        };
        self.post_cbor(endpoints::FETCH, &request).await
    }

    async fn save(&self, mut record: RemoteRecord) -> SyncResult<RecordName> {
        self.upload_local_assets(&mut record).await?;
        self.post_cbor(endpoints::SAVE, &SaveRequest { record }).await
    }

    async fn delete(&self, name: &RecordName) -> SyncResult<()> {
        self.post_cbor(endpoints::DELETE, &DeleteRequest { name: name.clone() })
            .await
    }

    async fn read_asset(&self, handle: &AssetHandle) -> SyncResult<Vec<u8>> {
        let request = DownloadRequest {
            handle: handle.clone(),
        };
        let bytes: ByteBuf = self.post_cbor(endpoints::DOWNLOAD, &request).await?;
        Ok(bytes.into_vec())
    }
}

/// Trait for servers that can handle loopback requests.
#[async_trait]
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request and returns the response body.
    async fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

/// A loopback HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: Arc<S>,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: Arc<S>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle_post(request_path(url), &body).await
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Strips scheme and authority from a URL.
fn request_path(url: &str) -> &str {
    let rest = url.find("://").map_or(url, |i| &url[i + 3..]);
    rest.find('/').map_or(url, |i| &rest[i..])
}

#[async_trait]
impl LoopbackServer for MemoryRemoteStore {
    async fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        let encoded = match path {
            endpoints::QUERY => {
                let req: QueryRequest = decode_cbor(body).map_err(|e| e.to_string())?;
                encode_cbor(&WireResponse::from_result(
                    self.query(&req.query, req.cursor).await,
                ))
            }
            endpoints::FETCH => {
                let req: FetchRequest = decode_cbor(body).map_err(|e| e.to_string())?;
                let keys: Option<Vec<&str>> = req
                    .desired_keys
                    .as_ref()
                    .map(|keys| keys.iter().map(String::as_str).collect());
                encode_cbor(&WireResponse::from_result(
                    self.fetch_by_id(&req.name, keys.as_deref()).await,
                ))
            }
            endpoints::SAVE => {
                let req: SaveRequest = decode_cbor(body).map_err(|e| e.to_string())?;
                encode_cbor(&WireResponse::from_result(self.save(req.record).await))
            }
            endpoints::DELETE => {
                let req: DeleteRequest = decode_cbor(body).map_err(|e| e.to_string())?;
                encode_cbor(&WireResponse::from_result(self.delete(&req.name).await))
            }
            endpoints::UPLOAD => {
                let req: UploadRequest = decode_cbor(body).map_err(|e| e.to_string())?;
                encode_cbor(&WireResponse::Ok(self.put_asset(req.bytes)))
            }
            endpoints::DOWNLOAD => {
                let req: DownloadRequest = decode_cbor(body).map_err(|e| e.to_string())?;
                encode_cbor(&WireResponse::from_result(
                    self.read_asset(&req.handle).await.map(ByteBuf::from),
                ))
            }
            other => return Err(format!("no route for {other}")),
        };
        encoded.map_err(|e| e.to_string())
    }
}
