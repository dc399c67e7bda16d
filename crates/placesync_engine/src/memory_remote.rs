//! In-memory remote store for tests and demos.

use crate::error::{SyncError, SyncResult};
use crate::remote::{QueryPage, RecordQuery, RemoteStoreClient, SyncCursor};
use async_trait::async_trait;
use parking_lot::Mutex;
use placesync_codec::{AssetHandle, FieldValue, RecordName, RemoteRecord};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Scheme of handles that point into the in-memory asset table.
pub const MEMORY_ASSET_SCHEME: &str = "memory://assets/";

/// Cursors kept open at once; the oldest is evicted beyond this.
pub const MAX_OPEN_CURSORS: usize = 64;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<RecordName, RemoteRecord>,
    assets: HashMap<String, Vec<u8>>,
    /// Remaining record names of each open cursor, in result order.
    cursors: BTreeMap<u64, (RecordQuery, Vec<RecordName>)>,
    next_record: u64,
    next_asset: u64,
    next_cursor: u64,
}

impl Inner {
    fn assign_name(&mut self) -> RecordName {
        self.next_record += 1;
        RecordName::new(format!("rec-{:06}", self.next_record))
    }

    fn store_asset(&mut self, bytes: Vec<u8>) -> AssetHandle {
        self.next_asset += 1;
        let location = format!("{MEMORY_ASSET_SCHEME}{}", self.next_asset);
        self.assets.insert(location.clone(), bytes);
        AssetHandle::new(location)
    }

    fn page(&mut self, query: RecordQuery, mut remaining: Vec<RecordName>) -> QueryPage {
        let take = (query.page_size as usize).min(remaining.len());
        let rest = remaining.split_off(take);
        let records = remaining
            .iter()
            .filter_map(|name| self.records.get(name))
            .map(|record| match &query.desired_keys {
                Some(keys) => {
                    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                    record.project(&keys)
                }
                None => record.clone(),
            })
            .collect();

        let cursor = if rest.is_empty() {
            None
        } else {
            self.next_cursor += 1;
            self.cursors.insert(self.next_cursor, (query, rest));
            while self.cursors.len() > MAX_OPEN_CURSORS {
                if let Some((evicted, _)) = self.cursors.pop_first() {
                    debug!(cursor = evicted, "evicted abandoned cursor");
                }
            }
            Some(SyncCursor::new(self.next_cursor.to_be_bytes()))
        };

        QueryPage { records, cursor }
    }
}

/// A remote store held entirely in memory.
///
/// Query results are snapshotted when the first page is requested; later
/// pages follow that snapshot. Cursors can be consumed once. Saved records
/// whose asset handle points at a local file get the file's bytes copied into
/// the store, as an upload would.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    inner: Mutex<Inner>,
    connected: AtomicBool,
    fail_saves: AtomicBool,
    /// 1-based query call that fails, 0 for none.
    fail_query_call: AtomicUsize,
    queries: AtomicUsize,
    saves: AtomicUsize,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    /// Creates an empty, connected store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            connected: AtomicBool::new(true),
            fail_saves: AtomicBool::new(false),
            fail_query_call: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
        }
    }

    /// Sets the connected state. A disconnected store fails every call.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every save fail with a transport error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes the `call`-th query (1-based, counted from now on) fail.
    pub fn fail_query_on_call(&self, call: usize) {
        let done = self.queries.load(Ordering::SeqCst);
        self.fail_query_call.store(done + call, Ordering::SeqCst);
    }

    /// Stores a record as-is, assigning a name when it has none.
    pub fn insert_raw(&self, mut record: RemoteRecord) -> RecordName {
        let mut inner = self.inner.lock();
        let name = match record.record_name.clone() {
            Some(name) => name,
            None => inner.assign_name(),
        };
        record.record_name = Some(name.clone());
        inner.records.insert(name.clone(), record);
        name
    }

    /// Stores asset bytes and returns a handle to them.
    pub fn put_asset(&self, bytes: Vec<u8>) -> AssetHandle {
        self.inner.lock().store_asset(bytes)
    }

    /// Returns a stored record.
    #[must_use]
    pub fn record(&self, name: &RecordName) -> Option<RemoteRecord> {
        self.inner.lock().records.get(name).cloned()
    }

    /// Returns every stored record, ordered by name.
    #[must_use]
    pub fn records(&self) -> Vec<RemoteRecord> {
        self.inner.lock().records.values().cloned().collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns true if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored assets.
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.inner.lock().assets.len()
    }

    /// Number of cursors that can still be continued.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.inner.lock().cursors.len()
    }

    /// Number of query calls served so far, failed ones included.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of save calls served so far, failed ones included.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("remote store unreachable"))
        }
    }

    fn asset_bytes(&self, handle: &AssetHandle) -> Option<Vec<u8>> {
        self.inner.lock().assets.get(handle.location()).cloned()
    }
}

#[async_trait]
impl RemoteStoreClient for MemoryRemoteStore {
    async fn query(
        &self,
        query: &RecordQuery,
        cursor: Option<SyncCursor>,
    ) -> SyncResult<QueryPage> {
        let call = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_connected()?;
        if self.fail_query_call.load(Ordering::SeqCst) == call {
            return Err(SyncError::transport_retryable(format!(
                "query call {call} failed"
            )));
        }

        let mut inner = self.inner.lock();
        match cursor {
            Some(cursor) => {
                let (stored, remaining) = <[u8; 8]>::try_from(cursor.as_bytes())
                    .ok()
                    .map(u64::from_be_bytes)
                    .and_then(|id| inner.cursors.remove(&id))
                    .ok_or_else(|| SyncError::transport_fatal("invalid or consumed cursor"))?;
                Ok(inner.page(stored, remaining))
            }
            None => {
                let mut matching: Vec<&RemoteRecord> = inner
                    .records
                    .values()
                    .filter(|r| query.matches(r))
                    .collect();
                if let Some(sort) = &query.sort {
                    matching.sort_by(|a, b| {
                        let ord = compare_fields(a.get(&sort.key), b.get(&sort.key));
                        if sort.ascending {
                            ord
                        } else {
                            ord.reverse()
                        }
                    });
                }
                let names = matching
                    .into_iter()
                    .filter_map(|r| r.record_name.clone())
                    .collect();
                Ok(inner.page(query.clone(), names))
            }
        }
    }

    async fn fetch_by_id(
        &self,
        name: &RecordName,
        desired_keys: Option<&[&str]>,
    ) -> SyncResult<RemoteRecord> {
        self.check_connected()?;
        let record = self
            .record(name)
            .ok_or_else(|| SyncError::NotFound(name.to_string()))?;
        Ok(match desired_keys {
            Some(keys) => record.project(keys),
            None => record,
        })
    }

    async fn save(&self, mut record: RemoteRecord) -> SyncResult<RecordName> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.check_connected()?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("save rejected"));
        }

        // Upload file-backed assets before touching the table.
        let mut uploads = Vec::new();
        for (key, value) in &record.fields {
            if let FieldValue::Asset(handle) = value {
                if !handle.location().starts_with(MEMORY_ASSET_SCHEME) {
                    let bytes = tokio::fs::read(handle.to_path()).await.map_err(|e| {
                        SyncError::transport_fatal(format!("asset upload from {handle}: {e}"))
                    })?;
                    uploads.push((key.clone(), bytes));
                }
            }
        }

        let mut inner = self.inner.lock();
        for (key, bytes) in uploads {
            let handle = inner.store_asset(bytes);
            record.fields.insert(key, FieldValue::Asset(handle));
        }
        let name = match record.record_name.clone() {
            Some(name) => name,
            None => inner.assign_name(),
        };
        record.record_name = Some(name.clone());
        inner.records.insert(name.clone(), record);
        debug!(record = %name, "memory remote saved record");
        Ok(name)
    }

    async fn delete(&self, name: &RecordName) -> SyncResult<()> {
        self.check_connected()?;
        self.inner
            .lock()
            .records
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SyncError::NotFound(name.to_string()))
    }

    async fn read_asset(&self, handle: &AssetHandle) -> SyncResult<Vec<u8>> {
        self.check_connected()?;
        self.asset_bytes(handle)
            .ok_or_else(|| SyncError::NotFound(handle.to_string()))
    }
}

fn compare_fields(a: Option<&FieldValue>, b: Option<&FieldValue>) -> CmpOrdering {
    match (a, b) {
        (Some(FieldValue::Text(x)), Some(FieldValue::Text(y))) => x.cmp(y),
        (Some(FieldValue::Double(x)), Some(FieldValue::Double(y))) => x.total_cmp(y),
        (Some(FieldValue::Timestamp(x)), Some(FieldValue::Timestamp(y))) => x.cmp(y),
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}
