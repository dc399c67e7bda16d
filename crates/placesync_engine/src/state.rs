//! Sync engine state machine.

use crate::asset::{AssetStager, StagedAsset};
use crate::cache::RecordRefCache;
use crate::config::{DeleteStrategy, SyncConfig};
use crate::dedup::DedupIndex;
use crate::dispatch::{Callback, CallbackContext};
use crate::error::{SyncError, SyncResult};
use crate::remote::{RecordQuery, RemoteStoreClient, SortDescriptor};
use parking_lot::{Mutex, RwLock};
use placesync_codec::{
    from_remote, keys, overlay, to_remote, NoInlineAssets, Place, PlaceId, RecordName,
};
use placesync_store::LocalStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No fetch session is running.
    Idle,
    /// Waiting for a page from the remote store.
    FetchingPage,
    /// Handing a page's new places to the callback context.
    DeliveringResults,
    /// The last session ended on a remote or local error.
    Failed,
    /// The last session was cancelled.
    Cancelled,
}

impl SyncState {
    /// Returns true if a fetch session is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::FetchingPage | SyncState::DeliveringResults)
    }

    /// Returns true if the engine can start a new fetch session.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Fetch sessions that reached the end of the remote set.
    pub sessions_completed: u64,
    /// Fetch sessions that ended on an error.
    pub sessions_failed: u64,
    /// Pages received.
    pub pages_fetched: u64,
    /// Places handed to `on_new_place`.
    pub places_delivered: u64,
    /// Remote records skipped because they could not be decoded.
    pub malformed_skipped: u64,
    /// Successful saves.
    pub saves: u64,
    /// Successful updates.
    pub updates: u64,
    /// Successful deletes.
    pub deletes: u64,
    /// End of the last completed fetch session.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a fetch session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Pages received.
    pub pages: u64,
    /// Places `on_new_place` actually ran for.
    pub delivered: u64,
    /// Records skipped because their place ID was already known.
    pub skipped_existing: u64,
    /// Records skipped because they could not be decoded.
    pub malformed: u64,
}

/// Result of [`SyncEngine::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The remote record was overwritten.
    Updated(RecordName),
    /// The remote record no longer exists; the update was dropped.
    MissingRemotely,
}

/// Result of [`SyncEngine::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The remote record was deleted.
    Deleted,
    /// No remote record with that name exists.
    MissingRemotely,
}

/// Clears the session slot when a fetch ends, however it ends.
struct SessionGuard<'a> {
    slot: &'a Mutex<Option<Arc<AtomicBool>>>,
    state: &'a RwLock<SyncState>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
        let mut state = self.state.write();
        if state.is_active() {
            // The fetch future was dropped mid-page.
            *state = SyncState::Cancelled;
        }
    }
}

/// The sync engine mirrors a remote place set into a local store.
///
/// One fetch session runs at a time. Saves, updates, asset fetches and
/// deletes may run alongside it. Every consumer callback goes through the
/// [`CallbackContext`] the engine was built with.
pub struct SyncEngine<R: RemoteStoreClient, L: LocalStore> {
    config: SyncConfig,
    remote: Arc<R>,
    local: Arc<L>,
    callbacks: Arc<dyn CallbackContext>,
    stager: AssetStager,
    references: RecordRefCache,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    /// Cancel flag of the running fetch session.
    session: Mutex<Option<Arc<AtomicBool>>>,
}

impl<R: RemoteStoreClient, L: LocalStore> SyncEngine<R, L> {
    /// Creates a new sync engine.
    ///
    /// Sweeps the staging directory first when the configuration asks for it.
    pub fn new(
        config: SyncConfig,
        remote: Arc<R>,
        local: Arc<L>,
        callbacks: Arc<dyn CallbackContext>,
    ) -> Self {
        let stager = AssetStager::from_config(&config);
        if config.sweep_on_start {
            match stager.sweep() {
                Ok(0) => {}
                Ok(removed) => info!(removed, "removed leftover staged assets"),
                Err(e) => warn!(error = %e, "failed to sweep staging directory"),
            }
        }

        Self {
            config,
            remote,
            local,
            callbacks,
            stager,
            references: RecordRefCache::new(),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            session: Mutex::new(None),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote store client.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Returns the local store.
    pub fn local(&self) -> &Arc<L> {
        &self.local
    }

    /// Returns the remote record name last seen for a place.
    pub fn cached_reference(&self, place_id: &PlaceId) -> Option<RecordName> {
        self.references.lookup(place_id)
    }

    /// Cancels the running fetch session, if any.
    ///
    /// No further page is requested and callbacks of the session that have not
    /// run yet are skipped. Returns false if no session was running.
    pub fn cancel(&self) -> bool {
        match self.session.lock().as_ref() {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                info!("sync session cancellation requested");
                true
            }
            None => false,
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn record_error(&self, err: &SyncError) {
        self.stats.write().last_error = Some(err.to_string());
    }

    fn begin_session(&self) -> SyncResult<(SessionGuard<'_>, Arc<AtomicBool>)> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(SyncError::SessionInProgress);
        }
        let flag = Arc::new(AtomicBool::new(false));
        *slot = Some(Arc::clone(&flag));
        self.set_state(SyncState::FetchingPage);
        Ok((
            SessionGuard {
                slot: &self.session,
                state: &self.state,
            },
            flag,
        ))
    }

    fn dispatch(&self, job: Callback) -> SyncResult<()> {
        if self.callbacks.dispatch(job) {
            Ok(())
        } else {
            Err(SyncError::CallbackContextClosed)
        }
    }

    /// Resolves once the callback context has run everything dispatched so far.
    async fn callbacks_drained(&self) -> SyncResult<()> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(Box::new(move || {
            let _ = tx.send(());
        }))?;
        rx.await.map_err(|_| SyncError::CallbackContextClosed)
    }

    /// Fetches every remote place not yet present locally.
    ///
    /// Pages through the remote set sorted by name, requesting only the
    /// lightweight keys. Each new place is handed to `on_new_place` exactly
    /// once, on the callback context. The next page is requested only after
    /// the context has run the current page's callbacks. Records that fail to
    /// decode are logged and skipped. A remote error aborts the session; it is
    /// not retried.
    ///
    /// # Errors
    ///
    /// - `SessionInProgress` if another fetch is running
    /// - `Cancelled` if [`cancel`](Self::cancel) was called
    /// - The remote or local store error that ended the session
    pub async fn fetch_all<F>(&self, on_new_place: F) -> SyncResult<FetchSummary>
    where
        F: FnMut(Place) + Send + 'static,
    {
        let (_guard, cancelled) = self.begin_session()?;
        info!(
            record_type = %self.config.record_type,
            page_size = self.config.page_size,
            "sync session started"
        );

        let delivered = Arc::new(AtomicU64::new(0));
        let result = self
            .run_session(&cancelled, &delivered, on_new_place)
            .await;
        self.stats.write().places_delivered += delivered.load(Ordering::SeqCst);
        match &result {
            Ok(summary) => {
                self.set_state(SyncState::Idle);
                let mut stats = self.stats.write();
                stats.sessions_completed += 1;
                stats.pages_fetched += summary.pages;
                stats.malformed_skipped += summary.malformed;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                info!(
                    pages = summary.pages,
                    delivered = summary.delivered,
                    skipped = summary.skipped_existing,
                    malformed = summary.malformed,
                    "sync session finished"
                );
            }
            Err(SyncError::Cancelled) => {
                self.set_state(SyncState::Cancelled);
                info!(
                    delivered = delivered.load(Ordering::SeqCst),
                    "sync session cancelled"
                );
            }
            Err(e) => {
                self.set_state(SyncState::Failed);
                self.stats.write().sessions_failed += 1;
                self.record_error(e);
                warn!(error = %e, "sync session failed");
            }
        }
        result
    }

    async fn run_session<F>(
        &self,
        cancelled: &Arc<AtomicBool>,
        delivered: &Arc<AtomicU64>,
        on_new_place: F,
    ) -> SyncResult<FetchSummary>
    where
        F: FnMut(Place) + Send + 'static,
    {
        let mut index = DedupIndex::build(&self.local.all()?);
        debug!(known = index.len(), "built dedup index");

        let query = RecordQuery::all(&self.config.record_type, self.config.page_size)
            .sorted_by(SortDescriptor::ascending(&self.config.sort_key))
            .with_desired_keys(&keys::LIGHTWEIGHT);
        let sink = Arc::new(Mutex::new(on_new_place));
        let mut summary = FetchSummary::default();
        let mut cursor = None;

        loop {
            if cancelled.load(Ordering::SeqCst) {
                return Err(SyncError::Cancelled);
            }

            self.set_state(SyncState::FetchingPage);
            let page = self.remote.query(&query, cursor.take()).await?;
            summary.pages += 1;
            debug!(
                page = summary.pages,
                records = page.records.len(),
                more = page.cursor.is_some(),
                "received page"
            );

            self.set_state(SyncState::DeliveringResults);
            for record in &page.records {
                let place = match from_remote(record, &NoInlineAssets) {
                    Ok(place) => place,
                    Err(e) => {
                        warn!(record = %record.display_name(), error = %e, "skipping malformed record");
                        summary.malformed += 1;
                        continue;
                    }
                };
                if let Some(name) = &place.remote_record_name {
                    self.references.record(place.place_id, name.clone());
                }
                if !index.insert(place.place_id) {
                    summary.skipped_existing += 1;
                    continue;
                }

                let sink = Arc::clone(&sink);
                let flag = Arc::clone(cancelled);
                let count = Arc::clone(delivered);
                self.dispatch(Box::new(move || {
                    if flag.load(Ordering::SeqCst) {
                        return;
                    }
                    let mut deliver = sink.lock();
                    (*deliver)(place);
                    count.fetch_add(1, Ordering::SeqCst);
                }))?;
            }
            self.callbacks_drained().await?;
            summary.delivered = delivered.load(Ordering::SeqCst);

            // Part of this page may have been skipped.
            if cancelled.load(Ordering::SeqCst) {
                return Err(SyncError::Cancelled);
            }

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(summary)
    }

    /// Saves a place remotely, creating the record on first save.
    ///
    /// The photo, if any, is staged first; a staging failure aborts before any
    /// remote call. On success the assigned record name is written back to the
    /// local row (when one exists) and `on_saved` is dispatched. The staged
    /// file is removed whether the save succeeded or not.
    ///
    /// Once the remote save succeeded the record name is returned, even if
    /// the callback context is closed and `on_saved` cannot run.
    pub async fn save<F>(
        &self,
        place: &Place,
        image: Option<&[u8]>,
        on_saved: F,
    ) -> SyncResult<RecordName>
    where
        F: FnOnce(RecordName) + Send + 'static,
    {
        let staged = self.stage(place, image).await?;
        let record = to_remote(place, staged.as_ref().map(|s| s.handle.clone()));
        let result = self.remote.save(record).await;

        let outcome = match result {
            Ok(name) => {
                self.references.record(place.place_id, name.clone());
                if let Err(e) = self.write_back(&place.place_id, &name) {
                    warn!(place_id = %place.place_id, error = %e, "failed to store record name locally");
                }
                self.stats.write().saves += 1;
                info!(place_id = %place.place_id, record = %name, "saved place");

                // The record exists remotely from here on.
                let delivered = name.clone();
                if self.dispatch(Box::new(move || on_saved(delivered))).is_err() {
                    warn!(record = %name, "callback context closed, save not reported");
                }
                Ok(name)
            }
            Err(e) => {
                warn!(place_id = %place.place_id, error = %e, "remote save failed");
                self.record_error(&e);
                Err(e)
            }
        };

        self.release(staged).await;
        outcome
    }

    /// Overwrites the remote record of an already synchronized place.
    ///
    /// `image: None` keeps the remote photo. If the remote record is gone the
    /// update is dropped and [`UpdateOutcome::MissingRemotely`] returned; the
    /// record is not recreated.
    ///
    /// # Errors
    ///
    /// `NotFound` if the place was never saved remotely.
    pub async fn update(&self, place: &Place, image: Option<&[u8]>) -> SyncResult<UpdateOutcome> {
        let Some(name) = place
            .remote_record_name
            .clone()
            .or_else(|| self.references.lookup(&place.place_id))
        else {
            warn!(place_id = %place.place_id, "update of a place that was never saved");
            return Err(SyncError::NotFound(place.place_id.to_string()));
        };

        let mut record = match self.remote.fetch_by_id(&name, None).await {
            Ok(record) => record,
            Err(SyncError::NotFound(_)) => {
                info!(record = %name, "remote record gone, dropping update");
                self.references.forget(&name);
                return Ok(UpdateOutcome::MissingRemotely);
            }
            Err(e) => {
                warn!(record = %name, error = %e, "fetching record for update failed");
                self.record_error(&e);
                return Err(e);
            }
        };

        let staged = self.stage(place, image).await?;
        overlay(&mut record, place, staged.as_ref().map(|s| s.handle.clone()));
        let result = self.remote.save(record).await;
        self.release(staged).await;

        match result {
            Ok(saved) => {
                self.stats.write().updates += 1;
                info!(place_id = %place.place_id, record = %saved, "updated place");
                Ok(UpdateOutcome::Updated(saved))
            }
            Err(e) => {
                warn!(record = %name, error = %e, "remote update failed");
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Loads the full-size photo of a place.
    ///
    /// `on_loaded` is dispatched with the bytes, or with `None` on any failure.
    /// The same value is returned.
    pub async fn fetch_asset<F>(&self, place: &Place, on_loaded: F) -> Option<Vec<u8>>
    where
        F: FnOnce(Option<Vec<u8>>) + Send + 'static,
    {
        let bytes = self.load_asset(place).await;
        let delivered = bytes.clone();
        if !self.callbacks.dispatch(Box::new(move || on_loaded(delivered))) {
            warn!(place_id = %place.place_id, "callback context closed, asset not delivered");
        }
        bytes
    }

    async fn load_asset(&self, place: &Place) -> Option<Vec<u8>> {
        let Some(name) = self
            .references
            .lookup(&place.place_id)
            .or_else(|| place.remote_record_name.clone())
        else {
            debug!(place_id = %place.place_id, "no remote record known for asset fetch");
            return None;
        };

        let wanted = [keys::IMAGE_DATA];
        let record = match self.remote.fetch_by_id(&name, Some(&wanted[..])).await {
            Ok(record) => record,
            Err(e) => {
                warn!(record = %name, error = %e, "asset record fetch failed");
                return None;
            }
        };
        let Some(handle) = record.asset(keys::IMAGE_DATA) else {
            debug!(record = %name, "record has no photo");
            return None;
        };
        let bytes = match self.remote.read_asset(handle).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(record = %name, asset = %handle, error = %e, "asset download failed");
                return None;
            }
        };
        match image::guess_format(&bytes) {
            Ok(_) => Some(bytes),
            Err(e) => {
                warn!(record = %name, error = %e, "downloaded asset is not an image");
                None
            }
        }
    }

    /// Deletes a remote record.
    ///
    /// Errors are logged; callers that do not care can use
    /// [`spawn_delete`](Self::spawn_delete).
    pub async fn delete(&self, name: &RecordName) -> SyncResult<DeleteOutcome> {
        let result = match self.config.delete_strategy {
            DeleteStrategy::Direct => self.remote.delete(name).await,
            DeleteStrategy::Rescan => self.delete_by_rescan(name).await,
        };

        match result {
            Ok(()) => {
                self.references.forget(name);
                self.stats.write().deletes += 1;
                info!(record = %name, "deleted remote record");
                Ok(DeleteOutcome::Deleted)
            }
            Err(SyncError::NotFound(_)) => {
                info!(record = %name, "remote record already gone");
                self.references.forget(name);
                Ok(DeleteOutcome::MissingRemotely)
            }
            Err(e) => {
                warn!(record = %name, error = %e, "remote delete failed");
                self.record_error(&e);
                Err(e)
            }
        }
    }

    async fn delete_by_rescan(&self, name: &RecordName) -> SyncResult<()> {
        let query = RecordQuery::all(&self.config.record_type, self.config.page_size)
            .with_desired_keys(&[keys::PLACE_ID]);
        let mut cursor = None;
        loop {
            let page = self.remote.query(&query, cursor.take()).await?;
            if page
                .records
                .iter()
                .any(|r| r.record_name.as_ref() == Some(name))
            {
                return self.remote.delete(name).await;
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => return Err(SyncError::NotFound(name.to_string())),
            }
        }
    }

    /// Runs [`delete`](Self::delete) in the background.
    pub fn spawn_delete(self: &Arc<Self>, name: RecordName) -> JoinHandle<()>
    where
        R: 'static,
        L: 'static,
    {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            // Failures are logged by `delete`.
            let _ = engine.delete(&name).await;
        })
    }

    async fn stage(&self, place: &Place, image: Option<&[u8]>) -> SyncResult<Option<StagedAsset>> {
        let Some(bytes) = image else {
            return Ok(None);
        };
        match self.stager.stage(&place.place_id, bytes).await {
            Ok(staged) => Ok(Some(staged)),
            Err(e) => {
                warn!(place_id = %place.place_id, error = %e, "staging photo failed");
                self.record_error(&e);
                Err(e)
            }
        }
    }

    async fn release(&self, staged: Option<StagedAsset>) {
        if let Some(staged) = staged {
            self.stager.release(&staged.path).await;
        }
    }

    fn write_back(&self, place_id: &PlaceId, name: &RecordName) -> SyncResult<()> {
        if let Some(mut row) = self.local.get(place_id)? {
            if row.remote_record_name.as_ref() != Some(name) {
                row.remote_record_name = Some(name.clone());
                self.local.update(row)?;
            }
        }
        Ok(())
    }
}
