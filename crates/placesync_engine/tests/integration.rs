//! Integration tests for the sync engine against in-memory and loopback remotes.

use async_trait::async_trait;
use parking_lot::Mutex;
use placesync_codec::{
    keys, to_remote, AssetHandle, FieldValue, Place, PlaceId, RecordName, RemoteRecord,
    PLACE_RECORD_TYPE,
};
use placesync_engine::{
    main_queue, DeleteOutcome, DeleteStrategy, HttpRemoteStore, Immediate, LoopbackClient,
    MemoryRemoteStore, QueryPage, RecordQuery, RemoteStoreClient, SyncConfig, SyncCursor,
    SyncEngine, SyncError, SyncResult, SyncState, UpdateOutcome, MEMORY_ASSET_SCHEME,
};
use placesync_store::{FileLocalStore, LocalStore, MemoryLocalStore};
use proptest::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

type MemEngine = SyncEngine<MemoryRemoteStore, MemoryLocalStore>;

fn config(staging: &Path, page_size: u32) -> SyncConfig {
    SyncConfig::new()
        .with_page_size(page_size)
        .with_staging_dir(staging)
        .with_sweep_on_start(false)
}

fn memory_engine(
    staging: &TempDir,
    page_size: u32,
    remote: &Arc<MemoryRemoteStore>,
    local: &Arc<MemoryLocalStore>,
) -> MemEngine {
    SyncEngine::new(
        config(staging.path(), page_size),
        Arc::clone(remote),
        Arc::clone(local),
        Arc::new(Immediate),
    )
}

fn place(name: &str) -> Place {
    Place::new(name, Some("Main St 1".into()), Some("Cafe".into()), None, 3.0)
}

fn publish(remote: &MemoryRemoteStore, place: &Place) {
    remote.insert_raw(to_remote(place, None));
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([10, 120, 200]),
    ));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
    out.into_inner()
}

fn collector() -> (Arc<Mutex<Vec<Place>>>, impl FnMut(Place) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |p: Place| sink.lock().push(p))
}

/// Counts staged photos across every session under the staging root.
fn staged_files(dir: &TempDir) -> usize {
    let Ok(entries) = std::fs::read_dir(dir.path()) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|session| std::fs::read_dir(session.path()).ok())
        .flat_map(|files| files.flatten())
        .filter(|file| file.path().extension().is_some_and(|ext| ext == "jpg"))
        .count()
}

/// Remote that starts a second engine on the same staging root mid-save.
struct CrowdedRemote {
    inner: Arc<MemoryRemoteStore>,
    staging: PathBuf,
}

#[async_trait]
impl RemoteStoreClient for CrowdedRemote {
    async fn query(&self, query: &RecordQuery, cursor: Option<SyncCursor>) -> SyncResult<QueryPage> {
        self.inner.query(query, cursor).await
    }

    async fn fetch_by_id(
        &self,
        name: &RecordName,
        desired_keys: Option<&[&str]>,
    ) -> SyncResult<RemoteRecord> {
        self.inner.fetch_by_id(name, desired_keys).await
    }

    async fn save(&self, record: RemoteRecord) -> SyncResult<RecordName> {
        let _neighbour: MemEngine = SyncEngine::new(
            config(&self.staging, 5).with_sweep_on_start(true),
            Arc::clone(&self.inner),
            Arc::new(MemoryLocalStore::new()),
            Arc::new(Immediate),
        );
        self.inner.save(record).await
    }

    async fn delete(&self, name: &RecordName) -> SyncResult<()> {
        self.inner.delete(name).await
    }

    async fn read_asset(&self, handle: &AssetHandle) -> SyncResult<Vec<u8>> {
        self.inner.read_asset(handle).await
    }
}

#[tokio::test]
async fn one_new_place_after_two_pages() {
    let staging = tempdir().unwrap();
    let a = place("A");
    let b = place("B");
    let remote = Arc::new(MemoryRemoteStore::new());
    publish(&remote, &a);
    publish(&remote, &b);
    let local = Arc::new(MemoryLocalStore::with_places([a.clone()]));
    let engine = memory_engine(&staging, 1, &remote, &local);

    let (seen, on_new) = collector();
    let summary = engine.fetch_all(on_new).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].place_id, b.place_id);
    assert_eq!(remote.query_count(), 2);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.skipped_existing, 1);
    assert_eq!(engine.state(), SyncState::Idle);
}

#[tokio::test]
async fn second_fetch_delivers_nothing() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    for name in ["Bistro", "Alm", "Cantina", "Deli", "Espresso", "Falafel", "Gelato"] {
        publish(&remote, &place(name));
    }
    let local = Arc::new(MemoryLocalStore::new());
    let engine = memory_engine(&staging, 3, &remote, &local);

    let store = Arc::clone(&local);
    let first = engine
        .fetch_all(move |p| store.insert(p).unwrap())
        .await
        .unwrap();
    assert_eq!(first.delivered, 7);
    assert_eq!(local.len().unwrap(), 7);

    let (seen, on_new) = collector();
    let second = engine.fetch_all(on_new).await.unwrap();
    assert_eq!(second.delivered, 0);
    assert_eq!(second.skipped_existing, 7);
    assert!(seen.lock().is_empty());
    assert_eq!(engine.stats().sessions_completed, 2);
}

#[tokio::test]
async fn duplicate_place_id_delivered_once() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let twin = place("Twin");
    publish(&remote, &twin);
    publish(&remote, &twin);
    let engine = memory_engine(&staging, 1, &remote, &Arc::new(MemoryLocalStore::new()));

    let (seen, on_new) = collector();
    let summary = engine.fetch_all(on_new).await.unwrap();
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(summary.skipped_existing, 1);
}

#[tokio::test]
async fn malformed_records_are_skipped() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    publish(&remote, &place("Good one"));
    publish(&remote, &place("Good two"));

    let mut nameless = RemoteRecord::new(PLACE_RECORD_TYPE);
    nameless.set(keys::PLACE_ID, FieldValue::Text(PlaceId::new().to_string()));
    nameless.set(keys::RATING, FieldValue::Double(2.0));
    remote.insert_raw(nameless);

    let mut bad_id = to_remote(&place("Bad id"), None);
    bad_id.set(keys::PLACE_ID, FieldValue::Text("not-a-uuid".into()));
    remote.insert_raw(bad_id);

    let engine = memory_engine(&staging, 2, &remote, &Arc::new(MemoryLocalStore::new()));
    let (seen, on_new) = collector();
    let summary = engine.fetch_all(on_new).await.unwrap();

    let names: Vec<_> = seen.lock().iter().map(|p| p.name.clone()).collect();
    assert_eq!(names, ["Good one", "Good two"]);
    assert_eq!(summary.malformed, 2);
    assert_eq!(engine.stats().malformed_skipped, 2);
}

#[tokio::test]
async fn fetched_places_carry_reference_and_placeholder() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let record = to_remote(&place("With photo"), Some(remote.put_asset(png(4, 4))));
    let name = remote.insert_raw(record);
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));

    let (seen, on_new) = collector();
    engine.fetch_all(on_new).await.unwrap();

    let delivered = seen.lock()[0].clone();
    assert_eq!(delivered.remote_record_name, Some(name.clone()));
    assert_eq!(engine.cached_reference(&delivered.place_id), Some(name));
    assert_eq!(delivered.image_data, Some(placesync_codec::placeholder_image()));
}

#[tokio::test]
async fn query_error_aborts_without_retry() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    for i in 0..6 {
        publish(&remote, &place(&format!("Place {i}")));
    }
    remote.fail_query_on_call(2);
    let engine = memory_engine(&staging, 2, &remote, &Arc::new(MemoryLocalStore::new()));

    let (seen, on_new) = collector();
    let err = engine.fetch_all(on_new).await.unwrap_err();
    assert!(matches!(err, SyncError::Transport { .. }));
    assert_eq!(remote.query_count(), 2);
    assert_eq!(seen.lock().len(), 2);
    assert_eq!(engine.state(), SyncState::Failed);
}

#[tokio::test]
async fn cancel_stops_pagination() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    for i in 0..6 {
        publish(&remote, &place(&format!("Place {i}")));
    }
    let engine = Arc::new(memory_engine(
        &staging,
        2,
        &remote,
        &Arc::new(MemoryLocalStore::new()),
    ));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handle = Arc::clone(&engine);
    let err = engine
        .fetch_all(move |p: Place| {
            sink.lock().push(p.name);
            handle.cancel();
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(remote.query_count(), 1);
    // The second place of the page was queued but not run.
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(engine.state(), SyncState::Cancelled);

    // A cancelled session does not block the next one.
    let (rest, on_new) = collector();
    engine.fetch_all(on_new).await.unwrap();
    assert_eq!(rest.lock().len(), 6);
}

#[tokio::test]
async fn concurrent_fetch_is_rejected() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    for i in 0..4 {
        publish(&remote, &place(&format!("Place {i}")));
    }
    let (queue, mut receiver) = main_queue();
    let engine = Arc::new(SyncEngine::new(
        config(staging.path(), 2),
        Arc::clone(&remote),
        Arc::new(MemoryLocalStore::new()),
        Arc::new(queue),
    ));

    let (seen, on_new) = collector();
    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.fetch_all(on_new).await }
    });

    while engine.state() != SyncState::DeliveringResults {
        tokio::task::yield_now().await;
    }
    let err = engine.fetch_all(|_| {}).await.unwrap_err();
    assert!(matches!(err, SyncError::SessionInProgress));
    // Page two is not requested while page one waits for the consumer.
    assert_eq!(remote.query_count(), 1);

    while !first.is_finished() {
        receiver.run_pending();
        tokio::task::yield_now().await;
    }
    let summary = first.await.unwrap().unwrap();
    assert_eq!(summary.delivered, 4);
    assert_eq!(seen.lock().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn main_queue_runs_callbacks_on_consumer_thread() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    for i in 0..5 {
        publish(&remote, &place(&format!("Place {i}")));
    }
    let (queue, mut receiver) = main_queue();
    let engine = SyncEngine::new(
        config(staging.path(), 2),
        Arc::clone(&remote),
        Arc::new(MemoryLocalStore::new()),
        Arc::new(queue),
    );

    let consumer = std::thread::current().id();
    let threads = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&threads);
    let task = tokio::spawn(async move {
        let result = engine
            .fetch_all(move |_| record.lock().push(std::thread::current().id()))
            .await;
        drop(engine);
        result
    });

    receiver.run_until_closed().await;
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.delivered, 5);
    let threads = threads.lock();
    assert_eq!(threads.len(), 5);
    assert!(threads.iter().all(|id| *id == consumer));
}

#[tokio::test]
async fn save_releases_staged_file_on_success() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));
    let cafe = place("Cafe");

    let saved = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&saved);
    let name = engine
        .save(&cafe, Some(&png(2000, 1000)), move |n| *slot.lock() = Some(n))
        .await
        .unwrap();

    assert_eq!(saved.lock().clone(), Some(name.clone()));
    assert_eq!(staged_files(&staging), 0);

    let record = remote.record(&name).unwrap();
    let handle = record.asset(keys::IMAGE_DATA).unwrap();
    assert!(handle.location().starts_with(MEMORY_ASSET_SCHEME));

    let uploaded = remote.read_asset(handle).await.unwrap();
    let img = image::load_from_memory(&uploaded).unwrap();
    assert_eq!((img.width(), img.height()), (1080, 540));
}

#[tokio::test]
async fn save_releases_staged_file_on_failure() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.set_fail_saves(true);
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));

    let called = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&called);
    let err = engine
        .save(&place("Cafe"), Some(&png(16, 16)), move |_| *flag.lock() = true)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(!*called.lock());
    assert_eq!(remote.save_count(), 1);
    assert_eq!(staged_files(&staging), 0);
    assert!(engine.stats().last_error.is_some());
}

#[tokio::test]
async fn save_succeeds_when_callback_context_is_closed() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let local = Arc::new(MemoryLocalStore::new());
    let cafe = place("Cafe");
    local.insert(cafe.clone()).unwrap();

    let (queue, receiver) = main_queue();
    drop(receiver);
    let engine = SyncEngine::new(
        config(staging.path(), 5),
        Arc::clone(&remote),
        Arc::clone(&local),
        Arc::new(queue),
    );

    let name = engine
        .save(&cafe, Some(&png(16, 16)), |_| panic!("context is closed"))
        .await
        .unwrap();
    assert_eq!(remote.len(), 1);
    assert_eq!(
        local.get(&cafe.place_id).unwrap().unwrap().remote_record_name,
        Some(name)
    );
    assert_eq!(staged_files(&staging), 0);
}

#[tokio::test]
async fn second_engine_keeps_in_flight_photo() {
    let staging = tempdir().unwrap();
    let inner = Arc::new(MemoryRemoteStore::new());
    let remote = Arc::new(CrowdedRemote {
        inner: Arc::clone(&inner),
        staging: staging.path().to_path_buf(),
    });
    let engine = SyncEngine::new(
        config(staging.path(), 5),
        remote,
        Arc::new(MemoryLocalStore::new()),
        Arc::new(Immediate),
    );

    let name = engine
        .save(&place("Cafe"), Some(&png(16, 16)), |_| {})
        .await
        .unwrap();
    let record = inner.record(&name).unwrap();
    let handle = record.asset(keys::IMAGE_DATA).unwrap();
    assert!(inner.read_asset(handle).await.is_ok());
    assert_eq!(staged_files(&staging), 0);
}

#[tokio::test]
async fn undecodable_photo_aborts_before_remote_call() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));

    let err = engine
        .save(&place("Cafe"), Some(b"definitely not a photo"), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AssetWrite(_)));
    assert_eq!(remote.save_count(), 0);
}

#[tokio::test]
async fn update_overwrites_fields_and_keeps_photo() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));

    let mut cafe = place("Cafe");
    let name = engine.save(&cafe, Some(&png(8, 8)), |_| {}).await.unwrap();
    let photo = remote.record(&name).unwrap().asset(keys::IMAGE_DATA).cloned();

    cafe.remote_record_name = Some(name.clone());
    cafe.name = "Cafe Central".into();
    cafe.location = None;
    cafe.set_rating(5.0);
    let outcome = engine.update(&cafe, None).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated(name.clone()));

    let record = remote.record(&name).unwrap();
    assert_eq!(record.text(keys::NAME), Some("Cafe Central"));
    assert!(record.get(keys::LOCATION).is_none());
    assert_eq!(record.double(keys::RATING), Some(5.0));
    assert_eq!(record.asset(keys::IMAGE_DATA).cloned(), photo);
    assert_eq!(engine.stats().updates, 1);
}

#[tokio::test]
async fn update_replaces_photo_and_releases_staged_file() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));

    let mut cafe = place("Cafe");
    let name = engine.save(&cafe, Some(&png(8, 8)), |_| {}).await.unwrap();
    let old_photo = remote.record(&name).unwrap().asset(keys::IMAGE_DATA).cloned();

    cafe.remote_record_name = Some(name.clone());
    let outcome = engine.update(&cafe, Some(&png(40, 20))).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated(name.clone()));
    assert_eq!(staged_files(&staging), 0);

    let record = remote.record(&name).unwrap();
    let photo = record.asset(keys::IMAGE_DATA).unwrap();
    assert_ne!(Some(photo.clone()), old_photo);
    let img = image::load_from_memory(&remote.read_asset(photo).await.unwrap()).unwrap();
    assert_eq!((img.width(), img.height()), (40, 20));
}

#[tokio::test]
async fn failed_update_releases_staged_file() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));

    let mut cafe = place("Cafe");
    let name = engine.save(&cafe, None, |_| {}).await.unwrap();
    remote.set_fail_saves(true);

    cafe.remote_record_name = Some(name.clone());
    cafe.name = "Cafe Central".into();
    let err = engine.update(&cafe, Some(&png(16, 16))).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(staged_files(&staging), 0);
    assert_eq!(remote.record(&name).unwrap().text(keys::NAME), Some("Cafe"));
    assert_eq!(engine.stats().updates, 0);
}

#[tokio::test]
async fn update_of_missing_record_is_dropped() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));

    let mut cafe = place("Cafe");
    let name = engine.save(&cafe, None, |_| {}).await.unwrap();
    remote.delete(&name).await.unwrap();

    cafe.remote_record_name = Some(name);
    let outcome = engine.update(&cafe, Some(&png(8, 8))).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::MissingRemotely);
    assert!(remote.is_empty());
    assert_eq!(staged_files(&staging), 0);
}

#[tokio::test]
async fn fetch_asset_downloads_full_photo() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));
    let cafe = place("Cafe");
    engine.save(&cafe, Some(&png(32, 32)), |_| {}).await.unwrap();

    let loaded = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&loaded);
    let bytes = engine
        .fetch_asset(&cafe, move |b| *slot.lock() = b)
        .await
        .unwrap();
    assert_eq!(
        image::guess_format(&bytes).unwrap(),
        image::ImageFormat::Jpeg
    );
    assert_eq!(loaded.lock().as_ref(), Some(&bytes));
}

#[tokio::test]
async fn fetch_asset_reports_none_when_remote_is_down() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = memory_engine(&staging, 5, &remote, &Arc::new(MemoryLocalStore::new()));
    let cafe = place("Cafe");
    engine.save(&cafe, Some(&png(8, 8)), |_| {}).await.unwrap();
    remote.set_connected(false);

    let loaded = Arc::new(Mutex::new(Some(Vec::new())));
    let slot = Arc::clone(&loaded);
    assert!(engine
        .fetch_asset(&cafe, move |b| *slot.lock() = b)
        .await
        .is_none());
    assert!(loaded.lock().is_none());
}

#[tokio::test]
async fn delete_by_both_strategies() {
    for strategy in [DeleteStrategy::Direct, DeleteStrategy::Rescan] {
        let staging = tempdir().unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        for i in 0..5 {
            publish(&remote, &place(&format!("Filler {i}")));
        }
        let engine = SyncEngine::new(
            config(staging.path(), 2).with_delete_strategy(strategy),
            Arc::clone(&remote),
            Arc::new(MemoryLocalStore::new()),
            Arc::new(Immediate),
        );
        let target = engine.save(&place("Doomed"), None, |_| {}).await.unwrap();

        assert_eq!(engine.delete(&target).await.unwrap(), DeleteOutcome::Deleted);
        assert!(remote.record(&target).is_none());
        assert_eq!(remote.len(), 5);
        assert_eq!(
            engine.delete(&target).await.unwrap(),
            DeleteOutcome::MissingRemotely
        );
        assert_eq!(engine.stats().deletes, 1);
    }
}

#[tokio::test]
async fn spawned_delete_runs_in_background() {
    let staging = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = Arc::new(memory_engine(
        &staging,
        5,
        &remote,
        &Arc::new(MemoryLocalStore::new()),
    ));
    let name = engine.save(&place("Gone soon"), None, |_| {}).await.unwrap();

    engine.spawn_delete(name).await.unwrap();
    assert!(remote.is_empty());
}

#[tokio::test]
async fn http_loopback_round_trip() {
    let staging = tempdir().unwrap();
    let server = Arc::new(MemoryRemoteStore::new());
    let remote = Arc::new(HttpRemoteStore::new(
        "http://loopback",
        LoopbackClient::new(Arc::clone(&server)),
    ));

    let writer = SyncEngine::new(
        config(staging.path(), 2),
        Arc::clone(&remote),
        Arc::new(MemoryLocalStore::new()),
        Arc::new(Immediate),
    );
    for name in ["Opera", "Museum", "Park"] {
        writer.save(&place(name), Some(&png(12, 12)), |_| {}).await.unwrap();
    }
    assert_eq!(server.len(), 3);
    assert_eq!(server.asset_count(), 3);
    assert_eq!(staged_files(&staging), 0);

    let reader = SyncEngine::new(
        config(staging.path(), 2),
        Arc::clone(&remote),
        Arc::new(MemoryLocalStore::new()),
        Arc::new(Immediate),
    );
    let (seen, on_new) = collector();
    let summary = reader.fetch_all(on_new).await.unwrap();
    assert_eq!(summary.pages, 2);

    let places = seen.lock().clone();
    let names: Vec<_> = places.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Museum", "Opera", "Park"]);

    let photo = reader.fetch_asset(&places[0], |_| {}).await.unwrap();
    assert_eq!(
        image::guess_format(&photo).unwrap(),
        image::ImageFormat::Jpeg
    );
}

#[tokio::test]
async fn file_store_keeps_delivered_places() {
    let staging = tempdir().unwrap();
    let store_dir = tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    for name in ["One", "Two", "Three"] {
        publish(&remote, &place(name));
    }

    {
        let local = Arc::new(FileLocalStore::open(store_dir.path()).unwrap());
        let engine = SyncEngine::new(
            config(staging.path(), 2),
            Arc::clone(&remote),
            Arc::clone(&local),
            Arc::new(Immediate),
        );
        let store = Arc::clone(&local);
        let summary = engine
            .fetch_all(move |p| store.insert(p).unwrap())
            .await
            .unwrap();
        assert_eq!(summary.delivered, 3);
    }

    let local = Arc::new(FileLocalStore::open(store_dir.path()).unwrap());
    assert_eq!(local.len().unwrap(), 3);
    let engine = SyncEngine::new(
        config(staging.path(), 2),
        Arc::clone(&remote),
        local,
        Arc::new(Immediate),
    );
    let (seen, on_new) = collector();
    engine.fetch_all(on_new).await.unwrap();
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn engine_sweeps_leftovers_on_start() {
    let staging = tempdir().unwrap();
    let abandoned = staging.path().join("session-crashed");
    std::fs::create_dir(&abandoned).unwrap();
    std::fs::write(abandoned.join("LOCK"), b"").unwrap();
    for _ in 0..2 {
        let name = format!("{}-0123abcd.jpg", PlaceId::new());
        std::fs::write(abandoned.join(name), b"old").unwrap();
    }
    std::fs::write(staging.path().join("notes.txt"), b"unrelated").unwrap();

    let _engine: MemEngine = SyncEngine::new(
        config(staging.path(), 5).with_sweep_on_start(true),
        Arc::new(MemoryRemoteStore::new()),
        Arc::new(MemoryLocalStore::new()),
        Arc::new(Immediate),
    );
    assert_eq!(staged_files(&staging), 0);
    assert!(!abandoned.exists());
    assert!(staging.path().join("notes.txt").exists());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pagination_is_complete_and_ordered(
        names in prop::collection::vec("[a-z]{1,6}", 0..24),
        page_size in 1u32..8,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let staging = tempdir().unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        for name in &names {
            publish(&remote, &place(name));
        }
        let engine = memory_engine(&staging, page_size, &remote, &Arc::new(MemoryLocalStore::new()));

        let (seen, on_new) = collector();
        let summary = runtime.block_on(engine.fetch_all(on_new)).unwrap();

        let delivered: Vec<String> = seen.lock().iter().map(|p| p.name.clone()).collect();
        prop_assert_eq!(delivered.len(), names.len());
        prop_assert!(delivered.windows(2).all(|w| w[0] <= w[1]));

        let mut expected = names.clone();
        expected.sort();
        prop_assert_eq!(delivered, expected);

        let pages = names.len().div_ceil(page_size as usize).max(1) as u64;
        prop_assert_eq!(summary.pages, pages);
        prop_assert_eq!(remote.query_count() as u64, pages);
    }
}
