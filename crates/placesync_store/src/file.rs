//! File-based local store.
//!
//! The store owns a directory:
//!
//! ```text
//! <store_dir>/
//! ├─ LOCK          # Advisory lock for single-writer
//! └─ places.log    # Append-only log of framed row operations
//! ```
//!
//! Every frame is `op (u8) | payload length (u32 LE) | payload`. A put frame
//! carries an encoded row, a delete frame the 16 bytes of the place UUID.
//! Opening the store replays the log into memory; a torn frame at the tail
//! (crash during append) is cut off.

use crate::error::{StoreError, StoreResult};
use crate::memory::PlaceTable;
use crate::store::LocalStore;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use placesync_codec::{decode_row, encode_row, Place, PlaceId};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "places.log";
/// Temporary file for atomic compaction.
const LOG_TEMP: &str = "places.log.tmp";

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;
const FRAME_HEADER_LEN: usize = 5;

/// A file-based local store.
///
/// Rows survive process restarts. All reads are served from the in-memory
/// view rebuilt at open time; writes append a frame and `fsync` before the
/// in-memory view changes.
///
/// # Thread Safety
///
/// This store is thread-safe. The LOCK file ensures only one process can open
/// the directory at a time.
///
/// # Example
///
/// ```no_run
/// use placesync_codec::Place;
/// use placesync_store::{FileLocalStore, LocalStore};
/// use std::path::Path;
///
/// let store = FileLocalStore::open(Path::new("places")).unwrap();
/// store.insert(Place::new("Stephansdom", None, None, None, 5.0)).unwrap();
/// ```
#[derive(Debug)]
pub struct FileLocalStore {
    path: PathBuf,
    table: RwLock<PlaceTable>,
    log: Mutex<File>,
    /// Number of frames in the log, live or not.
    frames: RwLock<u64>,
    _lock_file: File,
}

impl FileLocalStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - Another process holds the lock (returns `Locked`)
    /// - The log holds an unknown frame or an undecodable row
    pub fn open(path: &Path) -> StoreResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        let mut log = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOG_FILE))?;

        let (table, frames) = replay(&mut log)?;
        info!(
            path = %path.display(),
            places = table.len(),
            frames,
            "opened local store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            table: RwLock::new(table),
            log: Mutex::new(log),
            frames: RwLock::new(frames),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of frames in the log, including superseded ones.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        *self.frames.read()
    }

    /// Returns the size of the log file in bytes.
    pub fn log_size(&self) -> StoreResult<u64> {
        Ok(self.log.lock().metadata()?.len())
    }

    /// Rewrites the log so it holds exactly one put frame per live place.
    ///
    /// Uses write-then-rename for crash safety.
    pub fn compact(&self) -> StoreResult<()> {
        let table = self.table.read();
        let mut log = self.log.lock();

        let temp_path = self.path.join(LOG_TEMP);
        let mut temp = File::create(&temp_path)?;
        let places = table.all();
        for place in &places {
            temp.write_all(&frame(OP_PUT, &encode_row(place)?))?;
        }
        temp.sync_all()?;
        drop(temp);

        fs::rename(&temp_path, self.path.join(LOG_FILE))?;
        sync_directory(&self.path)?;

        *log = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path.join(LOG_FILE))?;
        let before = std::mem::replace(&mut *self.frames.write(), places.len() as u64);
        debug!(before, after = places.len(), "compacted place log");
        Ok(())
    }

    fn append(&self, op: u8, payload: &[u8]) -> StoreResult<()> {
        let mut log = self.log.lock();
        log.seek(SeekFrom::End(0))?;
        log.write_all(&frame(op, payload))?;
        log.sync_data()?;
        *self.frames.write() += 1;
        Ok(())
    }
}

impl LocalStore for FileLocalStore {
    fn all(&self) -> StoreResult<Vec<Place>> {
        Ok(self.table.read().all())
    }

    fn get(&self, place_id: &PlaceId) -> StoreResult<Option<Place>> {
        Ok(self.table.read().get(place_id).cloned())
    }

    fn insert(&self, place: Place) -> StoreResult<()> {
        let mut table = self.table.write();
        if table.contains(&place.place_id) {
            return Err(StoreError::AlreadyExists(place.place_id));
        }
        self.append(OP_PUT, &encode_row(&place)?)?;
        table.put(place);
        Ok(())
    }

    fn update(&self, place: Place) -> StoreResult<()> {
        let mut table = self.table.write();
        if !table.contains(&place.place_id) {
            return Err(StoreError::NotFound(place.place_id));
        }
        self.append(OP_PUT, &encode_row(&place)?)?;
        table.put(place);
        Ok(())
    }

    fn delete(&self, place_id: &PlaceId) -> StoreResult<()> {
        let mut table = self.table.write();
        if !table.contains(place_id) {
            return Err(StoreError::NotFound(*place_id));
        }
        self.append(OP_DELETE, place_id.as_bytes())?;
        table.remove(place_id);
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.table.read().len())
    }
}

fn frame(op: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.push(op);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Rebuilds the in-memory table from the log, cutting off a torn tail.
fn replay(log: &mut File) -> StoreResult<(PlaceTable, u64)> {
    let mut data = Vec::new();
    log.seek(SeekFrom::Start(0))?;
    log.read_to_end(&mut data)?;

    let mut table = PlaceTable::default();
    let mut frames = 0u64;
    let mut offset = 0usize;

    while offset < data.len() {
        if data.len() - offset < FRAME_HEADER_LEN {
            break;
        }
        let op = data[offset];
        let len_bytes: [u8; 4] = data[offset + 1..offset + FRAME_HEADER_LEN]
            .try_into()
            .map_err(|_| StoreError::Corrupted("frame header".into()))?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let start = offset + FRAME_HEADER_LEN;
        let end = start.saturating_add(len);
        if end > data.len() {
            break;
        }
        let payload = &data[start..end];

        match op {
            OP_PUT => table.put(decode_row(payload)?),
            OP_DELETE => {
                let bytes: [u8; 16] = payload.try_into().map_err(|_| {
                    StoreError::Corrupted(format!("delete frame at offset {offset} has {len} bytes"))
                })?;
                table.remove(&PlaceId::from_bytes(bytes));
            }
            other => {
                return Err(StoreError::Corrupted(format!(
                    "unknown frame op {other} at offset {offset}"
                )))
            }
        }

        frames += 1;
        offset = end;
    }

    if offset < data.len() {
        warn!(
            offset,
            dropped = data.len() - offset,
            "truncating torn frame at end of place log"
        );
        log.set_len(offset as u64)?;
        log.sync_all()?;
    }

    Ok((table, frames))
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> StoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> StoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use placesync_codec::RecordName;
    use tempfile::tempdir;

    fn place(name: &str) -> Place {
        Place::new(name, Some("somewhere".into()), None, Some(vec![7; 32]), 2.5)
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let store = FileLocalStore::open(dir.path()).unwrap();
        assert!(store.is_empty().unwrap());
        assert!(dir.path().join(LOG_FILE).exists());
        assert!(dir.path().join(LOCK_FILE).exists());
        assert_eq!(store.path(), dir.path());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let kept = place("kept");
        let dropped = place("dropped");

        {
            let store = FileLocalStore::open(dir.path()).unwrap();
            store.insert(kept.clone()).unwrap();
            store.insert(dropped.clone()).unwrap();
            store
                .update(kept.clone().with_record_name(RecordName::new("rec-1")))
                .unwrap();
            store.delete(&dropped.place_id).unwrap();
        }

        let store = FileLocalStore::open(dir.path()).unwrap();
        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].place_id, kept.place_id);
        assert_eq!(all[0].remote_record_name, Some(RecordName::new("rec-1")));
        assert_eq!(store.frame_count(), 4);
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _store = FileLocalStore::open(dir.path()).unwrap();
        assert!(matches!(
            FileLocalStore::open(dir.path()),
            Err(StoreError::Locked)
        ));
    }

    #[test]
    fn file_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let p = place("survivor");
        {
            let store = FileLocalStore::open(dir.path()).unwrap();
            store.insert(p.clone()).unwrap();
        }

        let log_path = dir.path().join(LOG_FILE);
        let good_len = fs::metadata(&log_path).unwrap().len();
        {
            let mut log = OpenOptions::new().append(true).open(&log_path).unwrap();
            log.write_all(&[OP_PUT, 200, 0, 0, 0, 1, 2, 3]).unwrap();
        }

        let store = FileLocalStore::open(dir.path()).unwrap();
        assert_eq!(store.all().unwrap(), vec![p]);
        assert_eq!(fs::metadata(&log_path).unwrap().len(), good_len);
    }

    #[test]
    fn file_unknown_op_is_corruption() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LOG_FILE), frame(9, b"??")).unwrap();
        assert!(matches!(
            FileLocalStore::open(dir.path()),
            Err(StoreError::Corrupted(_))
        ));
    }

    #[test]
    fn file_compact_keeps_live_rows() {
        let dir = tempdir().unwrap();
        let a = place("a");
        let b = place("b");
        {
            let store = FileLocalStore::open(dir.path()).unwrap();
            store.insert(a.clone()).unwrap();
            store.insert(b.clone()).unwrap();
            store.update(a.clone()).unwrap();
            store.delete(&b.place_id).unwrap();
            assert_eq!(store.frame_count(), 4);

            let before = store.log_size().unwrap();
            store.compact().unwrap();
            assert_eq!(store.frame_count(), 1);
            assert!(store.log_size().unwrap() < before);
            assert!(!dir.path().join(LOG_TEMP).exists());

            // Appends after compaction go to the new log.
            store.insert(b.clone()).unwrap();
        }

        let store = FileLocalStore::open(dir.path()).unwrap();
        let names: Vec<_> = store.all().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.frame_count(), 2);
    }
}
