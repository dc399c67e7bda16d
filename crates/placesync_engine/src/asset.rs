//! Staging of photos for out-of-band upload.
//!
//! A photo attached to a save or update is downscaled, re-encoded as JPEG and
//! written to a file in the staging area. The record only carries an
//! [`AssetHandle`] pointing at that file. The engine releases the file once the
//! remote call that referenced it has finished, successfully or not.
//!
//! ```text
//! <staging root>/
//! ├─ session-XXXXXX/       # One per stager, removed when the stager drops
//! │  ├─ LOCK               # Held while the owning stager is alive
//! │  └─ <place_id>-<nonce>.jpg
//! └─ ...
//! ```

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, GenericImageView};
use parking_lot::Mutex;
use placesync_codec::{AssetHandle, PlaceId};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Extension of staged files.
const STAGED_EXTENSION: &str = "jpg";
/// Characters of randomness appended to a staged file name.
const NONCE_LEN: usize = 8;
/// Prefix of session directories under the staging root.
const SESSION_PREFIX: &str = "session-";
/// Lock file inside a session directory.
const LOCK_FILE: &str = "LOCK";
/// Prefix of files that are still being written.
const PARTIAL_PREFIX: &str = ".partial-";

/// A photo written to the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    /// Handle carried by the remote record.
    pub handle: AssetHandle,
    /// File holding the encoded bytes.
    pub path: PathBuf,
}

/// A session directory owned by one stager.
#[derive(Debug)]
struct StagingSession {
    // Closed before the directory is removed.
    _lock: File,
    dir: TempDir,
}

impl StagingSession {
    fn open(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(SESSION_PREFIX)
            .tempdir_in(root)?;

        // Locked before it becomes visible as LOCK, so a concurrent sweep
        // never sees an unlocked live session.
        let pending = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(dir.path())?;
        pending.as_file().try_lock_exclusive()?;
        let lock = pending
            .persist(dir.path().join(LOCK_FILE))
            .map_err(|e| e.error)?;

        debug!(dir = %dir.path().display(), "opened staging session");
        Ok(Self { _lock: lock, dir })
    }
}

/// Writes photos to scoped temporary files and removes them again.
///
/// Each stager writes into its own session directory below the configured
/// root. The session is created on the first `stage` and removed with its
/// contents when the last clone of the stager is dropped.
#[derive(Debug, Clone)]
pub struct AssetStager {
    root: PathBuf,
    max_dimension: u32,
    quality: u8,
    session: Arc<Mutex<Option<StagingSession>>>,
}

impl AssetStager {
    /// Creates a stager whose sessions live under `root`.
    pub fn new(root: impl Into<PathBuf>, max_dimension: u32, quality: u8) -> Self {
        Self {
            root: root.into(),
            max_dimension: max_dimension.max(1),
            quality: quality.clamp(1, 100),
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a stager from the engine configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.staging_dir.clone(),
            config.max_image_dimension,
            config.jpeg_quality,
        )
    }

    /// Returns the staging root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns this stager's session directory, once something was staged.
    pub fn session_dir(&self) -> Option<PathBuf> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.dir.path().to_path_buf())
    }

    /// Downscales, re-encodes and writes `image` for the given place.
    ///
    /// Decoding, encoding and writing run on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `AssetWrite` if the bytes are not a decodable image or the file
    /// cannot be written.
    pub async fn stage(&self, place_id: &PlaceId, image: &[u8]) -> SyncResult<StagedAsset> {
        let bytes = image.to_vec();
        let max_dimension = self.max_dimension;
        let quality = self.quality;

        let encoded = tokio::task::spawn_blocking(move || {
            encode_jpeg(&bytes, max_dimension, quality)
        })
        .await
        .map_err(|e| SyncError::AssetWrite(format!("encoder task failed: {e}")))??;

        let session = Arc::clone(&self.session);
        let root = self.root.clone();
        let file_name = staged_file_name(place_id);
        let path = tokio::task::spawn_blocking(move || -> SyncResult<PathBuf> {
            let dir = session_dir(&session, &root)?;
            let target = dir.join(file_name);
            write_atomic(&dir, &target, &encoded)?;
            Ok(target)
        })
        .await
        .map_err(|e| SyncError::AssetWrite(format!("writer task failed: {e}")))??;

        debug!(place_id = %place_id, path = %path.display(), "staged asset");
        Ok(StagedAsset {
            handle: AssetHandle::from_path(&path),
            path,
        })
    }

    /// Removes a staged file.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn release(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "released staged asset"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged asset"),
        }
    }

    /// Removes sessions left under the staging root by stagers that are gone.
    ///
    /// A session whose lock is still held belongs to a live stager, in this
    /// process or another, and is left alone. Inside an abandoned session only
    /// files named like staged photos are removed; the directory itself goes
    /// only once it is empty. Anything else under the root is never touched.
    ///
    /// Returns the number of staged files removed. A missing root counts as
    /// empty.
    pub fn sweep(&self) -> SyncResult<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(SyncError::AssetWrite(e.to_string())),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::AssetWrite(e.to_string()))?;
            let path = entry.path();
            let is_session = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(SESSION_PREFIX));
            if !is_session || !path.is_dir() {
                continue;
            }
            match sweep_session(&path) {
                Ok(Some(count)) => removed += count,
                Ok(None) => debug!(dir = %path.display(), "staging session in use"),
                Err(e) => warn!(dir = %path.display(), error = %e, "failed to sweep staging session"),
            }
        }
        if removed > 0 {
            debug!(root = %self.root.display(), removed, "swept staging area");
        }
        Ok(removed)
    }
}

fn session_dir(session: &Mutex<Option<StagingSession>>, root: &Path) -> SyncResult<PathBuf> {
    let mut slot = session.lock();
    if let Some(open) = slot.as_ref() {
        return Ok(open.dir.path().to_path_buf());
    }
    let open = StagingSession::open(root).map_err(|e| SyncError::AssetWrite(e.to_string()))?;
    let dir = open.dir.path().to_path_buf();
    *slot = Some(open);
    Ok(dir)
}

/// Cleans one session directory if its owner is gone.
///
/// Returns `None` if the session is live or has no lock file yet.
fn sweep_session(dir: &Path) -> io::Result<Option<usize>> {
    let lock_path = dir.join(LOCK_FILE);
    let lock = match File::open(&lock_path) {
        Ok(lock) => lock,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if lock.try_lock_exclusive().is_err() {
        return Ok(None);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let owned = entry
            .file_name()
            .to_str()
            .is_some_and(is_staged_file_name);
        if owned && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    drop(lock);
    fs::remove_file(&lock_path)?;
    if let Err(e) = fs::remove_dir(dir) {
        warn!(dir = %dir.display(), error = %e, "abandoned staging session holds foreign files");
    }
    Ok(Some(removed))
}

/// `<place_id>-<nonce>.jpg`
fn staged_file_name(place_id: &PlaceId) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{place_id}-{}.{STAGED_EXTENSION}", &nonce[..NONCE_LEN])
}

/// True for names produced by [`staged_file_name`] and for partial writes.
fn is_staged_file_name(name: &str) -> bool {
    if name.starts_with(PARTIAL_PREFIX) {
        return true;
    }
    let Some(stem) = name
        .strip_suffix(STAGED_EXTENSION)
        .and_then(|rest| rest.strip_suffix('.'))
    else {
        return false;
    };
    let Some((place_id, nonce)) = stem.rsplit_once('-') else {
        return false;
    };
    nonce.len() == NONCE_LEN
        && nonce.bytes().all(|b| b.is_ascii_hexdigit())
        && place_id.parse::<PlaceId>().is_ok()
}

fn encode_jpeg(bytes: &[u8], max_dimension: u32, quality: u8) -> SyncResult<Vec<u8>> {
    let mut img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    if width.max(height) > max_dimension {
        img = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    }

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;
    Ok(out)
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> SyncResult<()> {
    let io_err = |e: io::Error| SyncError::AssetWrite(e.to_string());

    let mut temp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(dir)
        .map_err(io_err)?;
    temp.write_all(bytes).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(target).map_err(|e| io_err(e.error))?;
    Ok(())
}
