//! Configuration for the sync engine.

use placesync_codec::{keys, PLACE_RECORD_TYPE};
use std::path::PathBuf;

/// Records requested per remote round-trip.
///
/// Kept small so memory stays bounded and the first places show up early.
pub const DEFAULT_PAGE_SIZE: u32 = 5;
/// Largest edge of a staged photo, in pixels.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1080;
/// JPEG quality used when staging photos.
pub const DEFAULT_JPEG_QUALITY: u8 = 100;
/// Name of the staging root under the system temp dir.
pub const STAGING_DIR_NAME: &str = "placesync-staging";

/// How a remote delete locates its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteStrategy {
    /// Delete by record name in a single call.
    #[default]
    Direct,
    /// Page through the whole remote set, match by record name, then delete.
    ///
    /// For remotes whose delete call cannot be trusted to report a missing
    /// record.
    Rescan,
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote record type holding places.
    pub record_type: String,
    /// Maximum records per page.
    pub page_size: u32,
    /// Field the paginated query sorts by, ascending.
    pub sort_key: String,
    /// Largest edge of a staged photo.
    pub max_image_dimension: u32,
    /// JPEG quality (1-100) for staged photos.
    pub jpeg_quality: u8,
    /// Root of the staging area. Every engine stages into its own session
    /// directory below it.
    pub staging_dir: PathBuf,
    /// Remote delete behavior.
    pub delete_strategy: DeleteStrategy,
    /// Remove sessions abandoned by dead engines when the engine starts.
    pub sweep_on_start: bool,
}

impl SyncConfig {
    /// Creates a configuration with the default policy values.
    pub fn new() -> Self {
        Self {
            record_type: PLACE_RECORD_TYPE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            sort_key: keys::NAME.to_string(),
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            staging_dir: std::env::temp_dir().join(STAGING_DIR_NAME),
            delete_strategy: DeleteStrategy::default(),
            sweep_on_start: true,
        }
    }

    /// Sets the page size. Zero is treated as one.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the maximum photo edge. Zero is treated as one.
    pub fn with_max_image_dimension(mut self, dimension: u32) -> Self {
        self.max_image_dimension = dimension.max(1);
        self
    }

    /// Sets the JPEG quality, clamped to 1-100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Sets the staging directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Sets the delete strategy.
    pub fn with_delete_strategy(mut self, strategy: DeleteStrategy) -> Self {
        self.delete_strategy = strategy;
        self
    }

    /// Enables or disables the startup sweep of the staging directory.
    pub fn with_sweep_on_start(mut self, sweep: bool) -> Self {
        self.sweep_on_start = sweep;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
