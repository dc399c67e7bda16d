//! Stage command implementation.

use super::inspect::format_size;
use placesync_codec::PlaceId;
use placesync_engine::{AssetStager, SyncConfig};
use std::path::{Path, PathBuf};

/// Runs the stage command.
///
/// The staged file lives in this command's session directory, which is
/// removed when the command exits.
pub fn run(
    image: &Path,
    dir: Option<PathBuf>,
    max_dimension: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(image)?;

    let mut config = SyncConfig::default();
    if let Some(dir) = dir {
        config = config.with_staging_dir(dir);
    }
    if let Some(max) = max_dimension {
        config = config.with_max_image_dimension(max);
    }

    let stager = AssetStager::from_config(&config);
    let place_id = PlaceId::new();
    let runtime = tokio::runtime::Runtime::new()?;
    let staged = runtime.block_on(stager.stage(&place_id, &bytes))?;

    let written = std::fs::metadata(&staged.path)?.len();
    let (width, height) = image::image_dimensions(&staged.path)?;
    println!("Staged {} for place {}", image.display(), place_id);
    println!("  Path:   {}", staged.path.display());
    println!("  Size:   {} -> {}", format_size(bytes.len() as u64), format_size(written));
    println!("  Pixels: {}x{}", width, height);
    Ok(())
}
