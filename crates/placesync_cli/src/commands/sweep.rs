//! Sweep command implementation.

use placesync_engine::{AssetStager, SyncConfig};
use std::path::PathBuf;

/// Runs the sweep command.
///
/// Sessions of running engines are left alone.
pub fn run(dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = SyncConfig::default();
    if let Some(dir) = dir {
        config = config.with_staging_dir(dir);
    }

    let stager = AssetStager::from_config(&config);
    let removed = stager.sweep()?;
    println!(
        "Removed {} abandoned staged file(s) under {}",
        removed,
        stager.root().display()
    );
    Ok(())
}
