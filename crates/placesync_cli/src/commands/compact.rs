//! Compact command implementation.

use super::inspect::format_size;
use placesync_store::{FileLocalStore, LocalStore};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }

    println!("Compacting place log at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let store = FileLocalStore::open(path)?;
    let frames = store.frame_count();
    let live = store.len()? as u64;
    let bytes_before = store.log_size()?;

    println!("Compaction Analysis:");
    println!("  Frames:            {}", frames);
    println!("  Live places:       {}", live);
    println!("  Superseded frames: {}", frames.saturating_sub(live));
    println!("  Size before:       {}", format_size(bytes_before));

    if dry_run {
        return Ok(());
    }

    println!();
    if frames > live {
        println!("Performing compaction...");
        store.compact()?;
        let bytes_after = store.log_size()?;
        println!("  Size after:        {}", format_size(bytes_after));
        println!("✓ Compaction complete");
    } else {
        println!("No compaction needed - log is already minimal");
    }

    Ok(())
}
