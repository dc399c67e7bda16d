//! Inspect command implementation.

use placesync_store::{FileLocalStore, LocalStore};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Log file size in bytes.
    pub log_size: u64,
    /// Frames in the log, superseded ones included.
    pub frame_count: u64,
    /// Number of live places.
    pub place_count: usize,
    /// Places that have a remote record name.
    pub synchronized_count: usize,
    /// Total photo bytes across all places.
    pub photo_bytes: u64,
    /// Per-place details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub places: Option<Vec<PlaceSummary>>,
}

/// One place in the listing.
#[derive(Debug, Serialize)]
pub struct PlaceSummary {
    /// Place ID.
    pub place_id: String,
    /// Remote record name, if synchronized.
    pub record_name: Option<String>,
    /// Display name.
    pub name: String,
    /// Category.
    pub place_type: Option<String>,
    /// Star rating.
    pub rating: f64,
    /// Photo size in bytes.
    pub photo_bytes: usize,
    /// Creation time, RFC 3339.
    pub created_at: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_places: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }

    let store = FileLocalStore::open(path)?;
    let places = store.all()?;

    let summaries: Vec<PlaceSummary> = places
        .iter()
        .map(|p| PlaceSummary {
            place_id: p.place_id.to_string(),
            record_name: p.remote_record_name.as_ref().map(ToString::to_string),
            name: p.name.clone(),
            place_type: p.place_type.clone(),
            rating: p.rating,
            photo_bytes: p.image_data.as_ref().map_or(0, Vec::len),
            created_at: p.created_at.to_rfc3339(),
        })
        .collect();

    let result = InspectResult {
        path: path.display().to_string(),
        log_size: store.log_size()?,
        frame_count: store.frame_count(),
        place_count: places.len(),
        synchronized_count: places.iter().filter(|p| p.is_synchronized()).count(),
        photo_bytes: summaries.iter().map(|s| s.photo_bytes as u64).sum(),
        places: show_places.then_some(summaries),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("placesync Store Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:     {}", format_size(result.log_size));
    println!("  Log frames:   {}", result.frame_count);
    println!();
    println!("Places:");
    println!("  Live places:  {}", result.place_count);
    println!("  Synchronized: {}", result.synchronized_count);
    println!("  Photo data:   {}", format_size(result.photo_bytes));

    if let Some(places) = &result.places {
        println!();
        for place in places {
            println!(
                "  {} {:<24} {:.1}* {:>8} {}",
                place.place_id,
                place.name,
                place.rating,
                format_size(place.photo_bytes as u64),
                place.record_name.as_deref().unwrap_or("(local only)")
            );
        }
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
