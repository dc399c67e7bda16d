//! Demo command implementation.
//!
//! Publishes sample places to an in-memory remote through one engine, then
//! mirrors them into the local store through a second engine whose callbacks
//! run on this thread.

use super::inspect::format_size;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use placesync_codec::Place;
use placesync_engine::{
    main_queue, Immediate, MemoryRemoteStore, SyncConfig, SyncEngine,
};
use placesync_store::{FileLocalStore, LocalStore, MemoryLocalStore};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const SAMPLE_NAMES: [&str; 8] = [
    "Cafe Central",
    "Naschmarkt",
    "Albertina",
    "Prater",
    "Figlmueller",
    "Belvedere",
    "Augarten",
    "Zum Schwarzen Kameel",
];
const SAMPLE_TYPES: [&str; 5] = ["Cafe", "Market", "Museum", "Park", "Restaurant"];

type DemoResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Runs the demo command.
pub fn run(store: Option<&Path>, count: usize, page_size: u32) -> DemoResult<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    match store {
        Some(path) => {
            let local = Arc::new(FileLocalStore::open(path)?);
            runtime.block_on(demo(local, count, page_size))
        }
        None => runtime.block_on(demo(Arc::new(MemoryLocalStore::new()), count, page_size)),
    }
}

async fn demo<L: LocalStore + 'static>(local: Arc<L>, count: usize, page_size: u32) -> DemoResult<()> {
    let remote = Arc::new(MemoryRemoteStore::new());
    let config = SyncConfig::default()
        .with_page_size(page_size)
        .with_staging_dir(std::env::temp_dir().join("placesync-demo-staging"));

    let publisher = SyncEngine::new(
        config.clone().with_sweep_on_start(false),
        Arc::clone(&remote),
        Arc::new(MemoryLocalStore::new()),
        Arc::new(Immediate),
    );
    for i in 0..count {
        let place = sample_place(i);
        publisher.save(&place, Some(&sample_photo(i)?), |_| {}).await?;
    }
    println!("Published {} places to the in-memory remote", remote.len());

    let (queue, mut receiver) = main_queue();
    let engine = Arc::new(SyncEngine::new(
        config,
        Arc::clone(&remote),
        Arc::clone(&local),
        Arc::new(queue),
    ));

    let store = Arc::clone(&local);
    let mut fetch = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .fetch_all(move |place| {
                    if let Err(e) = store.insert(place) {
                        warn!(error = %e, "failed to store fetched place");
                    }
                })
                .await
        }
    });

    // Callbacks run here, never on a worker.
    let summary = loop {
        tokio::select! {
            result = &mut fetch => break result??,
            _ = receiver.run_next() => {}
        }
    };
    receiver.run_pending();

    println!();
    println!("Sync Summary:");
    println!("  Pages:     {}", summary.pages);
    println!("  Delivered: {}", summary.delivered);
    println!("  Skipped:   {}", summary.skipped_existing);
    println!("  Malformed: {}", summary.malformed);
    println!("  Local:     {} places", local.len()?);

    let places = local.all()?;
    if let Some(first) = places.first() {
        let photo = engine.fetch_asset(first, |_| {}).await;
        receiver.run_pending();
        println!();
        println!(
            "Photo of {}: {}",
            first.name,
            photo.map_or_else(
                || "unavailable".to_string(),
                |bytes| format_size(bytes.len() as u64)
            )
        );
    }

    if let Some(name) = places.last().and_then(|p| engine.cached_reference(&p.place_id)) {
        let outcome = engine.delete(&name).await?;
        println!("Deleted remote record {}: {:?}", name, outcome);
    }

    let stats = engine.stats();
    println!();
    println!("Engine Stats:");
    println!("  Sessions: {}", stats.sessions_completed);
    println!("  Pages:    {}", stats.pages_fetched);
    println!("  Deletes:  {}", stats.deletes);
    println!("  Remote:   {} records", remote.len());

    Ok(())
}

fn sample_place(i: usize) -> Place {
    let base = SAMPLE_NAMES[i % SAMPLE_NAMES.len()];
    let name = if i < SAMPLE_NAMES.len() {
        base.to_string()
    } else {
        format!("{base} {}", i / SAMPLE_NAMES.len() + 1)
    };
    Place::new(
        name,
        Some(format!("{} Ringstrasse, Vienna", i + 1)),
        Some(SAMPLE_TYPES[i % SAMPLE_TYPES.len()].to_string()),
        None,
        (i % 5 + 1) as f64,
    )
}

fn sample_photo(i: usize) -> DemoResult<Vec<u8>> {
    let shade = (i * 37 % 256) as u8;
    let img = RgbImage::from_fn(320, 240, |x, y| {
        Rgb([shade, (x % 256) as u8, (y % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}
