//! canvas-tiles - drive and inspect a sparse LOD tile store.
//!
//! `simulate` replays a scripted pan/zoom/paint session through the cache,
//! `inspect` summarizes what a store holds, `export` writes one tile as PNG.

use clap::Parser;
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canvas_tiles::{
    config::{Cli, Command, ExportConfig, InspectConfig, OutputFormat, SimulateConfig, StoreArgs},
    create_s3_client,
    tile::{decode_blob, encode_png, world_to_tile, MAX_ZOOM},
    FileStore, Layer, PersistentStore, S3Store, TileCache, TileKey, Viewport,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Simulate(config) => run_simulate(config).await,
        Command::Inspect(config) => run_inspect(config).await,
        Command::Export(config) => run_export(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "canvas_tiles=debug"
    } else {
        "canvas_tiles=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open the store selected on the command line.
async fn open_store(args: &StoreArgs) -> Result<Arc<dyn PersistentStore>, String> {
    args.validate()?;

    if let Some(ref bucket) = args.s3_bucket {
        let client = create_s3_client(args.s3_endpoint.as_deref(), &args.s3_region).await;
        return Ok(Arc::new(S3Store::new(
            client,
            bucket.clone(),
            args.s3_prefix.clone(),
        )));
    }

    match args.store_dir {
        Some(ref dir) => FileStore::open(dir)
            .await
            .map(|store| Arc::new(store) as Arc<dyn PersistentStore>)
            .map_err(|e| format!("Failed to open store at {}: {}", dir.display(), e)),
        None => Err("No store selected".to_string()),
    }
}

// =============================================================================
// Simulate Command
// =============================================================================

/// Radius of a simulated brush dab in world units.
const DAB_RADIUS: i64 = 6;

/// Paint a dab on every frame divisible by this.
const DAB_EVERY: u32 = 4;

async fn run_simulate(config: SimulateConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = match open_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache = match TileCache::with_config(store, config.cache.to_cache_config()) {
        Ok(cache) => cache,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Simulating {} frames", config.frames);
    info!("  Store: {}", cache.store().describe());
    info!("  Layers: {}", config.layers.join(", "));
    info!(
        "  Eviction timeout: {}ms, buffer rings: {}",
        cache.config().eviction_timeout.as_millis(),
        cache.config().buffer_rings
    );

    let layers: Vec<Layer> = config.layers.iter().map(Layer::new).collect();
    let min_zoom = cache.config().min_zoom();
    let frame_interval = Duration::from_millis(config.frame_ms);
    let mut interval = tokio::time::interval(frame_interval);
    let mut dabs = 0usize;
    let mut peak_resident = 0usize;

    for frame in 0..config.frames {
        interval.tick().await;

        let viewport = scripted_viewport(frame, config.frames, config.width, config.height, min_zoom);
        let summary = match cache.update(&viewport, &layers).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Frame {} skipped: {}", frame, e);
                continue;
            }
        };
        peak_resident = peak_resident.max(cache.len().await);

        if summary.loads_started > 0 || summary.evicted > 0 {
            info!(
                "Frame {}: level {}, {} load(s) started, {} evicted",
                frame, summary.level, summary.loads_started, summary.evicted
            );
        }

        if frame % DAB_EVERY == 0 {
            match paint_dab(&cache, &config.paint_layer, viewport.x, viewport.y).await {
                Ok(touched) => dabs += usize::from(touched > 0),
                Err(e) if e.is_storage_fault() => {
                    warn!("Paint skipped at frame {}: {}", frame, e)
                }
                Err(e) => {
                    error!("Paint failed at frame {}: {}", frame, e);
                    return ExitCode::FAILURE;
                }
            }
        }

        if (frame + 1) % config.flush_every == 0 {
            let report = cache.flush_dirty().await;
            if !report.is_complete() {
                warn!("{} tile(s) failed to persist", report.failed.len());
            }
        }
    }

    cache.settle().await;
    let report = cache.flush_dirty().await;
    for (key, e) in &report.failed {
        error!("Tile {} was not persisted: {}", key, e);
    }

    let summary = serde_json::json!({
        "frames": config.frames,
        "dabs": dabs,
        "resident": cache.len().await,
        "peak_resident": peak_resident,
        "dirty": cache.dirty_count().await,
        "stats": cache.stats(),
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to render summary: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Viewport for `frame`: a slow pan to the right with a zoom-out and back
/// in the middle third. Zoom never drops below `min_zoom`.
fn scripted_viewport(frame: u32, frames: u32, width: u32, height: u32, min_zoom: f64) -> Viewport {
    let t = frame as f64 / frames.max(1) as f64;
    let zoom = if (1.0 / 3.0..2.0 / 3.0).contains(&t) {
        // 1.0 -> 0.25 -> 1.0 across the middle third
        let phase = (t - 1.0 / 3.0) * 3.0;
        1.0 - 0.75 * (1.0 - (2.0 * phase - 1.0).abs())
    } else {
        1.0
    };
    Viewport::new(frame as f64 * 24.0, (t * 6.0).sin() * 200.0, zoom, width, height)
        .clamped(min_zoom, MAX_ZOOM)
}

/// Paint a round dab centred on world `(x, y)` into every level-0 tile it
/// touches. Returns the number of tiles modified.
async fn paint_dab<S: PersistentStore + 'static>(
    cache: &TileCache<S>,
    layer: &str,
    x: f64,
    y: f64,
) -> Result<usize, canvas_tiles::TileError> {
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    let r = DAB_RADIUS as f64;
    let (min_tx, min_ty) = world_to_tile(x - r, y - r, 0);
    let (max_tx, max_ty) = world_to_tile(x + r, y + r, 0);

    let mut touched = 0;
    for ty in min_ty..=max_ty {
        for tx in min_tx..=max_tx {
            let key = TileKey::new(layer, 0, tx, ty);
            cache.force_load(&key).await?;

            let (ox, oy) = key.world_origin();
            let (ox, oy) = (ox as i64, oy as i64);
            cache
                .modify(&key, |pixels| {
                    for py in cy - DAB_RADIUS..=cy + DAB_RADIUS {
                        for px in cx - DAB_RADIUS..=cx + DAB_RADIUS {
                            let (dx, dy) = (px - cx, py - cy);
                            if dx * dx + dy * dy > DAB_RADIUS * DAB_RADIUS {
                                continue;
                            }
                            let (lx, ly) = (px - ox, py - oy);
                            if (0..pixels.width() as i64).contains(&lx)
                                && (0..pixels.height() as i64).contains(&ly)
                            {
                                pixels.put_pixel(lx as u32, ly as u32, image::Rgba([20, 24, 32, 255]));
                            }
                        }
                    }
                })
                .await?;

            cache.mark_dirty(&key).await;
            touched += 1;
        }
    }
    Ok(touched)
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    let store = match open_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let keys = match store.list_keys().await {
        Ok(keys) => keys,
        Err(e) => {
            error!("Failed to list {}: {}", store.describe(), e);
            return ExitCode::FAILURE;
        }
    };

    // layer -> level -> tile count
    let mut counts: BTreeMap<String, BTreeMap<u32, usize>> = BTreeMap::new();
    let mut invalid = Vec::new();
    for raw in &keys {
        match TileKey::from_storage_key(raw) {
            Ok(key) => {
                *counts
                    .entry(key.layer.to_string())
                    .or_default()
                    .entry(key.level)
                    .or_default() += 1;
            }
            Err(e) => {
                warn!("{}", e);
                invalid.push(raw.clone());
            }
        }
    }

    match config.format {
        OutputFormat::Text => {
            println!("Store: {}", store.describe());
            println!("═════════════════════════════════");
            if counts.is_empty() {
                println!("  (no tiles)");
            }
            for (layer, levels) in &counts {
                println!("{}", layer);
                for (level, count) in levels {
                    println!("  level {:>2}: {} tile(s)", level, count);
                }
            }
            println!();
            println!("Total: {} tile(s), {} invalid key(s)", keys.len() - invalid.len(), invalid.len());
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "store": store.describe(),
                "layers": counts,
                "total": keys.len() - invalid.len(),
                "invalid": invalid,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    error!("Failed to render output: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Export Command
// =============================================================================

async fn run_export(config: ExportConfig) -> ExitCode {
    match export_tile(&config).await {
        Ok(()) => {
            info!("Wrote {} to {}", config.key, config.output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn export_tile(config: &ExportConfig) -> Result<(), String> {
    let store = open_store(&config.store).await?;
    let key = TileKey::from_storage_key(&config.key).map_err(|e| e.to_string())?;

    // Legacy keys are stored under their original name
    let mut names = vec![config.key.clone()];
    if key.storage_key() != config.key {
        names.push(key.storage_key());
    }

    let mut blob = None;
    for name in &names {
        blob = store
            .get(name)
            .await
            .map_err(|e| format!("Failed to read {}: {}", name, e))?;
        if blob.is_some() {
            break;
        }
    }
    let blob = blob.ok_or_else(|| format!("Tile {} is not in {}", key, store.describe()))?;

    let image = decode_blob(&key, &blob).map_err(|e| e.to_string())?;
    let png = encode_png(&image).map_err(|e| e.to_string())?;

    tokio::fs::write(&config.output, &png)
        .await
        .map_err(|e| format!("Failed to write {}: {}", config.output.display(), e))
}
