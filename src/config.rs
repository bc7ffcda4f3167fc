//! Configuration for the tile cache and the `canvas-tiles` binary.
//!
//! [`CacheConfig`] is the library-side configuration handed to
//! [`TileCache`](crate::tile::TileCache). The CLI types wrap it with clap so
//! every knob can come from a flag or an environment variable.
//!
//! # Environment Variables
//!
//! - `CANVAS_STORE_DIR` - Directory for the file store
//! - `CANVAS_S3_BUCKET` - S3 bucket (selects the S3 store)
//! - `CANVAS_S3_PREFIX` - Key prefix inside the bucket
//! - `CANVAS_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `CANVAS_S3_REGION` - AWS region (default: us-east-1)
//! - `CANVAS_EVICTION_TIMEOUT_MS` - Idle time before a tile is evicted (default: 2000)
//! - `CANVAS_BUFFER_RINGS` - Extra tile rings loaded around the view (default: 1)
//! - `CANVAS_MAX_LEVEL` - Coarsest level of detail (default: 12)
//! - `CANVAS_MAX_TILES_PER_FRAME` - Largest per-layer load rectangle `update` accepts (default: 4096)
//! - `CANVAS_BASE_LAYER` - Layer that gets a paper pattern at level 0
//! - `CANVAS_REFRESH_ANCESTORS` - Recompose resident ancestors after a flush

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::TileError;
use crate::tile::MAX_SUPPORTED_LEVEL;

// =============================================================================
// Default Values
// =============================================================================

/// Default idle time before a resident tile is evicted.
pub const DEFAULT_EVICTION_TIMEOUT_MS: u64 = 2000;

/// Default number of tile rings loaded beyond the visible rectangle.
pub const DEFAULT_BUFFER_RINGS: u32 = 1;

/// Default coarsest level of detail.
pub const DEFAULT_MAX_LEVEL: u32 = 12;

/// Default number of missing levels a pyramid build recurses through.
///
/// Composed tiles are not kept once their record is evicted, so a coarse
/// tile over an empty region is rebuilt from scratch on every re-zoom. That
/// costs up to `4 + 4^2 + ... + 4^depth` child reads (5460 at depth 6), and
/// level-0 misses also try the legacy key. Lower this for high-latency
/// stores such as S3.
pub const DEFAULT_MAX_COMPOSE_DEPTH: u32 = 6;

/// Default cap on the tiles one layer may need in a single frame.
pub const DEFAULT_MAX_TILES_PER_FRAME: usize = 4096;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

// =============================================================================
// Cache Configuration
// =============================================================================

/// Tunables of a [`TileCache`](crate::tile::TileCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Idle time after which a resident tile is evicted
    #[serde(with = "millis")]
    pub eviction_timeout: Duration,

    /// Tile rings loaded around the visible rectangle
    pub buffer_rings: u32,

    /// Coarsest level of detail the cache will request
    pub max_level: u32,

    /// Per-layer load rectangles larger than this are rejected by `update`
    pub max_tiles_per_frame: usize,

    /// How many levels of missing intermediate tiles a pyramid build
    /// recurses through before treating a quadrant as empty
    pub max_compose_depth: u32,

    /// Layer whose level-0 tiles start with a paper pattern instead of
    /// transparent pixels
    pub base_layer: Option<String>,

    /// Recompose resident ancestors of flushed tiles and drop stale
    /// persisted ancestors
    pub refresh_ancestors: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction_timeout: Duration::from_millis(DEFAULT_EVICTION_TIMEOUT_MS),
            buffer_rings: DEFAULT_BUFFER_RINGS,
            max_level: DEFAULT_MAX_LEVEL,
            max_tiles_per_frame: DEFAULT_MAX_TILES_PER_FRAME,
            max_compose_depth: DEFAULT_MAX_COMPOSE_DEPTH,
            base_layer: None,
            refresh_ancestors: false,
        }
    }
}

impl CacheConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), TileError> {
        if self.eviction_timeout.is_zero() {
            return Err(TileError::InvalidConfig {
                reason: "eviction_timeout must be greater than 0".to_string(),
            });
        }
        if self.max_level > MAX_SUPPORTED_LEVEL {
            return Err(TileError::InvalidConfig {
                reason: format!("max_level must be at most {}", MAX_SUPPORTED_LEVEL),
            });
        }
        if self.max_compose_depth == 0 {
            return Err(TileError::InvalidConfig {
                reason: "max_compose_depth must be greater than 0".to_string(),
            });
        }
        if self.buffer_rings > 16 {
            return Err(TileError::InvalidConfig {
                reason: "buffer_rings must be at most 16".to_string(),
            });
        }
        if self.max_tiles_per_frame == 0 {
            return Err(TileError::InvalidConfig {
                reason: "max_tiles_per_frame must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Smallest zoom worth requesting with this configuration.
    ///
    /// Below this the level is pinned at `max_level` while the visible world
    /// keeps growing, so the tile count grows without bound.
    pub fn min_zoom(&self) -> f64 {
        let level = self.max_level.min(MAX_SUPPORTED_LEVEL) as i32;
        2f64.powi(-(level + 1))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// canvas-tiles - drive and inspect a sparse LOD tile store.
#[derive(Parser, Debug, Clone)]
#[command(name = "canvas-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Replay a scripted pan/zoom/paint session against a store.
    Simulate(SimulateConfig),

    /// List the tiles held by a store.
    Inspect(InspectConfig),

    /// Write one stored tile as a PNG file.
    Export(ExportConfig),
}

/// Where tiles are persisted.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Directory of the file store.
    #[arg(long, env = "CANVAS_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// S3 bucket holding tiles. Takes precedence over --store-dir.
    #[arg(long, env = "CANVAS_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix inside the bucket.
    #[arg(long, env = "CANVAS_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "CANVAS_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "CANVAS_S3_REGION")]
    pub s3_region: String,
}

impl StoreArgs {
    /// Validate that exactly one usable backend is selected.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.s3_bucket, &self.store_dir) {
            (Some(bucket), _) if bucket.is_empty() => {
                Err("S3 bucket name must not be empty".to_string())
            }
            (None, None) => Err(
                "No store selected. Set --store-dir (CANVAS_STORE_DIR) or --s3-bucket (CANVAS_S3_BUCKET)"
                    .to_string(),
            ),
            _ => Ok(()),
        }
    }
}

/// Cache tunables exposed on the command line.
#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Idle time in milliseconds before a tile is evicted.
    #[arg(long, default_value_t = DEFAULT_EVICTION_TIMEOUT_MS, env = "CANVAS_EVICTION_TIMEOUT_MS")]
    pub eviction_timeout_ms: u64,

    /// Tile rings loaded around the visible rectangle.
    #[arg(long, default_value_t = DEFAULT_BUFFER_RINGS, env = "CANVAS_BUFFER_RINGS")]
    pub buffer_rings: u32,

    /// Coarsest level of detail.
    #[arg(long, default_value_t = DEFAULT_MAX_LEVEL, env = "CANVAS_MAX_LEVEL")]
    pub max_level: u32,

    /// Largest per-layer load rectangle, in tiles, a frame may request.
    #[arg(long, default_value_t = DEFAULT_MAX_TILES_PER_FRAME, env = "CANVAS_MAX_TILES_PER_FRAME")]
    pub max_tiles_per_frame: usize,

    /// Layer whose level-0 tiles start with a paper pattern.
    #[arg(long, env = "CANVAS_BASE_LAYER")]
    pub base_layer: Option<String>,

    /// Recompose resident ancestors after each flush.
    #[arg(long, default_value_t = false, env = "CANVAS_REFRESH_ANCESTORS")]
    pub refresh_ancestors: bool,
}

impl CacheArgs {
    /// Build the library configuration.
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            eviction_timeout: Duration::from_millis(self.eviction_timeout_ms),
            buffer_rings: self.buffer_rings,
            max_level: self.max_level,
            max_tiles_per_frame: self.max_tiles_per_frame,
            base_layer: self.base_layer.clone(),
            refresh_ancestors: self.refresh_ancestors,
            ..CacheConfig::default()
        }
    }
}

/// Arguments of `simulate`.
#[derive(Args, Debug, Clone)]
pub struct SimulateConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub cache: CacheArgs,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 240)]
    pub frames: u32,

    /// Simulated frame interval in milliseconds.
    #[arg(long, default_value_t = 16)]
    pub frame_ms: u64,

    /// Flush dirty tiles every N frames.
    #[arg(long, default_value_t = 60)]
    pub flush_every: u32,

    /// Screen width in pixels.
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Screen height in pixels.
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Layers to draw, bottom first.
    #[arg(long, value_delimiter = ',', default_value = "paper,ink")]
    pub layers: Vec<String>,

    /// Layer the simulated brush paints into.
    #[arg(long, default_value = "ink")]
    pub paint_layer: String,
}

impl SimulateConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        self.cache
            .to_cache_config()
            .validate()
            .map_err(|e| e.to_string())?;

        if self.frames == 0 {
            return Err("frames must be greater than 0".to_string());
        }
        if self.flush_every == 0 {
            return Err("flush_every must be greater than 0".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("at least one layer is required".to_string());
        }
        if !self.layers.contains(&self.paint_layer) {
            return Err(format!(
                "paint layer '{}' is not in --layers",
                self.paint_layer
            ));
        }
        Ok(())
    }
}

/// Output format for `inspect`.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Arguments of `inspect`.
#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Arguments of `export`.
#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Storage key of the tile (layer:level:tx:ty, or legacy layer:tx:ty).
    pub key: String,

    /// Output PNG path.
    #[arg(short, long)]
    pub output: PathBuf,
}

// =============================================================================
// Tests
// =============================================================================
