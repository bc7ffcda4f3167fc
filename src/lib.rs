//! # Canvas Tiles
//!
//! A sparse, level-of-detail tile cache for infinite-canvas drawing apps.
//!
//! The canvas is split into fixed 256x256 RGBA tiles, addressed per layer and
//! per level of detail. Only tiles around the current view are kept in
//! memory; everything else lives in a pluggable persistent store. Coarse
//! levels are synthesized on demand from the level below, so zooming out
//! never needs tiles that were not painted.
//!
//! ## Features
//!
//! - **Sparse**: tiles exist only where something was drawn or looked at
//! - **Level of detail**: zoom selects a level, coarse tiles are composed from finer ones
//! - **Non-blocking frames**: loads run in background tasks, a frame never waits on I/O
//! - **Time-based eviction**: tiles idle past a timeout are dropped, dirty tiles are kept
//! - **Pluggable storage**: in-memory, local directory or S3-compatible object storage
//!
//! ## Architecture
//!
//! - [`tile`] - Keys, viewport geometry, pyramid composition and the cache
//! - [`store`] - Persistent store trait and backends
//! - [`config`] - Cache configuration and CLI types
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use canvas_tiles::{FileStore, Layer, TileCache, Viewport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = FileStore::open("/tmp/canvas").await.unwrap();
//!     let cache = TileCache::new(store);
//!     let layers = vec![Layer::new("paper"), Layer::new("ink")];
//!
//!     let viewport = Viewport::new(0.0, 0.0, 1.0, 1280, 720);
//!     cache.update(&viewport, &layers).await.unwrap();
//!
//!     for tile in cache.list_visible(&layers).await {
//!         println!("draw {} at ({}, {})", tile.key, tile.world_x, tile.world_y);
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{CacheConfig, Cli, Command, ExportConfig, InspectConfig, OutputFormat, SimulateConfig};
pub use error::{KeyError, StoreError, TileError};
pub use store::{create_s3_client, FileStore, MemoryStore, PersistentStore, S3Store};
pub use tile::{
    level_for_zoom, required_tiles, CacheStats, FlushReport, FrameSummary, Layer, PyramidBuilder,
    TileCache, TileKey, TilePixels, TileRect, TileStatus, Viewport, VisibleTile, TILE_SIZE,
};
