//! Tile layer.
//!
//! This module holds everything between the viewport and the store: key
//! math, viewport geometry, pixel buffers, pyramid composition and the cache
//! that owns resident tiles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Renderer / paint tools           │
//! └────────────────────┬────────────────────┘
//!                      │ update / force_load / modify
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileCache                 │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │   keying     │  │ PyramidBuilder  │  │
//! │  │ (which tiles │  │ (coarse tiles   │  │
//! │  │  for a view) │  │  from children) │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ get / put / delete
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            PersistentStore              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileKey`]: Tile identity (layer, level, tx, ty) and its storage key codec
//! - [`required_tiles`]: Level selection and tile rectangles for a viewport
//! - [`TileCache`]: Resident tiles, background loads, eviction and flushing
//! - [`PyramidBuilder`]: Composes level-L tiles from level-(L-1) children
//! - [`decode_blob`] / [`encode_blob`]: Raw RGBA store blobs

mod cache;
mod key;
mod keying;
mod pixels;
mod pyramid;

pub use cache::{
    CacheStats, FlushReport, FrameSummary, TileCache, TileStatus, VisibleTile,
};
pub use key::{
    tile_world_size, TileKey, BYTES_PER_PIXEL, MAX_SUPPORTED_LEVEL, TILE_BYTES, TILE_SIZE,
};
pub use keying::{
    level_for_zoom, required_tiles, tile_world_rect, world_to_tile, Layer, TileRect,
    TileRequirement, Viewport, MAX_ZOOM, MIN_ZOOM,
};
pub use pixels::{
    blank_tile, decode_blob, encode_blob, encode_png, initial_content, is_blank, TilePixels,
};
pub use pyramid::{downsample_half, ChildSource, PyramidBuilder};
