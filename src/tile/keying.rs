//! Viewport geometry: which tiles, at which level, a view needs.
//!
//! Everything here is pure. The cache calls [`required_tiles`] once per
//! frame and works with the returned [`TileRect`]s.

use serde::{Deserialize, Serialize};

use crate::error::TileError;

use super::key::{tile_world_size, TileKey, MAX_SUPPORTED_LEVEL};

/// Smallest zoom any level can serve (deep zoom-out at the deepest level).
///
/// A cache configured with a lower `max_level` needs a larger floor, see
/// [`CacheConfig::min_zoom`](crate::config::CacheConfig::min_zoom).
pub const MIN_ZOOM: f64 = 1.0 / (1u64 << MAX_SUPPORTED_LEVEL) as f64;

/// Largest zoom callers should pass (deep zoom-in).
pub const MAX_ZOOM: f64 = 256.0;

// =============================================================================
// Viewport
// =============================================================================

/// The part of the world currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// World-space center X
    pub x: f64,

    /// World-space center Y
    pub y: f64,

    /// Screen pixels per world unit (> 0)
    pub zoom: f64,

    /// Screen width in pixels
    pub width: u32,

    /// Screen height in pixels
    pub height: u32,
}

impl Viewport {
    /// Create a new viewport.
    pub fn new(x: f64, y: f64, zoom: f64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            zoom,
            width,
            height,
        }
    }

    /// Copy of this viewport with zoom clamped into `[min_zoom, max_zoom]`.
    pub fn clamped(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        if self.zoom.is_nan() {
            self.zoom = 1.0;
        }
        self.zoom = self.zoom.clamp(min_zoom, max_zoom);
        self
    }

    /// Reject geometry the tile math cannot handle.
    pub fn validate(&self) -> Result<(), TileError> {
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(TileError::InvalidGeometry {
                reason: format!("zoom must be a positive finite number, got {}", self.zoom),
            });
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(TileError::InvalidGeometry {
                reason: format!("center must be finite, got ({}, {})", self.x, self.y),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(TileError::InvalidGeometry {
                reason: format!("viewport is degenerate: {}x{}", self.width, self.height),
            });
        }
        Ok(())
    }

    /// Visible world rectangle as `(min_x, min_y, max_x, max_y)`.
    pub fn world_bounds(&self) -> (f64, f64, f64, f64) {
        let half_w = self.width as f64 / (2.0 * self.zoom);
        let half_h = self.height as f64 / (2.0 * self.zoom);
        (
            self.x - half_w,
            self.y - half_h,
            self.x + half_w,
            self.y + half_h,
        )
    }
}

/// A layer as the cache sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Layer identifier (first field of every tile key)
    pub id: String,

    /// Hidden layers keep resident tiles alive but start no new loads
    pub visible: bool,
}

impl Layer {
    /// A visible layer.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visible: true,
        }
    }

    /// A hidden layer.
    pub fn hidden(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visible: false,
        }
    }
}

// =============================================================================
// Tile Rect
// =============================================================================

/// Inclusive rectangle of tile indices at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub level: u32,
    pub min_tx: i32,
    pub min_ty: i32,
    pub max_tx: i32,
    pub max_ty: i32,
}

impl TileRect {
    /// Grow the rectangle by `rings` tiles on every side.
    pub fn expand(&self, rings: u32) -> Self {
        let rings = rings.min(i32::MAX as u32) as i32;
        Self {
            level: self.level,
            min_tx: self.min_tx.saturating_sub(rings),
            min_ty: self.min_ty.saturating_sub(rings),
            max_tx: self.max_tx.saturating_add(rings),
            max_ty: self.max_ty.saturating_add(rings),
        }
    }

    /// Whether `(tx, ty)` lies inside the rectangle.
    pub fn contains(&self, tx: i32, ty: i32) -> bool {
        tx >= self.min_tx && tx <= self.max_tx && ty >= self.min_ty && ty <= self.max_ty
    }

    /// Number of tiles in the rectangle, saturating at `usize::MAX`.
    pub fn tile_count(&self) -> usize {
        let w = (self.max_tx as i64 - self.min_tx as i64 + 1).max(0) as u64;
        let h = (self.max_ty as i64 - self.min_ty as i64 + 1).max(0) as u64;
        usize::try_from(w.saturating_mul(h)).unwrap_or(usize::MAX)
    }

    /// Keys of every tile in the rectangle for `layer`, row-major.
    ///
    /// Allocates one key per tile; check [`tile_count`](Self::tile_count)
    /// first for rectangles that come from untrusted geometry.
    pub fn keys(&self, layer: &str) -> Vec<TileKey> {
        let layer: std::sync::Arc<str> = layer.into();
        let mut keys = Vec::with_capacity(self.tile_count());
        for ty in self.min_ty..=self.max_ty {
            for tx in self.min_tx..=self.max_tx {
                keys.push(TileKey::new(layer.clone(), self.level, tx, ty));
            }
        }
        keys
    }
}

/// Tile rectangles required for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRequirement {
    /// Level of detail for this zoom
    pub level: u32,

    /// Tiles that intersect the screen
    pub visible: TileRect,

    /// Visible tiles plus the buffer ring
    pub load: TileRect,
}

// =============================================================================
// Geometry
// =============================================================================

/// Level of detail for a zoom factor: `max(0, floor(log2(1 / zoom)))`.
///
/// Uses floor, never round, so a static zoom always maps to the same level.
pub fn level_for_zoom(zoom: f64) -> u32 {
    let raw = (1.0 / zoom).log2().floor();
    if raw.is_nan() || raw <= 0.0 {
        0
    } else {
        (raw as u32).min(MAX_SUPPORTED_LEVEL)
    }
}

/// Index of the tile containing world point `(x, y)` at `level`.
pub fn world_to_tile(x: f64, y: f64, level: u32) -> (i32, i32) {
    let size = tile_world_size(level);
    ((x / size).floor() as i32, (y / size).floor() as i32)
}

/// World rectangle `(x, y, size)` covered by `key`.
pub fn tile_world_rect(key: &TileKey) -> (f64, f64, f64) {
    let (x, y) = key.world_origin();
    (x, y, key.world_size())
}

/// Tiles required to draw `viewport`, with the level capped at `max_level`.
pub fn required_tiles(viewport: &Viewport, buffer_rings: u32, max_level: u32) -> TileRequirement {
    let level = level_for_zoom(viewport.zoom).min(max_level);
    let (min_x, min_y, max_x, max_y) = viewport.world_bounds();
    let (min_tx, min_ty) = world_to_tile(min_x, min_y, level);
    let (max_tx, max_ty) = world_to_tile(max_x, max_y, level);

    let visible = TileRect {
        level,
        min_tx,
        min_ty,
        max_tx,
        max_ty,
    };

    TileRequirement {
        level,
        visible,
        load: visible.expand(buffer_rings),
    }
}

// =============================================================================
// Tests
// =============================================================================
