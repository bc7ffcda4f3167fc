//! Tile identity and the storage key codec.
//!
//! A [`TileKey`] names one square tile of one layer at one level of detail.
//! Inside the crate keys are always the 4-tuple `(layer, level, tx, ty)`.
//! The string form is only used at the storage boundary:
//!
//! ```text
//! {layer}:{level}:{tx}:{ty}     canonical
//! {layer}:{tx}:{ty}             legacy, implicitly level 0
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::KeyError;

/// Edge length of a tile in pixels. Every tile, at every level, has this size.
pub const TILE_SIZE: u32 = 256;

/// Bytes per pixel (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// Exact size of a tile blob in bytes.
pub const TILE_BYTES: usize = (TILE_SIZE as usize) * (TILE_SIZE as usize) * BYTES_PER_PIXEL;

/// Highest level the geometry supports; `TILE_SIZE * 2^level` must stay exact in f64.
pub const MAX_SUPPORTED_LEVEL: u32 = 24;

// =============================================================================
// Tile Key
// =============================================================================

/// Identifies one tile.
///
/// Equal keys always denote the same logical tile content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Layer identifier
    pub layer: Arc<str>,

    /// Level of detail (0 = native resolution)
    pub level: u32,

    /// Tile column within the level grid
    pub tx: i32,

    /// Tile row within the level grid
    pub ty: i32,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(layer: impl Into<Arc<str>>, level: u32, tx: i32, ty: i32) -> Self {
        Self {
            layer: layer.into(),
            level,
            tx,
            ty,
        }
    }

    /// World-space edge length covered by tiles at this key's level.
    pub fn world_size(&self) -> f64 {
        tile_world_size(self.level)
    }

    /// World-space origin (top-left corner) of this tile.
    pub fn world_origin(&self) -> (f64, f64) {
        let size = self.world_size();
        (self.tx as f64 * size, self.ty as f64 * size)
    }

    /// The four level-(L-1) tiles covering this tile, in quadrant order
    /// top-left, top-right, bottom-left, bottom-right.
    ///
    /// Returns `None` for level 0 tiles, which have no finer level.
    pub fn children(&self) -> Option<[TileKey; 4]> {
        if self.level == 0 {
            return None;
        }
        let level = self.level - 1;
        let (x, y) = (self.tx.wrapping_mul(2), self.ty.wrapping_mul(2));
        Some([
            TileKey::new(self.layer.clone(), level, x, y),
            TileKey::new(self.layer.clone(), level, x.wrapping_add(1), y),
            TileKey::new(self.layer.clone(), level, x, y.wrapping_add(1)),
            TileKey::new(self.layer.clone(), level, x.wrapping_add(1), y.wrapping_add(1)),
        ])
    }

    /// The level-(L+1) tile whose quadrant contains this tile.
    pub fn parent(&self) -> TileKey {
        TileKey::new(
            self.layer.clone(),
            self.level + 1,
            self.tx.div_euclid(2),
            self.ty.div_euclid(2),
        )
    }

    /// Quadrant this tile occupies inside its parent, as `(qx, qy)` in `{0, 1}`.
    pub fn quadrant(&self) -> (u32, u32) {
        (self.tx.rem_euclid(2) as u32, self.ty.rem_euclid(2) as u32)
    }

    /// Ancestors from the parent up to and including `max_level`.
    pub fn ancestors(&self, max_level: u32) -> Vec<TileKey> {
        let mut out = Vec::new();
        let mut current = self.clone();
        while current.level < max_level {
            current = current.parent();
            out.push(current.clone());
        }
        out
    }

    /// Canonical 4-field storage key.
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}:{}", self.layer, self.level, self.tx, self.ty)
    }

    /// Legacy 3-field storage key, which only existed for level 0.
    pub fn legacy_storage_key(&self) -> Option<String> {
        (self.level == 0).then(|| format!("{}:{}:{}", self.layer, self.tx, self.ty))
    }

    /// Parse a storage key, accepting the legacy 3-field format.
    ///
    /// Fields are split from the right so layer ids may contain `:`. The
    /// 4-field reading wins whenever its level field is an unsigned integer.
    pub fn from_storage_key(raw: &str) -> Result<Self, KeyError> {
        let parts: Vec<&str> = raw.rsplitn(4, ':').collect();

        if parts.len() == 4 {
            if let Ok(level) = parts[2].parse::<u32>() {
                return Self::from_fields(raw, parts[3], level, parts[1], parts[0]);
            }
        }

        // Legacy layer:tx:ty
        let legacy: Vec<&str> = raw.rsplitn(3, ':').collect();
        if legacy.len() != 3 {
            return Err(KeyError::Malformed {
                key: raw.to_string(),
            });
        }
        Self::from_fields(raw, legacy[2], 0, legacy[1], legacy[0])
    }

    fn from_fields(raw: &str, layer: &str, level: u32, tx: &str, ty: &str) -> Result<Self, KeyError> {
        if layer.is_empty() {
            return Err(KeyError::EmptyLayer {
                key: raw.to_string(),
            });
        }
        let tx = tx.parse::<i32>().map_err(|_| KeyError::InvalidField {
            key: raw.to_string(),
            field: "tx",
        })?;
        let ty = ty.parse::<i32>().map_err(|_| KeyError::InvalidField {
            key: raw.to_string(),
            field: "ty",
        })?;
        Ok(Self::new(layer, level, tx, ty))
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.layer, self.level, self.tx, self.ty)
    }
}

/// World-space edge length of a tile at `level`.
#[inline]
pub fn tile_world_size(level: u32) -> f64 {
    TILE_SIZE as f64 * (1u64 << level.min(MAX_SUPPORTED_LEVEL)) as f64
}

// =============================================================================
// Tests
// =============================================================================
