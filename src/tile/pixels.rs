//! Tile pixel buffers.
//!
//! Tile content is a fixed-size RGBA8 image ([`TILE_SIZE`] squared). This
//! module converts between buffers and store blobs, produces the
//! deterministic level-0 initial content, and encodes PNG for export.
//!
//! # Design Decisions
//!
//! - **Raw blobs**: the store holds the raw `TILE_SIZE * TILE_SIZE * 4` bytes,
//!   no compression. A blob of any other length is corrupt.
//!
//! - **Shared buffers**: resident pixels live behind `Arc` so the renderer can
//!   hold a frame's worth of handles while painting copies on write.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgba, RgbaImage};

use crate::error::TileError;

use super::key::{TileKey, TILE_BYTES, TILE_SIZE};

/// Read-only handle to a resident tile's pixels.
pub type TilePixels = Arc<RgbaImage>;

/// Spacing of the base-layer paper grid in world units.
const PAPER_GRID: i64 = 32;

const PAPER: Rgba<u8> = Rgba([250, 249, 245, 255]);
const PAPER_LINE: Rgba<u8> = Rgba([226, 228, 235, 255]);

/// A fully transparent tile.
pub fn blank_tile() -> RgbaImage {
    RgbaImage::new(TILE_SIZE, TILE_SIZE)
}

/// Whether every pixel of `image` is fully transparent.
pub fn is_blank(image: &RgbaImage) -> bool {
    image.as_raw().chunks_exact(4).all(|px| px[3] == 0)
}

/// Convert a stored blob into a tile buffer.
///
/// # Errors
///
/// Returns [`TileError::Decode`] if the blob is not exactly [`TILE_BYTES`] long.
pub fn decode_blob(key: &TileKey, blob: &[u8]) -> Result<RgbaImage, TileError> {
    if blob.len() != TILE_BYTES {
        return Err(TileError::Decode {
            key: key.storage_key(),
            expected: TILE_BYTES,
            actual: blob.len(),
        });
    }
    RgbaImage::from_raw(TILE_SIZE, TILE_SIZE, blob.to_vec()).ok_or_else(|| TileError::Decode {
        key: key.storage_key(),
        expected: TILE_BYTES,
        actual: blob.len(),
    })
}

/// Convert a tile buffer into a store blob.
pub fn encode_blob(image: &RgbaImage) -> Bytes {
    Bytes::copy_from_slice(image.as_raw())
}

/// Initial content of a level-0 tile that has nothing stored.
///
/// Returns `None` for a transparent tile. Tiles of `base_layer` get a paper
/// grid aligned to world coordinates, so neighbouring tiles line up.
pub fn initial_content(key: &TileKey, base_layer: Option<&str>) -> Option<RgbaImage> {
    if key.level != 0 || base_layer != Some(&*key.layer) {
        return None;
    }

    let origin_x = key.tx as i64 * TILE_SIZE as i64;
    let origin_y = key.ty as i64 * TILE_SIZE as i64;

    Some(RgbaImage::from_fn(TILE_SIZE, TILE_SIZE, |x, y| {
        let wx = origin_x + x as i64;
        let wy = origin_y + y as i64;
        if wx.rem_euclid(PAPER_GRID) == 0 || wy.rem_euclid(PAPER_GRID) == 0 {
            PAPER_LINE
        } else {
            PAPER
        }
    }))
}

/// Encode a tile as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Bytes, TileError> {
    let mut output = Cursor::new(Vec::new());
    PngEncoder::new(&mut output)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| TileError::Encode {
            message: e.to_string(),
        })?;
    Ok(Bytes::from(output.into_inner()))
}

// =============================================================================
// Tests
// =============================================================================
