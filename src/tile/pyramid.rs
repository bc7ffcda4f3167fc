//! LOD pyramid builder.
//!
//! A level-L tile with nothing stored is synthesized from its four level-(L-1)
//! children. Each child is halved and placed in its quadrant:
//!
//! ```text
//!  level L (256x256)           level L-1 children (256x256 each)
//! ┌─────────┬─────────┐
//! │ (2x,2y) │(2x+1,2y)│        every child is box-filtered to 128x128
//! ├─────────┼─────────┤        and copied to its quadrant origin
//! │(2x,2y+1)│(2x+1,   │
//! │         │  2y+1)  │
//! └─────────┴─────────┘
//! ```
//!
//! Children come from the cache first, then the store. A child missing from
//! both is itself composed from its own children, up to a depth limit; past
//! the limit, or at level 0 with nothing stored, the quadrant stays empty.
//! A tile whose whole subtree is empty composes to a blank tile, not an error.
//!
//! The builder keeps nothing between builds. An empty region at depth `d`
//! costs `4 + 4^2 + ... + 4^d` child reads every time it is composed.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use image::{imageops, RgbaImage};
use tracing::debug;

use crate::error::{StoreError, TileError};

use super::key::{TileKey, TILE_SIZE};
use super::pixels::{blank_tile, decode_blob, initial_content, TilePixels};

type ComposeFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<RgbaImage>, TileError>> + Send + 'a>>;

/// Where the builder finds child tiles.
#[async_trait]
pub trait ChildSource: Send + Sync {
    /// Pixels of `key` if it is resident and Ready.
    async fn resident(&self, key: &TileKey) -> Option<TilePixels>;

    /// Blob stored for `key`, if any.
    async fn stored(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError>;
}

/// A child's contribution to its parent.
enum Child {
    Resident(TilePixels),
    Owned(RgbaImage),
}

impl Child {
    fn image(&self) -> &RgbaImage {
        match self {
            Child::Resident(pixels) => pixels,
            Child::Owned(image) => image,
        }
    }
}

/// Composes coarse tiles from their finer children.
#[derive(Debug, Clone)]
pub struct PyramidBuilder {
    /// Levels of missing intermediates to recurse through
    max_depth: u32,

    /// Layer whose level-0 tiles have procedural content
    base_layer: Option<String>,
}

impl PyramidBuilder {
    /// Create a builder.
    pub fn new(max_depth: u32, base_layer: Option<String>) -> Self {
        Self {
            max_depth: max_depth.max(1),
            base_layer,
        }
    }

    /// Produce the content of `key` (level > 0) from its children.
    ///
    /// # Errors
    ///
    /// Returns an error if a child read from the store fails or a stored child
    /// is corrupt. Missing children are not errors.
    pub async fn build<C>(&self, source: &C, key: &TileKey) -> Result<RgbaImage, TileError>
    where
        C: ChildSource + ?Sized,
    {
        let composed = self.compose(source, key, self.max_depth).await?;
        debug!(
            "Composed {} from children ({})",
            key,
            if composed.is_some() { "content" } else { "empty" }
        );
        Ok(composed.unwrap_or_else(blank_tile))
    }

    /// Compose `key`, returning `None` when every quadrant is empty.
    fn compose<'a, C>(&'a self, source: &'a C, key: &'a TileKey, depth: u32) -> ComposeFuture<'a>
    where
        C: ChildSource + ?Sized,
    {
        Box::pin(async move {
            let Some([tl, tr, bl, br]) = key.children() else {
                return Ok(None);
            };

            let (tl, tr, bl, br) = tokio::join!(
                self.child(source, &tl, depth),
                self.child(source, &tr, depth),
                self.child(source, &bl, depth),
                self.child(source, &br, depth),
            );
            let children = [tl?, tr?, bl?, br?];

            if children.iter().all(Option::is_none) {
                return Ok(None);
            }

            let half = TILE_SIZE / 2;
            let mut parent = blank_tile();
            for (index, child) in children.iter().enumerate() {
                let Some(child) = child else {
                    continue;
                };
                let scaled = downsample_half(child.image());
                let (qx, qy) = ((index % 2) as u32, (index / 2) as u32);
                imageops::replace(&mut parent, &scaled, (qx * half) as i64, (qy * half) as i64);
            }

            Ok(Some(parent))
        })
    }

    /// Resolve one child: cache, then store, then initializer or recursion.
    async fn child<C>(&self, source: &C, key: &TileKey, depth: u32) -> Result<Option<Child>, TileError>
    where
        C: ChildSource + ?Sized,
    {
        if let Some(pixels) = source.resident(key).await {
            return Ok(Some(Child::Resident(pixels)));
        }

        let stored = source
            .stored(key)
            .await
            .map_err(|e| TileError::LoadFailure {
                key: key.storage_key(),
                reason: e.to_string(),
            })?;
        if let Some(blob) = stored {
            return Ok(Some(Child::Owned(decode_blob(key, &blob)?)));
        }

        if key.level == 0 {
            return Ok(initial_content(key, self.base_layer.as_deref()).map(Child::Owned));
        }

        if depth > 1 {
            return Ok(self.compose(source, key, depth - 1).await?.map(Child::Owned));
        }

        Ok(None)
    }
}

/// Halve a tile with a 2x2 alpha-weighted box filter.
///
/// Colour is averaged weighted by alpha so transparent pixels do not darken
/// the edges of strokes.
pub fn downsample_half(src: &RgbaImage) -> RgbaImage {
    let (w, h) = (src.width() / 2, src.height() / 2);
    RgbaImage::from_fn(w, h, |x, y| {
        let mut rgb = [0u32; 3];
        let mut alpha = 0u32;
        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let px = src.get_pixel(2 * x + dx, 2 * y + dy).0;
            let a = px[3] as u32;
            for c in 0..3 {
                rgb[c] += px[c] as u32 * a;
            }
            alpha += a;
        }
        if alpha == 0 {
            return image::Rgba([0, 0, 0, 0]);
        }
        image::Rgba([
            ((rgb[0] + alpha / 2) / alpha) as u8,
            ((rgb[1] + alpha / 2) / alpha) as u8,
            ((rgb[2] + alpha / 2) / alpha) as u8,
            ((alpha + 2) / 4) as u8,
        ])
    })
}

// =============================================================================
// Tests
// =============================================================================
