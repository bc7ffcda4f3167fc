//! LOD pyramid integration tests.
//!
//! Tests verify:
//! - Coarse tiles compose from stored and resident children
//! - Composition recurses through missing intermediate levels
//! - Generated coarse tiles stay in memory and are never persisted
//! - Ancestor refresh after a flush replaces stale coarse content

use canvas_tiles::tile::is_blank;
use canvas_tiles::{CacheConfig, TileCache, TileKey, TileStatus, TILE_SIZE};

use super::test_utils::{solid_tile, TrackingStore};

#[tokio::test]
async fn test_level_one_with_no_children_is_blank_ready() {
    let store = TrackingStore::new();
    let cache = TileCache::new(store.clone());
    let key = TileKey::new("ink", 1, 4, -2);

    let pixels = cache.force_load(&key).await.unwrap();
    assert!(is_blank(&pixels));
    assert_eq!(cache.status(&key).await, Some(TileStatus::Ready));

    for child in key.children().unwrap() {
        assert_eq!(store.reads_of(&child).await, 1, "{}", child);
    }
}

#[tokio::test]
async fn test_stored_children_fill_their_quadrants() {
    let parent = TileKey::new("ink", 1, 0, 0);
    let [tl, tr, bl, br] = parent.children().unwrap();
    let store = TrackingStore::new()
        .with_tile(&tl, &solid_tile([255, 0, 0, 255]))
        .await
        .with_tile(&tr, &solid_tile([0, 255, 0, 255]))
        .await
        .with_tile(&bl, &solid_tile([0, 0, 255, 255]))
        .await
        .with_tile(&br, &solid_tile([255, 255, 255, 255]))
        .await;

    let cache = TileCache::new(store);
    let pixels = cache.force_load(&parent).await.unwrap();

    let (lo, hi) = (10, TILE_SIZE / 2 + 10);
    assert_eq!(pixels.get_pixel(lo, lo).0, [255, 0, 0, 255]);
    assert_eq!(pixels.get_pixel(hi, lo).0, [0, 255, 0, 255]);
    assert_eq!(pixels.get_pixel(lo, hi).0, [0, 0, 255, 255]);
    assert_eq!(pixels.get_pixel(hi, hi).0, [255, 255, 255, 255]);
}

#[tokio::test]
async fn test_negative_tiles_compose_into_negative_parent() {
    // Level-0 (-1,-1) is the bottom-right child of level-1 (-1,-1)
    let child = TileKey::new("ink", 0, -1, -1);
    assert_eq!(child.parent(), TileKey::new("ink", 1, -1, -1));

    let store = TrackingStore::new()
        .with_tile(&child, &solid_tile([40, 50, 60, 255]))
        .await;
    let cache = TileCache::new(store);

    let pixels = cache.force_load(&TileKey::new("ink", 1, -1, -1)).await.unwrap();
    assert_eq!(pixels.get_pixel(TILE_SIZE - 1, TILE_SIZE - 1).0, [40, 50, 60, 255]);
    assert_eq!(pixels.get_pixel(0, 0).0, [0, 0, 0, 0]);
}

#[tokio::test]
async fn test_composition_recurses_through_missing_levels() {
    let store = TrackingStore::new()
        .with_tile(&TileKey::new("ink", 0, 0, 0), &solid_tile([5, 5, 5, 255]))
        .await;
    let cache = TileCache::new(store);

    // Level 3 covers 8x8 level-0 tiles, so (0,0) lands in the top-left 32x32
    let pixels = cache.force_load(&TileKey::new("ink", 3, 0, 0)).await.unwrap();
    assert_eq!(pixels.get_pixel(0, 0).0, [5, 5, 5, 255]);
    assert_eq!(pixels.get_pixel(31, 31).0, [5, 5, 5, 255]);
    assert_eq!(pixels.get_pixel(32, 32).0, [0, 0, 0, 0]);
}

#[tokio::test]
async fn test_depth_limit_stops_recursion() {
    let store = TrackingStore::new()
        .with_tile(&TileKey::new("ink", 0, 0, 0), &solid_tile([5, 5, 5, 255]))
        .await;
    let config = CacheConfig {
        max_compose_depth: 1,
        ..CacheConfig::default()
    };
    let cache = TileCache::with_config(store, config).unwrap();

    let pixels = cache.force_load(&TileKey::new("ink", 3, 0, 0)).await.unwrap();
    assert!(is_blank(&pixels));
}

#[tokio::test]
async fn test_generated_tiles_are_not_persisted() {
    let store = TrackingStore::new()
        .with_tile(&TileKey::new("ink", 0, 1, 1), &solid_tile([1, 1, 1, 255]))
        .await;
    let cache = TileCache::new(store.clone());
    let parent = TileKey::new("ink", 1, 0, 0);

    cache.force_load(&parent).await.unwrap();
    assert!(cache.flush_dirty().await.is_complete());

    assert_eq!(store.put_count(), 0);
    assert!(store.blob(&parent).await.is_none());
    assert_eq!(cache.dirty_count().await, 0);
}

#[tokio::test]
async fn test_base_layer_pattern_survives_zoom_out() {
    let config = CacheConfig {
        base_layer: Some("paper".to_string()),
        ..CacheConfig::default()
    };
    let cache = TileCache::with_config(TrackingStore::new(), config).unwrap();

    let coarse = cache.force_load(&TileKey::new("paper", 2, 0, 0)).await.unwrap();
    assert!(coarse.pixels().all(|p| p.0[3] == 255));

    let ink = cache.force_load(&TileKey::new("ink", 2, 0, 0)).await.unwrap();
    assert!(is_blank(&ink));
}

#[tokio::test]
async fn test_ancestor_refresh_after_flush() {
    let config = CacheConfig {
        refresh_ancestors: true,
        max_level: 3,
        ..CacheConfig::default()
    };
    let store = TrackingStore::new();
    let cache = TileCache::with_config(store.clone(), config).unwrap();

    let child = TileKey::new("ink", 0, 0, 0);
    let parent = TileKey::new("ink", 1, 0, 0);
    let stale = TileKey::new("ink", 3, 0, 0);
    store.insert(&stale, &solid_tile([1, 2, 3, 255])).await;

    let before = cache.force_load(&parent).await.unwrap();
    assert!(is_blank(&before));

    cache.force_load(&child).await.unwrap();
    cache
        .modify(&child, |p| *p = solid_tile([90, 0, 90, 255]))
        .await
        .unwrap();
    cache.mark_dirty(&child).await;
    assert!(cache.flush_dirty().await.is_complete());

    // The old handle is untouched, the cache now serves the recomposed tile
    assert!(is_blank(&before));
    let after = cache.get(&parent).await.unwrap();
    assert_eq!(after.get_pixel(0, 0).0, [90, 0, 90, 255]);

    assert!(store.blob(&stale).await.is_none());
    assert_eq!(cache.stats().ancestor_refreshes, 1);
}

#[tokio::test]
async fn test_ancestor_refresh_is_off_by_default() {
    let store = TrackingStore::new();
    let cache = TileCache::new(store.clone());
    let child = TileKey::new("ink", 0, 0, 0);
    let parent = TileKey::new("ink", 1, 0, 0);

    cache.force_load(&parent).await.unwrap();
    cache.force_load(&child).await.unwrap();
    cache
        .modify(&child, |p| *p = solid_tile([90, 0, 90, 255]))
        .await
        .unwrap();
    cache.mark_dirty(&child).await;
    cache.flush_dirty().await;

    assert!(is_blank(&cache.get(&parent).await.unwrap()));
    assert_eq!(cache.stats().ancestor_refreshes, 0);
}
