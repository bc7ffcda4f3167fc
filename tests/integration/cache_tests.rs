//! Tile cache integration tests.
//!
//! Tests verify:
//! - Pan and zoom frames load the right tiles at the right level
//! - Concurrent requests for one key share a single load
//! - Eviction honours the timeout, dirty tiles and in-flight loads
//! - Painted tiles survive a flush and reload from the store

use std::time::Duration;

use image::Rgba;

use canvas_tiles::tile::is_blank;
use canvas_tiles::{Layer, TileCache, TileError, TileKey, TileStatus};

use super::test_utils::{solid_tile, view, TrackingStore};

const TIMEOUT: Duration = Duration::from_millis(2000);
const MS: Duration = Duration::from_millis(1);

fn ink() -> Vec<Layer> {
    vec![Layer::new("ink")]
}

// =============================================================================
// Frames
// =============================================================================

#[tokio::test]
async fn test_centered_view_loads_level_zero_ring() {
    let cache = TileCache::new(TrackingStore::new());

    let frame = cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    assert_eq!(frame.level, 0);
    assert_eq!((frame.visible.min_tx, frame.visible.max_tx), (-1, 1));
    assert_eq!((frame.visible.min_ty, frame.visible.max_ty), (-1, 1));

    cache.settle().await;
    for ty in -2..=2 {
        for tx in -2..=2 {
            let key = TileKey::new("ink", 0, tx, ty);
            assert_eq!(cache.status(&key).await, Some(TileStatus::Ready), "{}", key);
        }
    }
    assert_eq!(cache.len().await, 25);
}

#[tokio::test(start_paused = true)]
async fn test_zoom_out_switches_level_and_ages_out_finer_tiles() {
    let cache = TileCache::new(TrackingStore::new());
    let painted = TileKey::new("ink", 0, 0, 0);

    cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    cache.settle().await;
    cache
        .modify(&painted, |p| *p = solid_tile([255, 0, 0, 255]))
        .await
        .unwrap();

    let frame = cache.update(&view(0.0, 0.0, 0.4), &ink()).await.unwrap();
    assert_eq!(frame.level, 1);
    assert_eq!(frame.load.tile_count(), 36);
    cache.settle().await;

    // Level-1 (0,0) is composed from the resident painted child
    let parent = cache.get(&TileKey::new("ink", 1, 0, 0)).await.unwrap();
    assert_eq!(parent.get_pixel(10, 10).0, [255, 0, 0, 255]);
    assert!(is_blank(&cache.get(&TileKey::new("ink", 1, -2, -2)).await.unwrap()));

    // Level-0 tiles are no longer touched and age out
    tokio::time::advance(TIMEOUT + MS).await;
    let frame = cache.update(&view(0.0, 0.0, 0.4), &ink()).await.unwrap();
    assert_eq!(frame.evicted, 25);
    assert!(cache.resident_keys().await.iter().all(|k| k.level == 1));
    assert_eq!(cache.len().await, 36);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_boundary_after_last_touch() {
    let cache = TileCache::new(TrackingStore::new());
    let key = TileKey::new("ink", 0, 0, 0);
    let far = view(1_000_000.0, 0.0, 1.0);

    cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    cache.settle().await;

    tokio::time::advance(TIMEOUT - MS).await;
    cache.update(&far, &ink()).await.unwrap();
    assert!(cache.contains(&key).await);

    tokio::time::advance(MS * 2).await;
    cache.update(&far, &ink()).await.unwrap();
    assert!(!cache.contains(&key).await);
}

#[tokio::test(start_paused = true)]
async fn test_force_load_outside_view_stays_until_timeout() {
    let cache = TileCache::new(TrackingStore::new());
    let remote = TileKey::new("ink", 3, 500, -500);

    cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    let pixels = cache.force_load(&remote).await.unwrap();
    assert!(is_blank(&pixels));

    tokio::time::advance(TIMEOUT - MS).await;
    cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    assert_eq!(cache.status(&remote).await, Some(TileStatus::Ready));

    tokio::time::advance(MS * 2).await;
    cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    assert!(!cache.contains(&remote).await);
}

// =============================================================================
// Single Flight
// =============================================================================

#[tokio::test]
async fn test_rapid_updates_start_one_load_per_key() {
    let (store, gate) = TrackingStore::gated();
    let cache = TileCache::new(store.clone());

    for _ in 0..3 {
        cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    }
    assert_eq!(cache.stats().loads_started, 25);

    gate.open();
    cache.settle().await;

    for key in cache.resident_keys().await {
        assert_eq!(store.reads_of(&key).await, 1, "{}", key);
    }
}

#[tokio::test]
async fn test_concurrent_force_loads_share_one_load() {
    let (store, gate) = TrackingStore::gated();
    let key = TileKey::new("ink", 0, 9, 9);
    store.insert(&key, &solid_tile([1, 2, 3, 255])).await;
    let cache = TileCache::new(store.clone());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let cache = cache.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { cache.force_load(&key).await }));
    }
    tokio::task::yield_now().await;
    gate.open();

    for handle in handles {
        let pixels = handle.await.unwrap().unwrap();
        assert_eq!(pixels.get_pixel(0, 0).0, [1, 2, 3, 255]);
    }
    assert_eq!(store.reads_of(&key).await, 1);
    assert_eq!(cache.stats().loads_started, 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_load_is_retried_after_eviction() {
    let store = TrackingStore::new();
    store.fail_gets(true);
    let cache = TileCache::new(store.clone());
    let key = TileKey::new("ink", 0, 0, 0);

    cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    cache.settle().await;
    assert_eq!(cache.status(&key).await, Some(TileStatus::Error));
    assert!(cache.get(&key).await.is_none());
    assert!(cache.list_visible(&ink()).await.is_empty());

    // Still in view: the error record is touched, not reloaded
    store.fail_gets(false);
    cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    assert_eq!(cache.status(&key).await, Some(TileStatus::Error));

    // Out of view long enough to be evicted, then back
    let far = view(1_000_000.0, 0.0, 1.0);
    tokio::time::advance(TIMEOUT + MS).await;
    cache.update(&far, &ink()).await.unwrap();
    assert!(!cache.contains(&key).await);

    cache.update(&view(0.0, 0.0, 1.0), &ink()).await.unwrap();
    cache.settle().await;
    assert_eq!(cache.status(&key).await, Some(TileStatus::Ready));
}

#[tokio::test]
async fn test_invalid_viewport_is_rejected() {
    let cache = TileCache::new(TrackingStore::new());

    for zoom in [0.0, -2.0, f64::NAN, f64::INFINITY] {
        let result = cache.update(&view(0.0, 0.0, zoom), &ink()).await;
        assert!(matches!(result, Err(TileError::InvalidGeometry { .. })), "zoom {}", zoom);
    }
    assert!(cache.is_empty().await);
}

// =============================================================================
// Layers
// =============================================================================

#[tokio::test]
async fn test_list_visible_reports_world_rects() {
    let cache = TileCache::new(TrackingStore::new());
    let layers = vec![Layer::new("ink"), Layer::hidden("sketch")];

    cache.update(&view(0.0, 0.0, 0.5), &layers).await.unwrap();
    cache.settle().await;

    let tiles = cache.list_visible(&layers).await;
    assert!(!tiles.is_empty());
    for tile in &tiles {
        assert_eq!(&*tile.key.layer, "ink");
        assert_eq!(tile.level, 1);
        assert_eq!(tile.world_size, 512.0);
        assert_eq!(tile.world_x, tile.tx as f64 * 512.0);
        assert_eq!(tile.world_y, tile.ty as f64 * 512.0);
    }
}

#[tokio::test]
async fn test_hiding_a_layer_stops_loads_but_keeps_tiles() {
    let cache = TileCache::new(TrackingStore::new());
    let sketch = TileKey::new("sketch", 0, 0, 0);

    cache
        .update(&view(0.0, 0.0, 1.0), &[Layer::new("sketch")])
        .await
        .unwrap();
    cache.settle().await;

    let frame = cache
        .update(&view(300.0, 0.0, 1.0), &[Layer::hidden("sketch")])
        .await
        .unwrap();
    assert_eq!(frame.loads_started, 0);
    assert_eq!(frame.requested, 0);
    assert!(cache.contains(&sketch).await);
    assert!(!cache.contains(&TileKey::new("sketch", 0, 3, 0)).await);
}

// =============================================================================
// Dirty Tiles
// =============================================================================

#[tokio::test]
async fn test_painted_tile_survives_flush_and_reload() {
    let store = TrackingStore::new();
    let key = TileKey::new("ink", 0, -7, 3);

    {
        let cache = TileCache::new(store.clone());
        cache.force_load(&key).await.unwrap();
        cache
            .modify(&key, |p| p.put_pixel(17, 200, Rgba([12, 34, 56, 255])))
            .await
            .unwrap();
        assert!(cache.mark_dirty(&key).await);

        let report = cache.flush_dirty().await;
        assert_eq!(report.written, vec![key.clone()]);
        assert_eq!(cache.dirty_count().await, 0);
    }

    let fresh = TileCache::new(store.clone());
    let pixels = fresh.force_load(&key).await.unwrap();
    assert_eq!(pixels.get_pixel(17, 200).0, [12, 34, 56, 255]);
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn test_failed_flush_is_retried_and_tile_stays_usable() {
    let store = TrackingStore::new();
    let cache = TileCache::new(store.clone());
    let key = TileKey::new("ink", 0, 0, 0);

    cache.force_load(&key).await.unwrap();
    cache
        .modify(&key, |p| p.put_pixel(0, 0, Rgba([9, 9, 9, 255])))
        .await
        .unwrap();
    cache.mark_dirty(&key).await;

    store.fail_puts(true);
    let report = cache.flush_dirty().await;
    assert_eq!(report.failed.len(), 1);
    assert!(cache.is_dirty(&key).await);

    // Drawing continues against the unsaved tile
    cache
        .modify(&key, |p| p.put_pixel(1, 0, Rgba([9, 9, 9, 255])))
        .await
        .unwrap();

    store.fail_puts(false);
    assert!(cache.flush_dirty().await.is_complete());
    assert!(!cache.is_dirty(&key).await);

    let blob = store.blob(&key).await.unwrap();
    assert_eq!(&blob[4..8], &[9, 9, 9, 255]);
}

#[tokio::test]
async fn test_redirty_during_flush_stays_dirty() {
    let (store, gate) = TrackingStore::write_gated();
    let cache = TileCache::new(store.clone());
    let key = TileKey::new("ink", 0, 0, 0);

    cache.force_load(&key).await.unwrap();
    cache.mark_dirty(&key).await;

    let flush = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.flush_dirty().await })
    };
    while store.put_count() == 0 {
        tokio::task::yield_now().await;
    }

    // Second stroke lands while the first write is in flight
    cache
        .modify(&key, |p| p.put_pixel(2, 2, Rgba([200, 0, 0, 255])))
        .await
        .unwrap();
    assert!(cache.mark_dirty(&key).await);

    gate.open();
    let report = flush.await.unwrap();
    assert_eq!(report.written, vec![key.clone()]);
    assert!(cache.is_dirty(&key).await);

    assert!(cache.flush_dirty().await.is_complete());
    assert!(!cache.is_dirty(&key).await);
    let stored = store.blob(&key).await.unwrap();
    let offset = (2 * 256 + 2) * 4;
    assert_eq!(&stored[offset..offset + 4], &[200, 0, 0, 255]);
}

#[tokio::test(start_paused = true)]
async fn test_unsaved_tile_is_not_evicted() {
    let store = TrackingStore::new();
    store.fail_puts(true);
    let cache = TileCache::new(store.clone());
    let key = TileKey::new("ink", 0, 0, 0);

    cache.force_load(&key).await.unwrap();
    cache.mark_dirty(&key).await;
    assert!(!cache.flush_dirty().await.is_complete());

    tokio::time::advance(TIMEOUT * 5).await;
    cache.update(&view(1_000_000.0, 0.0, 1.0), &ink()).await.unwrap();
    assert!(cache.contains(&key).await);

    store.fail_puts(false);
    assert!(cache.flush_dirty().await.is_complete());
    cache.update(&view(1_000_000.0, 0.0, 1.0), &ink()).await.unwrap();
    assert!(!cache.contains(&key).await);
}
