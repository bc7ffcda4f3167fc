//! Sparse tile cache.
//!
//! This module owns every resident tile and drives its lifecycle:
//!
//! ```text
//!            update / force_load
//!   (absent) ───────────────────▶ Loading ──┬──▶ Ready ──┐
//!       ▲                                   └──▶ Error ──┤
//!       └──────────── idle > timeout (not dirty) ─────────┘
//! ```
//!
//! # Loads
//!
//! A missing key is reserved as `Loading` under the table's write lock and
//! a task is spawned to resolve it (store, then level-0 initializer or
//! pyramid build). The `Loading` record carries the in-flight state, so a
//! second request for the same key joins the running load instead of
//! starting another one.
//!
//! # Eviction
//!
//! Records live in an LRU ordered by last use. Every `update` walks it from
//! the least recently used end and drops records idle longer than the
//! eviction timeout. `Loading` records are never evicted (their task is still
//! going to write into them) and neither are dirty ones (their pixels are not
//! yet durable).
//!
//! # Persistence
//!
//! `mark_dirty` records a version per key. `flush_dirty` writes each dirty
//! tile and clears the key only if its version did not change while the
//! write was in flight. Failed writes stay dirty for the next flush.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::RgbaImage;
use lru::LruCache;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{StoreError, TileError};
use crate::store::PersistentStore;

use super::key::TileKey;
use super::keying::{required_tiles, Layer, TileRect, Viewport};
use super::pixels::{blank_tile, decode_blob, encode_blob, initial_content, TilePixels};
use super::pyramid::{ChildSource, PyramidBuilder};

// =============================================================================
// Public Types
// =============================================================================

/// Externally visible status of a resident tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TileStatus {
    Loading,
    Ready,
    Error,
}

/// A Ready tile of a visible layer, as handed to the renderer.
#[derive(Debug, Clone)]
pub struct VisibleTile {
    pub key: TileKey,

    /// Read-only pixels; keep only for the current frame
    pub pixels: TilePixels,

    pub tx: i32,
    pub ty: i32,
    pub level: u32,

    /// World-space origin and edge length of the tile
    pub world_x: f64,
    pub world_y: f64,
    pub world_size: f64,
}

/// What one `update` call did.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub level: u32,
    pub visible: TileRect,
    pub load: TileRect,

    /// Keys required across visible layers
    pub requested: usize,

    /// Loads started by this call
    pub loads_started: usize,

    /// Records removed by this call's eviction pass
    pub evicted: usize,
}

/// Outcome of a `flush_dirty` call.
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    /// Keys durably written and no longer dirty
    pub written: Vec<TileKey>,

    /// Keys that stay dirty, with the reason
    pub failed: Vec<(TileKey, TileError)>,
}

impl FlushReport {
    /// Whether every dirty tile was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub loads_started: u64,
    pub loads_completed: u64,
    pub load_failures: u64,
    pub pyramid_builds: u64,
    pub evictions: u64,
    pub flush_writes: u64,
    pub flush_failures: u64,
    pub ancestor_refreshes: u64,
}

// =============================================================================
// Internal State
// =============================================================================

/// Shared state of one in-flight load.
struct InFlight {
    /// Distinguishes this load from a later one for the same key
    id: u64,
    /// Notification for waiters
    notify: Notify,
    /// Result of the load (set when complete)
    result: Mutex<Option<Result<TilePixels, TileError>>>,
}

impl InFlight {
    fn new(id: u64) -> Self {
        Self {
            id,
            notify: Notify::new(),
            result: Mutex::new(None),
        }
    }

    async fn wait(&self) -> Result<TilePixels, TileError> {
        loop {
            // Register before checking so a completion in between is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.result.lock().await.as_ref() {
                return result.clone();
            }
            notified.await;
        }
    }
}

enum RecordState {
    Loading(Arc<InFlight>),
    Ready(TilePixels),
    Error(TileError),
}

struct TileRecord {
    state: RecordState,
    last_used: Instant,
}

impl TileRecord {
    fn status(&self) -> TileStatus {
        match self.state {
            RecordState::Loading(_) => TileStatus::Loading,
            RecordState::Ready(_) => TileStatus::Ready,
            RecordState::Error(_) => TileStatus::Error,
        }
    }

    fn pixels(&self) -> Option<&TilePixels> {
        match &self.state {
            RecordState::Ready(pixels) => Some(pixels),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Counters {
    loads_started: AtomicU64,
    loads_completed: AtomicU64,
    load_failures: AtomicU64,
    pyramid_builds: AtomicU64,
    evictions: AtomicU64,
    flush_writes: AtomicU64,
    flush_failures: AtomicU64,
    ancestor_refreshes: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_completed: self.loads_completed.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            pyramid_builds: self.pyramid_builds.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flush_writes: self.flush_writes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            ancestor_refreshes: self.ancestor_refreshes.load(Ordering::Relaxed),
        }
    }
}

/// Lock order: `records` before `dirty`. Never acquire `records` while
/// holding `dirty`.
struct Shared<S> {
    store: S,
    config: CacheConfig,
    builder: PyramidBuilder,

    /// Resident tiles, least recently used at the back
    records: RwLock<LruCache<TileKey, TileRecord>>,

    /// Dirty keys with the version of their latest mutation
    dirty: Mutex<HashMap<TileKey, u64>>,

    dirty_seq: AtomicU64,
    next_load_id: AtomicU64,
    counters: Counters,
}

impl<S: PersistentStore + 'static> Shared<S> {
    /// Insert a `Loading` record for `key`. Caller holds the write lock and
    /// has checked that the key is absent.
    fn reserve(&self, records: &mut LruCache<TileKey, TileRecord>, key: TileKey) -> Arc<InFlight> {
        let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
        let in_flight = Arc::new(InFlight::new(id));
        records.put(
            key,
            TileRecord {
                state: RecordState::Loading(in_flight.clone()),
                last_used: Instant::now(),
            },
        );
        in_flight
    }

    fn spawn_load(self: &Arc<Self>, key: TileKey, in_flight: Arc<InFlight>) {
        Counters::bump(&self.counters.loads_started, 1);
        debug!("Loading tile {}", key);

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared.resolve(&key).await;
            shared.complete(&key, &in_flight, result).await;
        });
    }

    /// Blob stored for `key`, falling back to the legacy 3-field name.
    async fn read_stored(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        if let Some(blob) = self.store.get(&key.storage_key()).await? {
            return Ok(Some(blob));
        }
        match key.legacy_storage_key() {
            Some(legacy) => self.store.get(&legacy).await,
            None => Ok(None),
        }
    }

    /// Produce the content of `key`: store, then initializer or pyramid build.
    async fn resolve(&self, key: &TileKey) -> Result<RgbaImage, TileError> {
        let stored = self
            .read_stored(key)
            .await
            .map_err(|e| TileError::LoadFailure {
                key: key.storage_key(),
                reason: e.to_string(),
            })?;

        if let Some(blob) = stored {
            return decode_blob(key, &blob);
        }

        if key.level == 0 {
            return Ok(initial_content(key, self.config.base_layer.as_deref())
                .unwrap_or_else(blank_tile));
        }

        Counters::bump(&self.counters.pyramid_builds, 1);
        self.builder.build(self, key).await
    }

    /// Apply a finished load to its record and wake waiters.
    async fn complete(
        &self,
        key: &TileKey,
        in_flight: &InFlight,
        result: Result<RgbaImage, TileError>,
    ) {
        let result = result.map(Arc::new);

        {
            let mut records = self.records.write().await;
            match records.get_mut(key) {
                Some(record)
                    if matches!(&record.state, RecordState::Loading(f) if f.id == in_flight.id) =>
                {
                    record.state = match &result {
                        Ok(pixels) => RecordState::Ready(pixels.clone()),
                        Err(e) => RecordState::Error(e.clone()),
                    };
                    record.last_used = Instant::now();
                }
                _ => debug!("Discarding load result for {}: record was replaced", key),
            }
        }

        match &result {
            Ok(_) => {
                Counters::bump(&self.counters.loads_completed, 1);
                debug!("Tile {} ready", key);
            }
            Err(e) => {
                Counters::bump(&self.counters.load_failures, 1);
                warn!("Tile {} failed to load: {}", key, e);
            }
        }

        *in_flight.result.lock().await = Some(result);
        in_flight.notify.notify_waiters();
    }
}

#[async_trait]
impl<S: PersistentStore + 'static> ChildSource for Shared<S> {
    async fn resident(&self, key: &TileKey) -> Option<TilePixels> {
        let records = self.records.read().await;
        records.peek(key).and_then(|r| r.pixels().cloned())
    }

    async fn stored(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        self.read_stored(key).await
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Sparse LOD tile cache over a [`PersistentStore`].
///
/// Cloning is cheap and yields a handle to the same cache.
///
/// # Example
///
/// ```
/// use canvas_tiles::{Layer, MemoryStore, TileCache, TileKey, Viewport};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = TileCache::new(MemoryStore::new());
///     let layers = vec![Layer::new("ink")];
///
///     // Once per frame
///     let frame = cache.update(&Viewport::new(0.0, 0.0, 1.0, 512, 512), &layers).await.unwrap();
///     assert_eq!(frame.level, 0);
///
///     // Painting needs the tile resident, wherever the view is
///     let key = TileKey::new("ink", 0, 40, -3);
///     cache.force_load(&key).await.unwrap();
///     cache.modify(&key, |pixels| pixels.put_pixel(0, 0, image::Rgba([0, 0, 0, 255]))).await.unwrap();
///     cache.mark_dirty(&key).await;
///
///     let report = cache.flush_dirty().await;
///     assert!(report.is_complete());
/// }
/// ```
pub struct TileCache<S: PersistentStore> {
    shared: Arc<Shared<S>>,
}

impl<S: PersistentStore> Clone for TileCache<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: PersistentStore + 'static> TileCache<S> {
    /// Create a cache with the default configuration.
    pub fn new(store: S) -> Self {
        Self::build(store, CacheConfig::default())
    }

    /// Create a cache with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::InvalidConfig`] if the configuration is rejected.
    pub fn with_config(store: S, config: CacheConfig) -> Result<Self, TileError> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    fn build(store: S, config: CacheConfig) -> Self {
        let builder = PyramidBuilder::new(config.max_compose_depth, config.base_layer.clone());
        Self {
            shared: Arc::new(Shared {
                store,
                config,
                builder,
                records: RwLock::new(LruCache::unbounded()),
                dirty: Mutex::new(HashMap::new()),
                dirty_seq: AtomicU64::new(0),
                next_load_id: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.shared.store
    }

    /// Per-frame entry point.
    ///
    /// For every layer, computes the tiles the viewport needs (visible plus
    /// buffer ring). Resident tiles are touched; missing tiles of visible
    /// layers get a `Loading` record and a background load. Hidden layers
    /// only keep their resident tiles alive. Finishes with an eviction pass.
    ///
    /// Never waits on I/O; loads complete in the background.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::InvalidGeometry`] for a non-positive zoom, a
    /// degenerate viewport, or a view that needs more than
    /// `max_tiles_per_frame` tiles per layer (a zoom far below
    /// [`CacheConfig::min_zoom`]). Nothing is touched in that case.
    pub async fn update(
        &self,
        viewport: &Viewport,
        layers: &[Layer],
    ) -> Result<FrameSummary, TileError> {
        viewport.validate()?;

        let config = &self.shared.config;
        let required = required_tiles(viewport, config.buffer_rings, config.max_level);
        let tile_count = required.load.tile_count();
        if tile_count > config.max_tiles_per_frame {
            return Err(TileError::InvalidGeometry {
                reason: format!(
                    "zoom {} needs {} tiles per layer at level {}, limit is {}",
                    viewport.zoom, tile_count, required.level, config.max_tiles_per_frame
                ),
            });
        }

        let mut requested = 0;
        let mut to_load = Vec::new();
        {
            let mut records = self.shared.records.write().await;
            let now = Instant::now();

            for layer in layers {
                let keys = required.load.keys(&layer.id);
                if layer.visible {
                    requested += keys.len();
                }

                for key in keys {
                    if let Some(record) = records.get_mut(&key) {
                        record.last_used = now;
                        continue;
                    }
                    if layer.visible {
                        let in_flight = self.shared.reserve(&mut records, key.clone());
                        to_load.push((key, in_flight));
                    }
                }
            }
        }

        let loads_started = to_load.len();
        for (key, in_flight) in to_load {
            self.shared.spawn_load(key, in_flight);
        }

        let evicted = self.evict_expired().await;

        Ok(FrameSummary {
            level: required.level,
            visible: required.visible,
            load: required.load,
            requested,
            loads_started,
            evicted,
        })
    }

    /// Make `key` resident and wait for it to resolve.
    ///
    /// Joins a running load if there is one. Works for any key, including
    /// ones far outside the current view or at another level. The load runs
    /// in its own task, so dropping this future does not cancel it.
    ///
    /// # Errors
    ///
    /// Returns the load error if the tile is (or becomes) `Error`. An `Error`
    /// record is not touched here, so repeated calls let it age out and be
    /// retried on a later request.
    pub async fn force_load(&self, key: &TileKey) -> Result<TilePixels, TileError> {
        let (in_flight, started) = {
            let mut records = self.shared.records.write().await;
            if let Some(RecordState::Error(e)) = records.peek(key).map(|r| &r.state) {
                return Err(e.clone());
            }
            match records.get_mut(key) {
                Some(record) => {
                    record.last_used = Instant::now();
                    match &record.state {
                        RecordState::Ready(pixels) => return Ok(pixels.clone()),
                        RecordState::Error(e) => return Err(e.clone()),
                        RecordState::Loading(in_flight) => (in_flight.clone(), false),
                    }
                }
                None => (self.shared.reserve(&mut records, key.clone()), true),
            }
        };

        if started {
            self.shared.spawn_load(key.clone(), in_flight.clone());
        }
        in_flight.wait().await
    }

    /// Pixels of `key` if it is resident and Ready. Never starts a load.
    pub async fn get(&self, key: &TileKey) -> Option<TilePixels> {
        let records = self.shared.records.read().await;
        records.peek(key).and_then(|r| r.pixels().cloned())
    }

    /// Status of `key`, or `None` if it is not resident.
    pub async fn status(&self, key: &TileKey) -> Option<TileStatus> {
        let records = self.shared.records.read().await;
        records.peek(key).map(TileRecord::status)
    }

    /// Mutate the pixels of a Ready tile.
    ///
    /// Render handles taken earlier keep seeing the old pixels. Call
    /// [`mark_dirty`](Self::mark_dirty) afterwards to have the change persisted.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::NotReady`] if the tile is absent, loading or failed.
    pub async fn modify<F, R>(&self, key: &TileKey, f: F) -> Result<R, TileError>
    where
        F: FnOnce(&mut RgbaImage) -> R,
    {
        let mut records = self.shared.records.write().await;
        let not_ready = || TileError::NotReady {
            key: key.storage_key(),
        };

        let record = records.get_mut(key).ok_or_else(not_ready)?;
        record.last_used = Instant::now();
        match &mut record.state {
            RecordState::Ready(pixels) => Ok(f(Arc::make_mut(pixels))),
            _ => Err(not_ready()),
        }
    }

    /// Record that `key`'s pixels changed and must be persisted.
    ///
    /// Returns `false` (and records nothing) if the tile is not resident and
    /// Ready, since there is nothing to persist.
    pub async fn mark_dirty(&self, key: &TileKey) -> bool {
        let mut records = self.shared.records.write().await;
        match records.get_mut(key) {
            Some(record) if record.pixels().is_some() => record.last_used = Instant::now(),
            _ => {
                debug!("Ignoring mark_dirty for {}: tile is not ready", key);
                return false;
            }
        }

        let version = self.shared.dirty_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.dirty.lock().await.insert(key.clone(), version);
        true
    }

    /// Ready tiles of visible layers, in no particular order.
    pub async fn list_visible(&self, layers: &[Layer]) -> Vec<VisibleTile> {
        let visible: HashSet<&str> = layers
            .iter()
            .filter(|l| l.visible)
            .map(|l| l.id.as_str())
            .collect();

        let records = self.shared.records.read().await;
        records
            .iter()
            .filter(|(key, _)| visible.contains(&*key.layer))
            .filter_map(|(key, record)| {
                let pixels = record.pixels()?.clone();
                let (world_x, world_y) = key.world_origin();
                Some(VisibleTile {
                    key: key.clone(),
                    pixels,
                    tx: key.tx,
                    ty: key.ty,
                    level: key.level,
                    world_x,
                    world_y,
                    world_size: key.world_size(),
                })
            })
            .collect()
    }

    /// Persist every dirty tile.
    ///
    /// A key leaves the dirty set only after its write succeeded and only if
    /// it was not dirtied again meanwhile. Failures are reported and retried
    /// on the next flush; the in-memory tile stays usable either way.
    pub async fn flush_dirty(&self) -> FlushReport {
        let mut pending: Vec<(TileKey, u64)> = {
            let dirty = self.shared.dirty.lock().await;
            dirty.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };
        pending.sort();

        let mut report = FlushReport::default();

        for (key, version) in pending {
            let pixels = self.get(&key).await;
            let Some(pixels) = pixels else {
                warn!("Dirty tile {} is not ready, keeping it dirty", key);
                report.failed.push((
                    key.clone(),
                    TileError::NotReady {
                        key: key.storage_key(),
                    },
                ));
                continue;
            };

            let blob = encode_blob(&pixels);
            match self.shared.store.put(&key.storage_key(), blob).await {
                Ok(()) => {
                    let mut dirty = self.shared.dirty.lock().await;
                    if dirty.get(&key) == Some(&version) {
                        dirty.remove(&key);
                    }
                    Counters::bump(&self.shared.counters.flush_writes, 1);
                    report.written.push(key);
                }
                Err(e) => {
                    Counters::bump(&self.shared.counters.flush_failures, 1);
                    warn!("Failed to persist tile {}: {}", key, e);
                    report.failed.push((
                        key.clone(),
                        TileError::FlushFailure {
                            key: key.storage_key(),
                            source: e,
                        },
                    ));
                }
            }
        }

        if self.shared.config.refresh_ancestors && !report.written.is_empty() {
            self.refresh_ancestors(&report.written).await;
        }

        debug!(
            "Flushed {} tile(s), {} failed",
            report.written.len(),
            report.failed.len()
        );
        report
    }

    /// Recompose resident ancestors of `changed` and drop their stale blobs.
    ///
    /// Each ancestor is composed first and swapped in afterwards, so the
    /// renderer never sees it disappear. Ancestors with unsaved edits of
    /// their own are left alone.
    async fn refresh_ancestors(&self, changed: &[TileKey]) {
        let max_level = self.shared.config.max_level;
        // Ordered by layer then level, so children refresh before parents
        let ancestors: BTreeSet<TileKey> = changed
            .iter()
            .flat_map(|key| key.ancestors(max_level))
            .collect();

        for ancestor in ancestors {
            if self.shared.dirty.lock().await.contains_key(&ancestor) {
                continue;
            }

            if let Err(e) = self.shared.store.delete(&ancestor.storage_key()).await {
                warn!("Failed to drop stale ancestor {}: {}", ancestor, e);
            }

            if self.get(&ancestor).await.is_none() {
                continue;
            }

            let composed = match self.shared.builder.build(&*self.shared, &ancestor).await {
                Ok(image) => Arc::new(image),
                Err(e) => {
                    warn!("Failed to recompose ancestor {}: {}", ancestor, e);
                    continue;
                }
            };

            let mut records = self.shared.records.write().await;
            let dirty = self.shared.dirty.lock().await;
            if dirty.contains_key(&ancestor) {
                continue;
            }
            if let Some(record) = records.peek_mut(&ancestor) {
                if let RecordState::Ready(pixels) = &mut record.state {
                    *pixels = composed;
                    Counters::bump(&self.shared.counters.ancestor_refreshes, 1);
                }
            }
        }
    }

    /// Drop records idle for longer than the eviction timeout.
    ///
    /// `Loading` and dirty records are skipped. Returns the number evicted.
    pub async fn evict_expired(&self) -> usize {
        let timeout = self.shared.config.eviction_timeout;

        let mut records = self.shared.records.write().await;
        let dirty = self.shared.dirty.lock().await;
        let now = Instant::now();

        let mut expired = Vec::new();
        for (key, record) in records.iter().rev() {
            if now.saturating_duration_since(record.last_used) <= timeout {
                // Everything further on was used more recently
                break;
            }
            if matches!(record.state, RecordState::Loading(_)) || dirty.contains_key(key) {
                continue;
            }
            expired.push(key.clone());
        }

        for key in &expired {
            records.pop(key);
        }
        drop(dirty);
        drop(records);

        if !expired.is_empty() {
            Counters::bump(&self.shared.counters.evictions, expired.len() as u64);
            debug!("Evicted {} idle tile(s)", expired.len());
        }
        expired.len()
    }

    /// Wait until no load is in flight.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<Arc<InFlight>> = {
                let records = self.shared.records.read().await;
                records
                    .iter()
                    .filter_map(|(_, record)| match &record.state {
                        RecordState::Loading(in_flight) => Some(in_flight.clone()),
                        _ => None,
                    })
                    .collect()
            };
            if pending.is_empty() {
                return;
            }
            for in_flight in pending {
                let _ = in_flight.wait().await;
            }
        }
    }

    /// Number of resident records (any status).
    pub async fn len(&self) -> usize {
        self.shared.records.read().await.len()
    }

    /// Check if no tile is resident.
    pub async fn is_empty(&self) -> bool {
        self.shared.records.read().await.is_empty()
    }

    /// Whether `key` has a resident record (any status).
    pub async fn contains(&self, key: &TileKey) -> bool {
        self.shared.records.read().await.contains(key)
    }

    /// Resident keys, most recently used first.
    pub async fn resident_keys(&self) -> Vec<TileKey> {
        let records = self.shared.records.read().await;
        records.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Number of tiles waiting to be persisted.
    pub async fn dirty_count(&self) -> usize {
        self.shared.dirty.lock().await.len()
    }

    /// Whether `key` has unsaved changes.
    pub async fn is_dirty(&self, key: &TileKey) -> bool {
        self.shared.dirty.lock().await.contains_key(key)
    }

    /// Counters since creation.
    pub fn stats(&self) -> CacheStats {
        self.shared.counters.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================
