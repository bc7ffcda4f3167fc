//! Test utilities for integration tests.
//!
//! This module provides a tracking store with failure injection and a load
//! gate, plus helpers for building tiles and viewports.

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

use canvas_tiles::error::StoreError;
use canvas_tiles::tile::encode_blob;
use canvas_tiles::{PersistentStore, TileKey, Viewport, TILE_SIZE};

// =============================================================================
// Tracking Store
// =============================================================================

/// An in-memory store that records every call.
///
/// Reads can be held behind a gate to keep loads in flight, and reads or
/// writes can be made to fail. Clones share all state.
#[derive(Clone, Default)]
pub struct TrackingStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
    gets: Arc<RwLock<Vec<String>>>,
    puts: Arc<AtomicUsize>,
    fail_gets: Arc<AtomicBool>,
    fail_puts: Arc<AtomicBool>,
    gate: Option<Arc<Semaphore>>,
    write_gate: Option<Arc<Semaphore>>,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose reads wait until the returned gate is opened.
    pub fn gated() -> (Self, LoadGate) {
        let semaphore = Arc::new(Semaphore::new(0));
        let store = Self {
            gate: Some(semaphore.clone()),
            ..Self::default()
        };
        (store, LoadGate(semaphore))
    }

    /// A store whose writes wait until the returned gate is opened.
    pub fn write_gated() -> (Self, LoadGate) {
        let semaphore = Arc::new(Semaphore::new(0));
        let store = Self {
            write_gate: Some(semaphore.clone()),
            ..Self::default()
        };
        (store, LoadGate(semaphore))
    }

    pub async fn with_tile(self, key: &TileKey, image: &RgbaImage) -> Self {
        self.insert(key, image).await;
        self
    }

    pub async fn insert(&self, key: &TileKey, image: &RgbaImage) {
        self.insert_raw(&key.storage_key(), encode_blob(image)).await;
    }

    pub async fn insert_raw(&self, name: &str, blob: Bytes) {
        self.blobs.write().await.insert(name.to_string(), blob);
    }

    pub async fn blob(&self, key: &TileKey) -> Option<Bytes> {
        self.blobs.read().await.get(&key.storage_key()).cloned()
    }

    /// Number of reads of the canonical name of `key`.
    pub async fn reads_of(&self, key: &TileKey) -> usize {
        let name = key.storage_key();
        self.gets.read().await.iter().filter(|k| **k == name).count()
    }

    pub async fn get_count(&self) -> usize {
        self.gets.read().await.len()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistentStore for TrackingStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        self.gets.write().await.push(key.to_string());

        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, blob: Bytes) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.write_gate {
            let _permit = gate.acquire().await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        self.blobs.write().await.insert(key.to_string(), blob);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.blobs.read().await.keys().cloned().collect())
    }

    fn describe(&self) -> String {
        "tracking://".to_string()
    }
}

/// Holds store calls until opened.
pub struct LoadGate(Arc<Semaphore>);

impl LoadGate {
    pub fn open(&self) {
        self.0.add_permits(10_000);
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// A tile filled with one colour.
pub fn solid_tile(color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, Rgba(color))
}

/// A 512x512 viewport centred on `(x, y)`.
pub fn view(x: f64, y: f64, zoom: f64) -> Viewport {
    Viewport::new(x, y, zoom, 512, 512)
}
