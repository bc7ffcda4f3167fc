//! Durable key-blob storage behind the tile cache.
//!
//! The cache only needs four operations from a backend, captured by
//! [`PersistentStore`]. Keys are canonical storage keys
//! (`{layer}:{level}:{tx}:{ty}`), blobs are raw RGBA8 tile bytes.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process map, for tests and throwaway canvases
//! - [`FileStore`]: one file per tile under a root directory
//! - [`S3Store`]: objects in an S3 or S3-compatible bucket

mod fs;
mod memory;
mod s3;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

pub use fs::FileStore;
pub use memory::MemoryStore;
pub use s3::{create_s3_client, S3Store};

/// Key-blob durable storage.
///
/// Implementations must be thread-safe; the cache calls them from many
/// concurrent load and flush tasks.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Fetch the blob stored under `key`, or `None` if nothing is stored.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store `blob` under `key`, replacing any previous value.
    async fn put(&self, key: &str, blob: Bytes) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List every stored key, in no particular order.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Human-readable location of this store (for logging).
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: PersistentStore + ?Sized> PersistentStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, blob: Bytes) -> Result<(), StoreError> {
        (**self).put(key, blob).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_keys().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
