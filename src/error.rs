use thiserror::Error;

/// Errors returned by persistent storage backends.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    Backend(String),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors produced when parsing a storage key back into a tile key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Key does not have 3 (legacy) or 4 colon-separated fields
    #[error("Malformed tile key '{key}': expected layer:level:tx:ty or layer:tx:ty")]
    Malformed { key: String },

    /// A numeric field failed to parse
    #[error("Invalid {field} in tile key '{key}'")]
    InvalidField { key: String, field: &'static str },

    /// Layer id is empty
    #[error("Empty layer id in tile key '{key}'")]
    EmptyLayer { key: String },
}

/// Errors surfaced by the tile cache.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Store read failed while resolving a tile
    #[error("Failed to load tile {key}: {reason}")]
    LoadFailure { key: String, reason: String },

    /// Stored blob does not have the fixed tile size
    #[error("Corrupt tile blob for {key}: expected {expected} bytes, got {actual}")]
    Decode {
        key: String,
        expected: usize,
        actual: usize,
    },

    /// Store write failed while flushing a dirty tile
    #[error("Failed to persist tile {key}: {source}")]
    FlushFailure {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Viewport rejected at the update boundary
    #[error("Invalid viewport geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// The tile exists but is not Ready (still loading or failed)
    #[error("Tile {key} is not ready")]
    NotReady { key: String },

    /// Image encoding failed (PNG export)
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// Cache configuration rejected
    #[error("Invalid cache configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl TileError {
    /// Whether this error came from a storage fault rather than caller misuse.
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            TileError::LoadFailure { .. } | TileError::Decode { .. } | TileError::FlushFailure { .. }
        )
    }
}
