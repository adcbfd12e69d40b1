/*
    error.rs - Error types for the synchronization engine

    Only construction-time failures ever reach callers of the public API.
    Everything raised by the codec, the transports or the storage backend is
    contained inside the sync unit: logged, counted and degraded.
*/

use crate::cell::PathError;
use thiserror::Error;

/// Top-level error returned by the public API
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid unit options (e.g. structured unit without a key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A live unit already owns this key in this namespace
    #[error("Key already in use: {0}")]
    KeyInUse(String),

    /// Units need a tokio runtime for their listeners and timers
    #[error("No tokio runtime available: {0}")]
    Runtime(String),

    /// Structured patch addressed an invalid path
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised while decoding wire payloads
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not valid JSON
    #[error("Malformed payload: {0}")]
    Syntax(#[from] serde_json::Error),

    /// Payload is JSON but not a `{data, timestamp}` envelope
    #[error("Invalid envelope shape: {0}")]
    InvalidShape(String),
}

/// Errors raised by a durable storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store does not exist or refuses all access
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The store exists but is full
    #[error("Storage quota exceeded: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded { needed: usize, limit: usize },

    /// Any other backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Errors raised by the broadcast channel
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The handle was closed before the send
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}
