//! Error types for CACHEWIRE operations

use crate::StreamPosition;
use thiserror::Error;

/// Stream tracking and delivery errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Consumer for stream {stream} is not streaming yet")]
    NotStreaming { stream: String },

    #[error("Failed to load position for {table}.{column}: {reason}")]
    PositionLoadFailed {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Peer notifier closed, dropped invalidation for {cache_id}")]
    NotifierClosed { cache_id: String },

    #[error("Stream {stream} rejected append at position {position}: {reason}")]
    AppendFailed {
        stream: String,
        position: StreamPosition,
        reason: String,
    },

    #[error("Stream lock poisoned")]
    LockPoisoned,
}

/// Local cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalidation of {cache_id} failed: {reason}")]
    InvalidationFailed { cache_id: String, reason: String },

    #[error("Cache {cache_id} is already registered")]
    AlreadyRegistered { cache_id: String },

    #[error("Cache lock poisoned: {cache_id}")]
    LockPoisoned { cache_id: String },
}

/// Unit-of-work errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Begin failed for {description}: {reason}")]
    BeginFailed { description: String, reason: String },

    #[error("Commit failed for {description}: {reason}")]
    CommitFailed { description: String, reason: String },

    #[error("Rollback failed for {description}: {reason}")]
    RollbackFailed { description: String, reason: String },

    /// The write is durable; only the follow-up work failed.
    #[error("Post-commit callback {index} of {description} failed after commit: {reason}")]
    CallbackFailed {
        description: String,
        index: usize,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to initialize tracing: {reason}")]
    TelemetryInit { reason: String },
}

/// Master error type for all CACHEWIRE errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CachewireError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for CACHEWIRE operations.
pub type CachewireResult<T> = Result<T, CachewireError>;

// =============================================================================
// TESTS
// =============================================================================
