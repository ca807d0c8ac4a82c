//! CACHEWIRE Core - Stream and Invalidation Types
//!
//! Pure data structures shared by every other crate. Behaviour (trackers,
//! consumers, transactions) lives in cachewire-storage.

pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod keys;
pub mod row;
pub mod telemetry;

pub use config::ReplicationConfig;
pub use engine::{DatabaseEngine, EngineCapabilities};
pub use error::{
    CacheError, CachewireError, CachewireResult, ConfigError, StreamError, TransactionError,
};
pub use health::{HealthCheck, HealthStatus};
pub use keys::{CacheKeys, KeyPart};
pub use row::{InvalidationRow, StreamBatch};
pub use telemetry::{init_tracing, TelemetryConfig};

use chrono::{DateTime, Utc};

// ============================================================================
// STREAM IDENTITY
// ============================================================================

/// Position in a replicated stream.
///
/// Positions are allocated by the producer and strictly increase within a
/// stream. Consumers only ever move their tracked position forward.
pub type StreamPosition = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Name of the stream carrying cache invalidations.
pub const CACHES_STREAM: &str = "caches";

/// Position a stream starts from when its backing table is empty.
///
/// The first allocated position is therefore `EMPTY_STREAM_POSITION + 1`.
pub const EMPTY_STREAM_POSITION: StreamPosition = 1;
