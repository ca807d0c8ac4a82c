//! Replicated cache consumer.
//!
//! Applies batches from the caches stream to the caches this worker has
//! registered and follows the stream position so the upstream source knows
//! where to resume.
//!
//! # State Transition Diagram
//!
//! ```text
//! Uninitialized ─── on_start_replication() ──→ Streaming
//! ```
//!
//! # Batch application
//!
//! Rows are applied in the order received. A row naming a cache this worker
//! does not run is skipped. A failing invalidation aborts the batch and
//! leaves the position untouched, so the redelivered batch is applied again
//! from the start; invalidation is idempotent, so rows applied before the
//! failure are harmless to repeat. The position advances to the batch token
//! once every row has been applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use cachewire_core::{
    CachewireResult, HealthCheck, InvalidationRow, ReplicationConfig, StreamBatch, StreamError,
    StreamPosition, CACHES_STREAM,
};

use crate::id_tracker::StreamPositionTracker;
use crate::position_source::PositionSource;
use crate::registry::CacheRegistry;

const COMPONENT: &str = "cache_consumer";

/// Lifecycle of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created, replication not yet started. Rows are rejected.
    Uninitialized,
    /// Applying rows until process shutdown.
    Streaming,
}

/// Counters describing what a consumer has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Batches whose rows were applied.
    pub batches_applied: u64,
    /// Batches skipped because their token was already reached.
    pub batches_redelivered: u64,
    /// Rows that invalidated a registered cache.
    pub rows_applied: u64,
    /// Rows naming a cache this worker does not run.
    pub rows_unregistered: u64,
}

/// Consumes the caches stream on behalf of one worker.
///
/// Mutating operations take `&mut self`: one replication feed drives a
/// consumer, and concurrent application for the same stream cannot be
/// expressed. Status reporting can still read the position through
/// [`tracker`](Self::tracker).
#[derive(Debug)]
pub struct ReplicatedCacheConsumer {
    tracker: Option<Arc<StreamPositionTracker>>,
    registry: Arc<CacheRegistry>,
    state: ConsumerState,
    stats: ConsumerStats,
    last_failure: Option<String>,
}

impl ReplicatedCacheConsumer {
    /// Create a consumer. `tracker` is `None` on engines without stream
    /// position support.
    pub fn new(tracker: Option<StreamPositionTracker>, registry: Arc<CacheRegistry>) -> Self {
        Self {
            tracker: tracker.map(Arc::new),
            registry,
            state: ConsumerState::Uninitialized,
            stats: ConsumerStats::default(),
            last_failure: None,
        }
    }

    /// Build a consumer, loading the caches tracker as `config` dictates.
    pub fn from_config(
        config: &ReplicationConfig,
        source: &dyn PositionSource,
        registry: Arc<CacheRegistry>,
    ) -> CachewireResult<Self> {
        let tracker = StreamPositionTracker::for_caches(config, source)?;
        Ok(Self::new(tracker, registry))
    }

    /// Signal from the replication client that streaming has begun.
    pub fn on_start_replication(&mut self) {
        if self.state == ConsumerState::Streaming {
            return;
        }
        self.state = ConsumerState::Streaming;
        tracing::info!(
            position = ?self.tracker.as_ref().map(|t| t.current_position()),
            caches = self.registry.len(),
            "Cache consumer streaming"
        );
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// True once replication has started.
    pub fn is_streaming(&self) -> bool {
        self.state == ConsumerState::Streaming
    }

    /// Snapshot of the apply counters.
    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Caches this consumer invalidates.
    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Shared handle to the position tracker, if this engine has one.
    pub fn tracker(&self) -> Option<Arc<StreamPositionTracker>> {
        self.tracker.clone()
    }

    /// Positions the upstream source should resume from.
    ///
    /// Without a tracker the caches entry is absent, which is not the same
    /// as position zero.
    pub fn report_position(&self) -> BTreeMap<String, StreamPosition> {
        let mut positions = BTreeMap::new();
        if let Some(tracker) = &self.tracker {
            positions.insert(CACHES_STREAM.to_string(), tracker.current_position());
        }
        positions
    }

    /// Apply one delivery.
    pub fn apply_batch(&mut self, batch: &StreamBatch) -> CachewireResult<()> {
        self.apply_rows(&batch.stream_name, batch.token, &batch.rows)
    }

    /// Apply `rows` from `stream_name` and adopt `token` as the new position.
    ///
    /// Streams other than caches pass through untouched.
    pub fn apply_rows(
        &mut self,
        stream_name: &str,
        token: StreamPosition,
        rows: &[InvalidationRow],
    ) -> CachewireResult<()> {
        if self.state != ConsumerState::Streaming {
            return Err(StreamError::NotStreaming {
                stream: stream_name.to_string(),
            }
            .into());
        }
        if stream_name != CACHES_STREAM {
            return Ok(());
        }

        let applied_upto = self.tracker.as_ref().map(|t| t.current_position());
        if let Some(current) = applied_upto {
            if token <= current {
                tracing::debug!(token, current, "Skipping redelivered caches batch");
                self.stats.batches_redelivered += 1;
                return Ok(());
            }
        }

        for row in rows {
            if applied_upto.is_some_and(|current| row.position <= current) {
                continue;
            }
            if let Err(err) = self.apply_row(row) {
                self.last_failure = Some(err.to_string());
                return Err(err);
            }
        }
        self.last_failure = None;

        if let Some(tracker) = &self.tracker {
            tracker.advance(token);
        }
        self.stats.batches_applied += 1;
        Ok(())
    }

    fn apply_row(&mut self, row: &InvalidationRow) -> CachewireResult<()> {
        match self.registry.lookup(&row.cache_id) {
            Some(cache) => {
                cache.invalidate_keys(&row.keys)?;
                self.stats.rows_applied += 1;
            }
            None => {
                tracing::debug!(
                    cache_id = %row.cache_id,
                    position = row.position,
                    "Cache not registered in this worker, skipping row"
                );
                self.stats.rows_unregistered += 1;
            }
        }
        Ok(())
    }

    /// Report whether this consumer is tracking and where it is.
    pub fn health_check(&self) -> HealthCheck {
        if self.state == ConsumerState::Uninitialized {
            return HealthCheck::unknown(COMPONENT, "replication not started");
        }
        if let Some(reason) = &self.last_failure {
            return HealthCheck::unhealthy(COMPONENT, format!("last batch failed: {}", reason))
                .with_metadata("rows_applied", serde_json::json!(self.stats.rows_applied));
        }
        let check = match &self.tracker {
            Some(tracker) => HealthCheck::healthy(COMPONENT).with_metadata(
                CACHES_STREAM,
                serde_json::json!(tracker.current_position()),
            ),
            None => HealthCheck::degraded(
                COMPONENT,
                "engine does not support stream positions, caches stream is not resume-tracked",
            ),
        };
        check
            .with_metadata("rows_applied", serde_json::json!(self.stats.rows_applied))
            .with_metadata(
                "rows_unregistered",
                serde_json::json!(self.stats.rows_unregistered),
            )
    }
}
