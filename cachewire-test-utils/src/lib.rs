//! CACHEWIRE Test Utilities
//!
//! Centralized test infrastructure for the CACHEWIRE workspace:
//! - Recording doubles for caches and peer notifiers sharing one event log,
//!   so tests can assert the order of post-commit effects
//! - Failing doubles for error paths
//! - Proptest generators for keys, rows and batch sequences
//! - Fixtures for common scenarios

pub use cachewire_core::{
    CacheError, CacheKeys, CachewireError, CachewireResult, InvalidationRow, KeyPart,
    StreamBatch, StreamError, StreamPosition, CACHES_STREAM,
};
pub use cachewire_storage::{
    CacheRegistry, InvalidatableCache, PeerNotifier, PositionSource, ReplicatedCacheConsumer,
    StreamPositionTracker,
};

use proptest::prelude::*;
use std::sync::{Arc, Mutex};

// ============================================================================
// EVENT LOG
// ============================================================================

/// Observable side effect recorded by a double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Invalidated { cache_id: String, keys: CacheKeys },
    InvalidatedAll { cache_id: String },
    Notified { cache_id: String, keys: CacheKeys },
}

/// Shared, ordered record of side effects across doubles.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    pub fn push(&self, event: Recorded) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Events recorded so far, in order.
    pub fn events(&self) -> Vec<Recorded> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

// ============================================================================
// DOUBLES
// ============================================================================

/// Cache that records invalidations instead of holding entries.
#[derive(Debug, Clone)]
pub struct RecordingCache {
    name: String,
    log: EventLog,
}

impl RecordingCache {
    /// Recording cache named `name` writing to `log`.
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

impl InvalidatableCache for RecordingCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate(&self, keys: &CacheKeys) -> CachewireResult<()> {
        self.log.push(Recorded::Invalidated {
            cache_id: self.name.clone(),
            keys: keys.clone(),
        });
        Ok(())
    }

    fn invalidate_all(&self) -> CachewireResult<()> {
        self.log.push(Recorded::InvalidatedAll {
            cache_id: self.name.clone(),
        });
        Ok(())
    }
}

/// Cache whose invalidation always fails.
#[derive(Debug, Clone)]
pub struct FailingCache {
    name: String,
}

impl FailingCache {
    /// Failing cache named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn failure(&self) -> CachewireError {
        CacheError::InvalidationFailed {
            cache_id: self.name.clone(),
            reason: "injected failure".to_string(),
        }
        .into()
    }
}

impl InvalidatableCache for FailingCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate(&self, _keys: &CacheKeys) -> CachewireResult<()> {
        Err(self.failure())
    }

    fn invalidate_all(&self) -> CachewireResult<()> {
        Err(self.failure())
    }
}

/// Notifier that records what it would have sent.
#[derive(Debug, Clone)]
pub struct RecordingNotifier {
    log: EventLog,
}

impl RecordingNotifier {
    /// Notifier writing to `log`.
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl PeerNotifier for RecordingNotifier {
    fn send_invalidate_cache(&self, cache_id: &str, keys: &CacheKeys) -> CachewireResult<()> {
        self.log.push(Recorded::Notified {
            cache_id: cache_id.to_string(),
            keys: keys.clone(),
        });
        Ok(())
    }
}

/// Notifier whose transport is gone.
#[derive(Debug, Clone, Default)]
pub struct ClosedNotifier;

impl PeerNotifier for ClosedNotifier {
    fn send_invalidate_cache(&self, cache_id: &str, _keys: &CacheKeys) -> CachewireResult<()> {
        Err(StreamError::NotifierClosed {
            cache_id: cache_id.to_string(),
        }
        .into())
    }
}

/// Position source that cannot reach its database.
#[derive(Debug, Clone, Default)]
pub struct UnreachablePositionSource;

impl PositionSource for UnreachablePositionSource {
    fn max_position(&self, table: &str, column: &str) -> CachewireResult<Option<StreamPosition>> {
        Err(StreamError::PositionLoadFailed {
            table: table.to_string(),
            column: column.to_string(),
            reason: "database unreachable".to_string(),
        }
        .into())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Caches batch with one row per `(cache_id, key)` pair, every row at `token`.
pub fn caches_batch(token: StreamPosition, rows: &[(&str, &str)]) -> StreamBatch {
    StreamBatch::caches(
        token,
        rows.iter()
            .map(|(cache_id, key)| InvalidationRow::new(token, *cache_id, CacheKeys::single(*key)))
            .collect(),
    )
}

/// Streaming consumer at `position` over `registry`.
pub fn streaming_consumer(
    position: Option<StreamPosition>,
    registry: CacheRegistry,
) -> ReplicatedCacheConsumer {
    let tracker = position.map(|p| StreamPositionTracker::new(CACHES_STREAM, p));
    let mut consumer = ReplicatedCacheConsumer::new(tracker, Arc::new(registry));
    consumer.on_start_replication();
    consumer
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Any key part.
pub fn arb_key_part() -> impl Strategy<Value = KeyPart> {
    prop_oneof![
        Just(KeyPart::Null),
        any::<bool>().prop_map(KeyPart::Bool),
        any::<i64>().prop_map(KeyPart::Int),
        "[a-z@:!.]{1,16}".prop_map(KeyPart::Text),
    ]
}

/// Key tuples of up to three parts, including the empty tuple.
pub fn arb_cache_keys() -> impl Strategy<Value = CacheKeys> {
    prop::collection::vec(arb_key_part(), 0..4).prop_map(CacheKeys::new)
}

/// Realistic cache names plus random ones.
pub fn arb_cache_id() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("get_user".to_string()),
        Just("get_room".to_string()),
        Just("get_membership".to_string()),
        "get_[a-z]{3,8}",
    ]
}

/// Batches with strictly increasing tokens starting after `start`.
pub fn arb_increasing_batches(
    start: StreamPosition,
    max_batches: usize,
) -> impl Strategy<Value = Vec<StreamBatch>> {
    prop::collection::vec(
        (
            1i64..10,
            prop::collection::vec((arb_cache_id(), arb_cache_keys()), 0..4),
        ),
        1..max_batches.max(2),
    )
    .prop_map(move |steps| {
        let mut token = start;
        steps
            .into_iter()
            .map(|(step, rows)| {
                token += step;
                let rows = rows
                    .into_iter()
                    .map(|(cache_id, keys)| InvalidationRow::new(token, cache_id, keys))
                    .collect();
                StreamBatch::caches(token, rows)
            })
            .collect()
    })
}
