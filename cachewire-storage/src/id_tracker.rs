//! Stream position tracker for consumers.
//!
//! Follows the position a consumer has reached in one named stream. The
//! tracker only moves forward: advancing to a lower or equal position is a
//! no-op, which is what makes duplicate and out-of-order redelivery harmless.
//!
//! Trackers only exist on engines whose position allocation is monotonic
//! across writers. Elsewhere [`StreamPositionTracker::load`] returns `None`
//! and the consumer runs without a position for the lifetime of the process.

use std::sync::atomic::{AtomicI64, Ordering};

use cachewire_core::{
    CachewireResult, EngineCapabilities, ReplicationConfig, StreamPosition, CACHES_STREAM,
    EMPTY_STREAM_POSITION,
};

use crate::position_source::PositionSource;

/// Tracks the last position a consumer has advanced past.
#[derive(Debug)]
pub struct StreamPositionTracker {
    stream_name: String,
    current: AtomicI64,
}

impl StreamPositionTracker {
    /// Create a tracker at a known position.
    pub fn new(stream_name: impl Into<String>, position: StreamPosition) -> Self {
        Self {
            stream_name: stream_name.into(),
            current: AtomicI64::new(position),
        }
    }

    /// Load a tracker from the persisted maximum of `table.column`.
    ///
    /// Returns `Ok(None)` when the engine lacks monotonic sequences. That is
    /// a permanent state, not an error. An empty table starts the tracker at
    /// [`EMPTY_STREAM_POSITION`]. Failures reading the source propagate.
    pub fn load(
        capabilities: EngineCapabilities,
        source: &dyn PositionSource,
        stream_name: &str,
        table: &str,
        column: &str,
    ) -> CachewireResult<Option<Self>> {
        if !capabilities.supports_stream_positions() {
            tracing::warn!(
                stream = stream_name,
                "Engine lacks monotonic sequences, stream positions will not be tracked"
            );
            return Ok(None);
        }

        let position = source
            .max_position(table, column)?
            .unwrap_or(EMPTY_STREAM_POSITION);

        tracing::info!(
            stream = stream_name,
            table,
            column,
            position,
            "Loaded stream position"
        );

        Ok(Some(Self::new(stream_name, position)))
    }

    /// Load the caches stream tracker described by `config`.
    pub fn for_caches(
        config: &ReplicationConfig,
        source: &dyn PositionSource,
    ) -> CachewireResult<Option<Self>> {
        Self::load(
            config.capabilities(),
            source,
            CACHES_STREAM,
            &config.cache_stream_table,
            &config.cache_stream_column,
        )
    }

    /// Name of the tracked stream.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Last position advanced past. Never blocks.
    pub fn current_position(&self) -> StreamPosition {
        self.current.load(Ordering::Acquire)
    }

    /// Move to `max(current, new_position)`.
    ///
    /// Returns true if the tracked position changed.
    pub fn advance(&self, new_position: StreamPosition) -> bool {
        let previous = self.current.fetch_max(new_position, Ordering::AcqRel);
        previous < new_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position_source::InMemoryPositionSource;
    use cachewire_core::{CachewireError, DatabaseEngine, StreamError};
    use proptest::prelude::*;

    struct BrokenSource;

    impl PositionSource for BrokenSource {
        fn max_position(&self, table: &str, column: &str) -> CachewireResult<Option<StreamPosition>> {
            Err(StreamError::PositionLoadFailed {
                table: table.to_string(),
                column: column.to_string(),
                reason: "connection reset".to_string(),
            }
            .into())
        }
    }

    #[test]
    fn test_load_from_persisted_max() {
        let source =
            InMemoryPositionSource::new().with_position("cache_invalidation_stream", "stream_id", 40);
        let tracker = StreamPositionTracker::for_caches(&ReplicationConfig::default(), &source)
            .expect("load should succeed")
            .expect("postgres supports tracking");

        assert_eq!(tracker.stream_name(), CACHES_STREAM);
        assert_eq!(tracker.current_position(), 40);
    }

    #[test]
    fn test_empty_table_starts_at_default() {
        let source = InMemoryPositionSource::new();
        let tracker = StreamPositionTracker::for_caches(&ReplicationConfig::default(), &source)
            .expect("load should succeed")
            .expect("postgres supports tracking");
        assert_eq!(tracker.current_position(), EMPTY_STREAM_POSITION);
    }

    #[test]
    fn test_unsupported_engine_yields_none() {
        let config = ReplicationConfig::default().with_engine(DatabaseEngine::Sqlite);
        let tracker = StreamPositionTracker::for_caches(&config, &BrokenSource)
            .expect("capability absence is not an error");
        assert!(tracker.is_none());
    }

    #[test]
    fn test_source_failure_propagates() {
        let err = StreamPositionTracker::for_caches(&ReplicationConfig::default(), &BrokenSource)
            .unwrap_err();
        assert!(matches!(
            err,
            CachewireError::Stream(StreamError::PositionLoadFailed { .. })
        ));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let tracker = StreamPositionTracker::new(CACHES_STREAM, 40);

        assert!(tracker.advance(42));
        assert_eq!(tracker.current_position(), 42);

        assert!(!tracker.advance(42));
        assert!(!tracker.advance(7));
        assert_eq!(tracker.current_position(), 42);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// For any sequence of advances, the tracked position is the maximum
        /// of the starting position and every advance.
        #[test]
        fn prop_position_is_running_max(
            start in -10i64..1000,
            advances in prop::collection::vec(-10i64..5000, 0..50),
        ) {
            let tracker = StreamPositionTracker::new(CACHES_STREAM, start);
            let mut expected = start;
            for position in advances {
                let before = tracker.current_position();
                let moved = tracker.advance(position);
                expected = expected.max(position);
                prop_assert_eq!(moved, position > before);
                prop_assert!(tracker.current_position() >= before);
            }
            prop_assert_eq!(tracker.current_position(), expected);
        }
    }
}
