//! Persistent position lookup.
//!
//! Trackers and stream logs start from the highest position already
//! persisted in their backing table. The SQL layer is external; this trait is
//! the seam where it plugs in (`SELECT MAX(column) FROM table`).

use cachewire_core::{CachewireResult, StreamError, StreamPosition};
use std::collections::HashMap;
use std::sync::RwLock;

/// Reads the highest persisted position of a stream table.
pub trait PositionSource: Send + Sync {
    /// Return `MAX(column)` of `table`, or `None` if the table is empty.
    fn max_position(&self, table: &str, column: &str) -> CachewireResult<Option<StreamPosition>>;
}

/// In-memory position source for tests and single-process deployments.
///
/// Uses std::sync::RwLock; poisoning surfaces as `StreamError::LockPoisoned`.
#[derive(Debug, Default)]
pub struct InMemoryPositionSource {
    positions: RwLock<HashMap<(String, String), StreamPosition>>,
}

impl InMemoryPositionSource {
    /// Source with no recorded positions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a persisted position, keeping the maximum seen per table/column.
    pub fn record(&self, table: &str, column: &str, position: StreamPosition) -> CachewireResult<()> {
        let mut positions = self
            .positions
            .write()
            .map_err(|_| StreamError::LockPoisoned)?;
        let entry = positions
            .entry((table.to_string(), column.to_string()))
            .or_insert(position);
        *entry = (*entry).max(position);
        Ok(())
    }

    /// Builder form of [`record`](Self::record) for test setup.
    pub fn with_position(mut self, table: &str, column: &str, position: StreamPosition) -> Self {
        if let Ok(positions) = self.positions.get_mut() {
            let entry = positions
                .entry((table.to_string(), column.to_string()))
                .or_insert(position);
            *entry = (*entry).max(position);
        }
        self
    }
}

impl PositionSource for InMemoryPositionSource {
    fn max_position(&self, table: &str, column: &str) -> CachewireResult<Option<StreamPosition>> {
        let positions = self
            .positions
            .read()
            .map_err(|_| StreamError::LockPoisoned)?;
        Ok(positions
            .get(&(table.to_string(), column.to_string()))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_returns_none() {
        let source = InMemoryPositionSource::new();
        let max = source
            .max_position("cache_invalidation_stream", "stream_id")
            .expect("max_position should succeed");
        assert_eq!(max, None);
    }

    #[test]
    fn test_record_keeps_maximum() {
        let source = InMemoryPositionSource::new();
        source.record("t", "c", 10).expect("record");
        source.record("t", "c", 4).expect("record");
        assert_eq!(source.max_position("t", "c").expect("max"), Some(10));
        assert_eq!(source.max_position("t", "other").expect("max"), None);
    }
}
