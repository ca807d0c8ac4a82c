//! Producer side of the caches stream.
//!
//! Writers append invalidations here; each append allocates the next
//! position. Consumers read the log back in position order to catch up from
//! whatever position they last reported.

use std::sync::RwLock;

use chrono::Utc;

use cachewire_core::{
    CacheKeys, CachewireResult, InvalidationRow, StreamBatch, StreamError, StreamPosition,
    Timestamp, CACHES_STREAM, EMPTY_STREAM_POSITION,
};

use crate::position_source::PositionSource;

/// A persisted invalidation with its write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub row: InvalidationRow,
    pub invalidated_at: Timestamp,
}

#[derive(Debug)]
struct StreamLog {
    current: StreamPosition,
    entries: Vec<StreamEntry>,
}

/// Append-only log of cache invalidations with position allocation.
///
/// Allocation and append happen under one write lock, so positions become
/// visible to readers in order with no gaps between them.
#[derive(Debug)]
pub struct InvalidationStream {
    table: String,
    column: String,
    log: RwLock<StreamLog>,
}

impl InvalidationStream {
    /// Create an empty stream for `table.column`.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::starting_at(table, column, EMPTY_STREAM_POSITION)
    }

    fn starting_at(table: impl Into<String>, column: impl Into<String>, current: StreamPosition) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            log: RwLock::new(StreamLog {
                current,
                entries: Vec::new(),
            }),
        }
    }

    /// Resume allocation after the highest persisted position.
    pub fn load(source: &dyn PositionSource, table: &str, column: &str) -> CachewireResult<Self> {
        let current = source
            .max_position(table, column)?
            .unwrap_or(EMPTY_STREAM_POSITION);
        tracing::info!(table, column, current, "Loaded invalidation stream");
        Ok(Self::starting_at(table, column, current))
    }

    /// Table the stream is persisted in.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Position column of the stream table.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Record an invalidation and return its position.
    pub fn append(&self, cache_id: &str, keys: CacheKeys) -> CachewireResult<StreamPosition> {
        let mut log = self.log.write().map_err(|_| StreamError::LockPoisoned)?;
        let position = log
            .current
            .checked_add(1)
            .ok_or_else(|| StreamError::AppendFailed {
                stream: CACHES_STREAM.to_string(),
                position: log.current,
                reason: "position space exhausted".to_string(),
            })?;
        log.entries.push(StreamEntry {
            row: InvalidationRow::new(position, cache_id, keys),
            invalidated_at: Utc::now(),
        });
        log.current = position;

        tracing::debug!(cache_id, position, "Appended cache invalidation");
        Ok(position)
    }

    /// Highest allocated position.
    pub fn current_token(&self) -> CachewireResult<StreamPosition> {
        Ok(self.log.read().map_err(|_| StreamError::LockPoisoned)?.current)
    }

    /// Rows strictly after `from`, at most `limit` of them.
    ///
    /// The batch token is the last returned row's position when rows remain
    /// beyond the limit, otherwise the stream's current token.
    pub fn rows_since(&self, from: StreamPosition, limit: usize) -> CachewireResult<StreamBatch> {
        let log = self.log.read().map_err(|_| StreamError::LockPoisoned)?;
        let start = log.entries.partition_point(|e| e.row.position <= from);
        let remaining = &log.entries[start..];

        let rows: Vec<InvalidationRow> = remaining
            .iter()
            .take(limit)
            .map(|e| e.row.clone())
            .collect();

        let token = if remaining.len() > rows.len() {
            rows.last().map(|r| r.position).unwrap_or(from)
        } else {
            log.current.max(from)
        };

        Ok(StreamBatch::new(CACHES_STREAM, token, rows))
    }

    /// Entries written at or after `since`, for diagnostics.
    pub fn entries_since(&self, since: Timestamp) -> CachewireResult<Vec<StreamEntry>> {
        let log = self.log.read().map_err(|_| StreamError::LockPoisoned)?;
        Ok(log
            .entries
            .iter()
            .filter(|e| e.invalidated_at >= since)
            .cloned()
            .collect())
    }

    /// Number of entries recorded since this stream was created or loaded.
    pub fn len(&self) -> CachewireResult<usize> {
        Ok(self.log.read().map_err(|_| StreamError::LockPoisoned)?.entries.len())
    }

    /// True when nothing has been appended.
    pub fn is_empty(&self) -> CachewireResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl PositionSource for InvalidationStream {
    fn max_position(&self, table: &str, column: &str) -> CachewireResult<Option<StreamPosition>> {
        if table != self.table || column != self.column {
            return Ok(None);
        }
        let log = self.log.read().map_err(|_| StreamError::LockPoisoned)?;
        Ok(log.entries.last().map(|e| e.row.position))
    }
}
