//! Replicated invalidation rows and delivery batches.

use serde::{Deserialize, Serialize};

use crate::{CacheKeys, StreamPosition, CACHES_STREAM};

/// The unit of replicated data on the caches stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRow {
    /// Producer-assigned position, unique within the stream.
    pub position: StreamPosition,
    /// Name of the cached computation to invalidate.
    pub cache_id: String,
    /// Entry to drop. Empty means every entry of `cache_id`.
    pub keys: CacheKeys,
}

impl InvalidationRow {
    /// Row for `cache_id` at `position`.
    pub fn new(position: StreamPosition, cache_id: impl Into<String>, keys: CacheKeys) -> Self {
        Self {
            position,
            cache_id: cache_id.into(),
            keys,
        }
    }
}

/// One delivery from the replication source.
///
/// `token` is the position a consumer adopts once every row in the batch has
/// been applied. It is shared by the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBatch {
    pub stream_name: String,
    pub token: StreamPosition,
    pub rows: Vec<InvalidationRow>,
}

impl StreamBatch {
    /// Batch on an arbitrary stream.
    pub fn new(
        stream_name: impl Into<String>,
        token: StreamPosition,
        rows: Vec<InvalidationRow>,
    ) -> Self {
        Self {
            stream_name: stream_name.into(),
            token,
            rows,
        }
    }

    /// Batch on the caches stream.
    pub fn caches(token: StreamPosition, rows: Vec<InvalidationRow>) -> Self {
        Self::new(CACHES_STREAM, token, rows)
    }

    /// True when this batch belongs to the caches stream.
    pub fn is_caches(&self) -> bool {
        self.stream_name == CACHES_STREAM
    }
}
