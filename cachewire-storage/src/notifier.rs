//! Peer notification.
//!
//! After a local write commits, peers must hear about the invalidation so
//! their consumers can drop the same entries. How the command travels is the
//! transport's business; these adapters hand it over.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use cachewire_core::{CacheKeys, CachewireResult, StreamError};

use crate::stream::InvalidationStream;

/// Sends invalidations towards other workers.
pub trait PeerNotifier: Send + Sync {
    fn send_invalidate_cache(&self, cache_id: &str, keys: &CacheKeys) -> CachewireResult<()>;
}

/// Command handed to the replication transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateCacheCommand {
    pub cache_id: String,
    pub keys: CacheKeys,
}

/// Notifier that queues commands on a tokio channel for the transport task.
#[derive(Debug, Clone)]
pub struct ChannelPeerNotifier {
    tx: mpsc::UnboundedSender<InvalidateCacheCommand>,
}

impl ChannelPeerNotifier {
    /// Create a notifier and the receiver the transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InvalidateCacheCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PeerNotifier for ChannelPeerNotifier {
    fn send_invalidate_cache(&self, cache_id: &str, keys: &CacheKeys) -> CachewireResult<()> {
        let command = InvalidateCacheCommand {
            cache_id: cache_id.to_string(),
            keys: keys.clone(),
        };
        self.tx.send(command).map_err(|_| StreamError::NotifierClosed {
            cache_id: cache_id.to_string(),
        })?;
        Ok(())
    }
}

/// Notifier that appends straight to the caches stream.
///
/// Used by the process that owns the stream table.
#[derive(Debug, Clone)]
pub struct StreamPeerNotifier {
    stream: Arc<InvalidationStream>,
}

impl StreamPeerNotifier {
    /// Notifier appending to `stream`.
    pub fn new(stream: Arc<InvalidationStream>) -> Self {
        Self { stream }
    }
}

impl PeerNotifier for StreamPeerNotifier {
    fn send_invalidate_cache(&self, cache_id: &str, keys: &CacheKeys) -> CachewireResult<()> {
        self.stream.append(cache_id, keys.clone())?;
        Ok(())
    }
}
