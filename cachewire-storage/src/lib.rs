//! CACHEWIRE Storage - Stream Tracking and Invalidation Propagation
//!
//! Keeps per-worker caches coherent across a fleet without a coordinator:
//!
//! - Writers schedule invalidation on their transaction with
//!   [`InvalidationHook`]. On commit the local entry is dropped and peers are
//!   notified through a [`PeerNotifier`].
//! - The notification lands in the caches stream ([`InvalidationStream`]),
//!   which assigns it the next position.
//! - Every worker's [`ReplicatedCacheConsumer`] applies stream batches to its
//!   [`CacheRegistry`] and follows its position with a
//!   [`StreamPositionTracker`], when the engine supports one.
//!
//! # Example
//!
//! ```ignore
//! let config = ReplicationConfig::from_env()?;
//! let mut registry = CacheRegistry::new();
//! registry.register(users.clone())?;
//!
//! let mut consumer = ReplicatedCacheConsumer::from_config(&config, &source, Arc::new(registry))?;
//! consumer.on_start_replication();
//! consumer.apply_batch(&batch)?;
//!
//! run_interaction(&backend, "rename_user", |txn| {
//!     hook.invalidate_cache_and_stream(txn, users.clone(), CacheKeys::single("alice"));
//!     Ok(())
//! })?;
//! ```

pub mod consumer;
pub mod hook;
pub mod id_tracker;
pub mod notifier;
pub mod position_source;
pub mod registry;
pub mod replication;
pub mod stream;
pub mod transaction;

pub use consumer::{ConsumerState, ConsumerStats, ReplicatedCacheConsumer};
pub use hook::InvalidationHook;
pub use id_tracker::StreamPositionTracker;
pub use notifier::{ChannelPeerNotifier, InvalidateCacheCommand, PeerNotifier, StreamPeerNotifier};
pub use position_source::{InMemoryPositionSource, PositionSource};
pub use registry::{CacheRegistry, CacheStats, InvalidatableCache, LocalCache};
pub use replication::{catch_up, run_feed};
pub use stream::{InvalidationStream, StreamEntry};
pub use transaction::{
    run_interaction, Callback, InMemoryTransactionBackend, Transaction, TransactionBackend,
};
