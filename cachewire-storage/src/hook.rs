//! Write-path integration for cache invalidation.
//!
//! A write that makes a cached value stale calls
//! [`InvalidationHook::invalidate_cache_and_stream`] inside its transaction.
//! Nothing happens until the transaction commits. Then the local entry is
//! dropped first and peers are notified second. Dropping before commit would
//! let a concurrent reader repopulate the cache from the pre-write state.
//! If the transaction rolls back, neither step runs.

use std::sync::Arc;

use cachewire_core::CacheKeys;

use crate::notifier::PeerNotifier;
use crate::registry::{CacheRegistry, InvalidatableCache};
use crate::transaction::Transaction;

/// Schedules local invalidation and peer notification on commit.
#[derive(Clone)]
pub struct InvalidationHook {
    notifier: Arc<dyn PeerNotifier>,
}

impl InvalidationHook {
    /// Hook notifying peers through `notifier`.
    pub fn new(notifier: Arc<dyn PeerNotifier>) -> Self {
        Self { notifier }
    }

    /// Invalidate `keys` of `cache` here and on every peer once `txn` commits.
    pub fn invalidate_cache_and_stream(
        &self,
        txn: &mut Transaction,
        cache: Arc<dyn InvalidatableCache>,
        keys: CacheKeys,
    ) {
        let cache_id = cache.name().to_string();
        let local_keys = keys.clone();
        txn.call_after(move || cache.invalidate_keys(&local_keys));
        self.schedule_notification(txn, cache_id, keys);
    }

    /// Like [`invalidate_cache_and_stream`](Self::invalidate_cache_and_stream)
    /// but for a cache known only by name.
    ///
    /// A writer need not run the cache it invalidates. When `cache_id` is not
    /// registered locally only the peer notification is scheduled.
    pub fn invalidate_named_and_stream(
        &self,
        txn: &mut Transaction,
        registry: &CacheRegistry,
        cache_id: &str,
        keys: CacheKeys,
    ) {
        match registry.lookup(cache_id) {
            Some(cache) => self.invalidate_cache_and_stream(txn, cache, keys),
            None => {
                tracing::debug!(cache_id, "Cache not registered locally, notifying peers only");
                self.schedule_notification(txn, cache_id.to_string(), keys);
            }
        }
    }

    fn schedule_notification(&self, txn: &mut Transaction, cache_id: String, keys: CacheKeys) {
        let notifier = Arc::clone(&self.notifier);
        txn.call_after(move || notifier.send_invalidate_cache(&cache_id, &keys));
    }
}

impl std::fmt::Debug for InvalidationHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationHook").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChannelPeerNotifier;
    use crate::registry::LocalCache;
    use crate::transaction::{run_interaction, InMemoryTransactionBackend};
    use cachewire_core::{CacheError, CachewireResult};

    fn setup() -> (
        InvalidationHook,
        tokio::sync::mpsc::UnboundedReceiver<crate::notifier::InvalidateCacheCommand>,
        Arc<LocalCache<String>>,
    ) {
        let (notifier, rx) = ChannelPeerNotifier::channel();
        let cache = Arc::new(LocalCache::new("get_user"));
        cache
            .insert(CacheKeys::single("alice"), "Alice".to_string())
            .expect("insert");
        (InvalidationHook::new(Arc::new(notifier)), rx, cache)
    }

    #[test]
    fn test_commit_invalidates_and_notifies() {
        let (hook, mut rx, cache) = setup();
        let backend = InMemoryTransactionBackend::new();

        run_interaction(&backend, "rename_user", |txn| {
            hook.invalidate_cache_and_stream(txn, cache.clone(), CacheKeys::single("alice"));
            assert!(cache.contains(&CacheKeys::single("alice"))?);
            assert!(rx.try_recv().is_err());
            Ok(())
        })
        .expect("interaction should succeed");

        assert!(!cache.contains(&CacheKeys::single("alice")).expect("contains"));
        let command = rx.try_recv().expect("notification sent");
        assert_eq!(command.cache_id, "get_user");
        assert_eq!(command.keys, CacheKeys::single("alice"));
    }

    #[test]
    fn test_rollback_does_nothing() {
        let (hook, mut rx, cache) = setup();
        let backend = InMemoryTransactionBackend::new();

        let result: CachewireResult<()> = run_interaction(&backend, "rename_user", |txn| {
            hook.invalidate_cache_and_stream(txn, cache.clone(), CacheKeys::single("alice"));
            Err(CacheError::InvalidationFailed {
                cache_id: "get_user".to_string(),
                reason: "constraint violated".to_string(),
            }
            .into())
        });

        assert!(result.is_err());
        assert!(cache.contains(&CacheKeys::single("alice")).expect("contains"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unregistered_name_still_notifies() {
        let (hook, mut rx, _cache) = setup();
        let backend = InMemoryTransactionBackend::new();
        let registry = CacheRegistry::new();

        run_interaction(&backend, "rename_user", |txn| {
            hook.invalidate_named_and_stream(txn, &registry, "get_user", CacheKeys::single("alice"));
            assert_eq!(txn.pending_after_callbacks(), 1);
            Ok(())
        })
        .expect("interaction should succeed");

        assert_eq!(rx.try_recv().expect("notification sent").cache_id, "get_user");
    }

    #[test]
    fn test_registered_name_invalidates_locally() {
        let (hook, mut rx, cache) = setup();
        let backend = InMemoryTransactionBackend::new();
        let registry = CacheRegistry::new()
            .with_cache(cache.clone())
            .expect("register");

        run_interaction(&backend, "rename_user", |txn| {
            hook.invalidate_named_and_stream(txn, &registry, "get_user", CacheKeys::single("alice"));
            assert_eq!(txn.pending_after_callbacks(), 2);
            Ok(())
        })
        .expect("interaction should succeed");

        assert!(cache.is_empty().expect("is_empty"));
        assert!(rx.try_recv().is_ok());
    }
}
