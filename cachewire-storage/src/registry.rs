//! Local cache registry.
//!
//! Each worker registers the caches it actually runs. Replicated rows name a
//! cache by id; a worker that never registered that id simply has nothing to
//! invalidate, so [`CacheRegistry::lookup`] returns an `Option` and callers
//! treat `None` as a normal outcome.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use cachewire_core::{CacheError, CacheKeys, CachewireResult};

/// A named cache whose entries can be dropped by key tuple.
pub trait InvalidatableCache: Send + Sync {
    /// Identifier other workers use to address this cache.
    fn name(&self) -> &str;

    /// Drop the entries addressed by `keys`.
    fn invalidate(&self, keys: &CacheKeys) -> CachewireResult<()>;

    /// Drop every entry.
    fn invalidate_all(&self) -> CachewireResult<()>;

    /// Apply a replicated key tuple, where an empty tuple means everything.
    fn invalidate_keys(&self, keys: &CacheKeys) -> CachewireResult<()> {
        if keys.is_all() {
            self.invalidate_all()
        } else {
            self.invalidate(keys)
        }
    }
}

/// Caches registered in this process, by name.
///
/// Built during startup and then shared read-only behind an `Arc`.
#[derive(Default, Clone)]
pub struct CacheRegistry {
    caches: HashMap<String, Arc<dyn InvalidatableCache>>,
}

impl CacheRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache under its own name.
    pub fn register(&mut self, cache: Arc<dyn InvalidatableCache>) -> CachewireResult<()> {
        let name = cache.name().to_string();
        if self.caches.contains_key(&name) {
            return Err(CacheError::AlreadyRegistered { cache_id: name }.into());
        }
        self.caches.insert(name, cache);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_cache(mut self, cache: Arc<dyn InvalidatableCache>) -> CachewireResult<Self> {
        self.register(cache)?;
        Ok(self)
    }

    /// Find a cache by id. `None` means this worker does not run it.
    pub fn lookup(&self, cache_id: &str) -> Option<Arc<dyn InvalidatableCache>> {
        self.caches.get(cache_id).cloned()
    }

    /// True if `cache_id` is registered.
    pub fn contains(&self, cache_id: &str) -> bool {
        self.caches.contains_key(cache_id)
    }

    /// Number of registered caches.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// True when no cache is registered.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Registered cache names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.names())
            .finish()
    }
}

// ============================================================================
// LOCAL CACHE
// ============================================================================

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries dropped by invalidation.
    pub invalidated: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-process cache of a named computation, keyed by argument tuple.
///
/// Invalidation drops every entry whose key tuple starts with the given
/// tuple, so a full-length tuple drops one entry and a prefix drops a family
/// of entries.
pub struct LocalCache<V> {
    name: String,
    entries: RwLock<BTreeMap<CacheKeys, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidated: AtomicU64,
}

impl<V: Clone + Send + Sync> LocalCache<V> {
    /// Empty cache registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        }
    }

    fn poisoned(&self) -> CacheError {
        CacheError::LockPoisoned {
            cache_id: self.name.clone(),
        }
    }

    /// Cached value for `keys`, counting a hit or a miss.
    pub fn get(&self, keys: &CacheKeys) -> CachewireResult<Option<V>> {
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        let value = entries.get(keys).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    /// Store `value` under `keys`, replacing any previous value.
    pub fn insert(&self, keys: CacheKeys, value: V) -> CachewireResult<()> {
        self.entries
            .write()
            .map_err(|_| self.poisoned())?
            .insert(keys, value);
        Ok(())
    }

    /// Return the cached value or compute and store it.
    pub fn get_or_insert_with<F>(&self, keys: CacheKeys, compute: F) -> CachewireResult<V>
    where
        F: FnOnce() -> CachewireResult<V>,
    {
        if let Some(value) = self.get(&keys)? {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(keys, value.clone())?;
        Ok(value)
    }

    /// True if an entry exists for exactly `keys`.
    pub fn contains(&self, keys: &CacheKeys) -> CachewireResult<bool> {
        Ok(self
            .entries
            .read()
            .map_err(|_| self.poisoned())?
            .contains_key(keys))
    }

    /// Number of cached entries.
    pub fn len(&self) -> CachewireResult<usize> {
        Ok(self.entries.read().map_err(|_| self.poisoned())?.len())
    }

    /// True when no entry is cached.
    pub fn is_empty(&self) -> CachewireResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Usage counters and current size.
    pub fn stats(&self) -> CachewireResult<CacheStats> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            entry_count: self.len()? as u64,
        })
    }
}

impl<V: Clone + Send + Sync> InvalidatableCache for LocalCache<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate(&self, keys: &CacheKeys) -> CachewireResult<()> {
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        let before = entries.len();
        entries.retain(|existing, _| !existing.parts().starts_with(keys.parts()));
        let dropped = (before - entries.len()) as u64;
        self.invalidated.fetch_add(dropped, Ordering::Relaxed);
        Ok(())
    }

    fn invalidate_all(&self) -> CachewireResult<()> {
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        self.invalidated
            .fetch_add(entries.len() as u64, Ordering::Relaxed);
        entries.clear();
        Ok(())
    }
}

impl<V> fmt::Debug for LocalCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCache").field("name", &self.name).finish()
    }
}
