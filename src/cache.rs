/// LRU cache of query string → ranked retrieval results.
///
/// Staleness is corpus-driven only: there is no time-based expiry, and
/// `clear()` must be invoked whenever the chunk corpus changes (document
/// added or deleted). All operations share one lock.
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::search::RetrievalResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 50;

pub struct RetrievalCache {
    inner: Mutex<LruCache<String, Vec<RetrievalResult>>>,
}

impl RetrievalCache {
    /// Create a cache holding at most `capacity` query entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).expect("nonzero"));
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a query, marking the entry as most recently used.
    #[must_use]
    pub fn get(&self, query: &str) -> Option<Vec<RetrievalResult>> {
        let mut cache = self.inner.lock().ok()?;
        cache.get(query).cloned()
    }

    /// Store results for a query, evicting the least recently used entry at
    /// capacity.
    pub fn put(&self, query: &str, results: Vec<RetrievalResult>) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(query.to_string(), results);
        }
    }

    /// Drop every entry. Called whenever the underlying corpus changes.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.clear();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RetrievalCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
