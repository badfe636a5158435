use super::collaborators::HighlightPredicate;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

/// Case- and surrounding-whitespace-insensitive cache key.
pub fn cache_key(query: &str) -> String {
    query.trim().to_lowercase()
}

/// A finished answer: the rendered message and the predicate to re-apply.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub rendered_message: String,
    pub highlight: HighlightPredicate,
}

/// Results keyed by normalized question, kept for the life of the process.
/// With a capacity set the least recently used entry is evicted first.
pub struct QueryCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.lock();
        f.debug_struct("QueryCache")
            .field("size", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl QueryCache {
    pub fn new(capacity: Option<usize>) -> Self {
        let cache = match capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            cache: Mutex::new(cache),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, query: &str) -> Option<CacheEntry> {
        self.lock().get(&cache_key(query)).cloned()
    }

    /// Last write wins.
    pub fn set(&self, query: &str, entry: CacheEntry) {
        self.lock().put(cache_key(query), entry);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
