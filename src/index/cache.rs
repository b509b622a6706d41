use crate::index::QueryIndex;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default capacity of the per-node result cache.
pub const DEFAULT_RESULT_CACHE_CAPACITY: usize = 1_000;

/// Bounded memoizer from a probed tag value to the other-check children that
/// applied at a node. The eviction policy is opaque to the index: a cache is
/// a lossy memo, never the source of truth, and is cleared wholesale when
/// the predicate set at the node changes.
pub trait ResultCache<V>: Send + Sync {
    fn get(&self, value: &str) -> Option<Vec<Arc<QueryIndex<V>>>>;
    fn put(&self, value: &str, indexes: Vec<Arc<QueryIndex<V>>>);
    fn clear(&self);
}

/// Manufactures one result cache per index node. The default should be fine
/// for most uses; heavy uses with many expressions and high throughput can
/// plug in an alternate implementation.
pub trait CacheSupplier<V>: Send + Sync {
    fn create(&self) -> Box<dyn ResultCache<V>>;
}

/// Default supplier producing `LruResultCache` instances.
#[derive(Debug, Clone, Copy)]
pub struct LruCacheSupplier {
    capacity: NonZeroUsize,
}

impl LruCacheSupplier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Default for LruCacheSupplier {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_CACHE_CAPACITY)
    }
}

impl<V: Send + Sync + 'static> CacheSupplier<V> for LruCacheSupplier {
    fn create(&self) -> Box<dyn ResultCache<V>> {
        Box::new(LruResultCache::new(self.capacity))
    }
}

/// LRU-bounded result cache.
pub struct LruResultCache<V> {
    entries: Mutex<LruCache<String, Vec<Arc<QueryIndex<V>>>>>,
}

impl<V> LruResultCache<V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<V: Send + Sync> ResultCache<V> for LruResultCache<V> {
    fn get(&self, value: &str) -> Option<Vec<Arc<QueryIndex<V>>>> {
        self.entries.lock().get(value).cloned()
    }

    fn put(&self, value: &str, indexes: Vec<Arc<QueryIndex<V>>>) {
        self.entries.lock().put(value.to_string(), indexes);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}
