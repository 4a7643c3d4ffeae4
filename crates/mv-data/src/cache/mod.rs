//! Query result caching

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use indexmap::IndexMap;
use mv_core::{ObjectId, Query};
use parking_lot::Mutex;
use tracing::debug;

/// Bounded LRU cache from normalized queries to identifier lists.
///
/// Entries are kept in access order: the front of the map is the least
/// recently used entry. One lock serializes every `get`/`put`, so recency
/// stays consistent when several searches share the cache.
pub struct QueryCache {
    entries: Mutex<IndexMap<Query, Arc<[ObjectId]>>>,
    capacity: usize,
    /// Search results longer than this are not stored
    max_result_len: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl QueryCache {
    /// Create a new cache holding at most `capacity` queries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            max_result_len: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Refuse to cache search results longer than `limit`
    pub fn with_max_result_len(mut self, limit: Option<usize>) -> Self {
        self.max_result_len = limit;
        self
    }

    /// Look up a query, marking it most recently used on a hit
    pub fn get(&self, query: &Query) -> Option<Arc<[ObjectId]>> {
        let mut entries = self.entries.lock();

        match entries.shift_remove(query) {
            Some(identifiers) => {
                entries.insert(query.clone(), identifiers.clone());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(identifiers)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or refresh a result, evicting the least recently used entry
    /// when over capacity. Returns whether the result was stored.
    pub fn put(&self, query: Query, identifiers: Arc<[ObjectId]>) -> bool {
        if let Some(limit) = self.max_result_len {
            if !query.is_listing() && identifiers.len() > limit {
                debug!(%query, len = identifiers.len(), limit, "result too large to cache");
                return false;
            }
        }

        let mut entries = self.entries.lock();
        entries.shift_remove(&query);
        entries.insert(query, identifiers);

        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                debug!(query = %evicted, "evicted least recently used query");
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        true
    }

    /// Whether a query is cached, without touching its recency
    pub fn contains(&self, query: &Query) -> bool {
        self.entries.lock().contains_key(query)
    }

    /// Number of cached queries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[u64]) -> Arc<[ObjectId]> {
        values.iter().copied().map(ObjectId).collect()
    }

    #[test]
    fn test_evicts_least_recently_used_not_oldest_inserted() {
        let cache = QueryCache::new(2);
        let hand = Query::new("Hand");
        let landscape = Query::new("Landscape");
        let portrait = Query::new("Portrait");

        cache.put(hand.clone(), ids(&[1, 2, 3]));
        cache.put(landscape.clone(), ids(&[4, 5]));

        // Touching "Hand" makes "Landscape" the least recently used
        assert!(cache.get(&hand).is_some());
        cache.put(portrait.clone(), ids(&[6]));

        assert!(cache.contains(&hand));
        assert!(!cache.contains(&landscape));
        assert!(cache.contains(&portrait));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_put_existing_key_refreshes_recency() {
        let cache = QueryCache::new(2);
        let a = Query::new("a");
        let b = Query::new("b");

        cache.put(a.clone(), ids(&[1]));
        cache.put(b.clone(), ids(&[2]));
        cache.put(a.clone(), ids(&[1, 10]));
        cache.put(Query::new("c"), ids(&[3]));

        assert!(!cache.contains(&b));
        assert_eq!(&*cache.get(&a).unwrap(), &[ObjectId(1), ObjectId(10)]);
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = QueryCache::new(4);
        let query = Query::new("Hand");

        assert!(cache.is_empty());
        assert!(cache.get(&query).is_none());
        cache.put(query.clone(), ids(&[1]));
        assert!(cache.get(&query).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_result_cap_rejects_large_searches_but_not_listings() {
        let cache = QueryCache::new(4).with_max_result_len(Some(2));

        assert!(!cache.put(Query::new("big"), ids(&[1, 2, 3])));
        assert!(cache.put(Query::new("small"), ids(&[1, 2])));
        assert!(cache.put(Query::everything(), ids(&[1, 2, 3, 4])));

        assert!(!cache.contains(&Query::new("big")));
        assert_eq!(cache.len(), 2);
    }
}
