//! Bounded recency (LRU) cache.
//!
//! [`RecencyCache`] keeps at most `max_size` entries and evicts the entry
//! touched least recently. A touch is a successful [`RecencyCache::get`]
//! or any [`RecencyCache::set`]; [`RecencyCache::contains`] peeks without
//! touching.
//!
//! Entries live in a slab of nodes threaded into a doubly-linked list
//! ordered from least to most recently touched, with a `HashMap` from key
//! to slot. Every operation is O(1) and runs under one mutex, so a cache
//! can be shared across tasks behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{StoreError, StoreResult};

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Total cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries pushed out to make room for new keys.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Hit rate between 0.0 and 1.0 (0.0 before any lookup).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} evictions={} rate={:.2}%",
            self.hits(),
            self.misses(),
            self.evictions(),
            self.hit_rate() * 100.0,
        )
    }
}

// ── recency list ─────────────────────────────────────────────────────

const NIL: usize = usize::MAX;

struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// Slab-backed recency list. `head` is the stalest entry, `tail` the
/// freshest. Slots are never freed individually: an eviction hands its
/// slot straight to the incoming key.
struct RecencyList<K, V> {
    index: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
}

impl<K, V> RecencyList<K, V>
where
    K: Hash + Eq + Clone,
{
    fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            NIL => self.head = next,
            p => self.nodes[p].next = next,
        }
        match next {
            NIL => self.tail = prev,
            n => self.nodes[n].prev = prev,
        }
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = NIL;
    }

    fn push_back(&mut self, slot: usize) {
        self.nodes[slot].prev = self.tail;
        self.nodes[slot].next = NIL;
        match self.tail {
            NIL => self.head = slot,
            t => self.nodes[t].next = slot,
        }
        self.tail = slot;
    }

    fn touch(&mut self, slot: usize) {
        if slot != self.tail {
            self.unlink(slot);
            self.push_back(slot);
        }
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        Some(&self.nodes[slot].value)
    }

    fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or overwrite; returns the evicted entry, if any.
    fn set(&mut self, key: K, value: V, max_size: usize) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.nodes[slot].value = value;
            self.touch(slot);
            return None;
        }

        if self.len() < max_size {
            let slot = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: NIL,
                next: NIL,
            });
            self.index.insert(key, slot);
            self.push_back(slot);
            return None;
        }

        let slot = self.head;
        self.unlink(slot);
        let node = &mut self.nodes[slot];
        let old_key = std::mem::replace(&mut node.key, key.clone());
        let old_value = std::mem::replace(&mut node.value, value);
        self.index.remove(&old_key);
        self.index.insert(key, slot);
        self.push_back(slot);
        Some((old_key, old_value))
    }

    fn clear(&mut self) {
        self.index.clear();
        self.nodes.clear();
        self.head = NIL;
        self.tail = NIL;
    }
}

// ── cache ────────────────────────────────────────────────────────────

/// A fixed-capacity, least-recently-used cache safe to share across tasks.
///
/// # Example
///
/// ```
/// use eventlog_store::RecencyCache;
///
/// let cache: RecencyCache<String, i64> = RecencyCache::builder("ids")
///     .max_size(2)
///     .build()
///     .unwrap();
/// cache.set("a".into(), 1);
/// cache.set("b".into(), 2);
/// cache.get(&"a".into());
/// cache.set("c".into(), 3);
/// assert!(!cache.contains(&"b".into()));
/// ```
pub struct RecencyCache<K, V> {
    name: &'static str,
    max_size: usize,
    list: Mutex<RecencyList<K, V>>,
    stats: CacheStats,
}

impl<K, V> RecencyCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone,
{
    /// Start building a cache; `name` only labels log lines.
    pub fn builder(name: &'static str) -> RecencyCacheBuilder<K, V> {
        RecencyCacheBuilder {
            name,
            max_size: 1_000,
            _marker: PhantomData,
        }
    }

    /// Look up `key`. A hit makes `key` the most recently touched entry;
    /// a miss changes nothing.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.lock().get(key).cloned();
        match value {
            Some(v) => {
                self.stats.record_hit();
                debug!(cache = self.name, ?key, "cache hit");
                Some(v)
            }
            None => {
                self.stats.record_miss();
                debug!(cache = self.name, ?key, "cache miss");
                None
            }
        }
    }

    /// Insert or overwrite `key`, making it the most recently touched.
    ///
    /// When `key` is new and the cache is full, the least recently
    /// touched entry is evicted first and returned.
    pub fn set(&self, key: K, value: V) -> Option<(K, V)> {
        let evicted = self.lock().set(key, value, self.max_size);
        if let Some((old_key, _)) = &evicted {
            self.stats.record_eviction();
            debug!(cache = self.name, key = ?old_key, "cache evict");
        }
        evicted
    }

    /// Whether `key` is cached. Does not count as a touch.
    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains(key)
    }

    /// Current number of entries, never above [`RecencyCache::max_size`].
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Capacity fixed at construction.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Drop every entry. Counters are left alone.
    pub fn clear(&self) {
        self.lock().clear();
        debug!(cache = self.name, "cache cleared");
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn lock(&self) -> MutexGuard<'_, RecencyList<K, V>> {
        // Nothing panics while the guard is held, so a poisoned lock still
        // guards a consistent list.
        self.list.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K, V> fmt::Debug for RecencyCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecencyCache")
            .field("name", &self.name)
            .field("max_size", &self.max_size)
            .field("stats", &self.stats)
            .finish()
    }
}

// ── builder ──────────────────────────────────────────────────────────

/// Builder for [`RecencyCache`].
pub struct RecencyCacheBuilder<K, V> {
    name: &'static str,
    max_size: usize,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> RecencyCacheBuilder<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone,
{
    /// Maximum number of entries; must be at least 1.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn build(self) -> StoreResult<RecencyCache<K, V>> {
        if self.max_size == 0 {
            return Err(StoreError::InvalidArgument(format!(
                "cache `{}` needs max_size >= 1",
                self.name
            )));
        }

        debug!(name = self.name, max_size = self.max_size, "recency cache created");

        Ok(RecencyCache {
            name: self.name,
            max_size: self.max_size,
            list: Mutex::new(RecencyList::with_capacity(self.max_size)),
            stats: CacheStats::default(),
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn make_cache(max_size: usize) -> RecencyCache<String, i64> {
        RecencyCache::builder("test").max_size(max_size).build().unwrap()
    }

    fn key(i: i64) -> String {
        format!("key{i}")
    }

    #[test]
    fn max_size_bounds_entry_count() {
        let cache = make_cache(5);
        for i in 0..10 {
            cache.set(key(i), i);
        }
        assert_eq!(cache.size(), 5);
        assert_eq!(cache.stats().evictions(), 5);
    }

    #[test]
    fn drops_least_recently_added() {
        let cache = make_cache(5);
        for i in 0..6 {
            cache.set(key(i), i);
        }

        assert!(!cache.contains(&key(0)));
        for i in 1..6 {
            assert!(cache.contains(&key(i)));
            assert_eq!(cache.get(&key(i)), Some(i));
        }
    }

    #[test]
    fn drops_least_recently_used() {
        let cache = make_cache(5);
        for i in 0..5 {
            cache.set(key(i), i);
        }

        for i in [4, 2, 0, 3, 1] {
            cache.get(&key(i));
        }
        let evicted = cache.set("newkey".to_string(), 6);

        assert_eq!(evicted, Some((key(4), 4)));
        assert!(!cache.contains(&key(4)));
        assert!(cache.contains(&"newkey".to_string()));
        assert_eq!(cache.get(&"newkey".to_string()), Some(6));
    }

    #[test]
    fn contains_does_not_promote() {
        let cache = make_cache(2);
        cache.set(key(0), 0);
        cache.set(key(1), 1);

        assert!(cache.contains(&key(0)));
        cache.set(key(2), 2);

        assert!(!cache.contains(&key(0)));
        assert!(cache.contains(&key(1)));
    }

    #[test]
    fn miss_does_not_touch_anything() {
        let cache = make_cache(2);
        cache.set(key(0), 0);
        cache.set(key(1), 1);

        assert_eq!(cache.get(&key(9)), None);
        cache.set(key(2), 2);

        assert!(!cache.contains(&key(0)));
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn overwrite_refreshes_without_evicting() {
        let cache = make_cache(2);
        cache.set(key(0), 0);
        cache.set(key(1), 1);

        assert_eq!(cache.set(key(0), 100), None);
        assert_eq!(cache.size(), 2);

        cache.set(key(2), 2);
        assert_eq!(cache.get(&key(0)), Some(100));
        assert!(!cache.contains(&key(1)));
    }

    #[test]
    fn single_slot_cache_keeps_latest() {
        let cache = make_cache(1);
        cache.set(key(0), 0);
        cache.set(key(1), 1);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&key(1)), Some(1));
        assert_eq!(cache.get(&key(0)), None);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result: StoreResult<RecencyCache<String, i64>> =
            RecencyCache::builder("zero").max_size(0).build();
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn clear_empties_cache() {
        let cache = make_cache(3);
        cache.set(key(0), 0);
        cache.set(key(1), 1);
        cache.clear();
        assert_eq!(cache.size(), 0);

        for i in 0..4 {
            cache.set(key(i), i);
        }
        assert_eq!(cache.size(), 3);
        assert!(!cache.contains(&key(0)));
    }

    #[test]
    fn concurrent_access_stays_bounded() {
        let cache = Arc::new(make_cache(8));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        cache.set(format!("t{t}-{}", i % 16), i);
                        cache.get(&format!("t{}-{}", (t + 1) % 4, i % 16));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.size(), 8);
    }

    #[test]
    fn stats_display() {
        let cache = make_cache(2);
        cache.set(key(0), 0);
        cache.get(&key(0));
        cache.get(&key(1));
        let display = format!("{}", cache.stats());
        assert!(display.contains("hits=1"));
        assert!(display.contains("misses=1"));
        assert!(display.contains("50.00%"));
    }

    #[test]
    fn stats_reset() {
        let cache = make_cache(2);
        cache.get(&key(0));
        cache.stats().reset();
        assert_eq!(cache.stats().misses(), 0);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }
}
