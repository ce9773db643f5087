use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

/// Entrada con marca de creación (para TTL) y de último acceso (para LRU)
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    last_access: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            last_access: now,
        }
    }

    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.duration_since(self.created_at) >= ttl)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removals: AtomicU64,
}

/// Cache LRU con TTL, compartible entre tareas.
///
/// Al llenarse expulsa la entrada con el acceso más antiguo. Una entrada
/// cuya edad alcanza el TTL ya no se devuelve.
#[derive(Debug)]
pub struct LRUCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    counters: Arc<Counters>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl<K, V> LRUCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let now = Instant::now();

        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.cleanup_expired();
            if self.data.len() >= self.capacity {
                self.evict_oldest();
            }
        }

        self.data
            .insert(key, CacheEntry::new(value, now))
            .map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();

        let value = match self.data.get_mut(key) {
            Some(mut entry) if !entry.is_expired(self.ttl, now) => {
                entry.last_access = now;
                Some(entry.value.clone())
            }
            Some(entry) => {
                drop(entry);
                self.data.remove(key);
                self.counters.expired_removals.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => None,
        };

        let counter = if value.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);

        value
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(self.ttl, now));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            self.counters
                .expired_removals
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expired_removals: self.counters.expired_removals.load(Ordering::Relaxed),
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().last_access)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<K, V> Clone for LRUCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            counters: self.counters.clone(),
            capacity: self.capacity,
            ttl: self.ttl,
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removals: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn evicts_least_recently_used() {
        let cache = LRUCache::new(2, None);
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.insert("b", 2);
        tokio::time::advance(Duration::from_millis(1)).await;

        // Leer "a" la vuelve la más reciente
        assert_eq!(cache.get(&"a"), Some(1));
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.insert("c", 3);

        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_at_ttl() {
        let cache = LRUCache::new(10, Some(Duration::from_secs(60)));
        cache.insert("a".to_string(), 1);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_only_expired() {
        let cache = LRUCache::new(10, Some(Duration::from_secs(10)));
        cache.insert(1, "viejo");
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert(2, "nuevo");
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.get(&2), Some("nuevo"));
        assert_eq!(cache.metrics().expired_removals, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn counts_hits_and_misses() {
        let cache = LRUCache::new(4, None);
        cache.insert(1, 1);
        cache.get(&1);
        cache.get(&2);
        let metrics = cache.metrics();
        assert_eq!((metrics.hits, metrics.misses), (1, 1));
        assert_eq!(metrics.hit_rate(), 0.5);
    }
}
