//! Manual Cache
//!
//! Synchronous cache populated explicitly or through a function given at
//! each call.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::cache::store::CacheStore;
use crate::cache::CacheStats;
use crate::error::{LoadError, Result};

/// Synchronous cache handle. Clones share the same entries.
pub struct Cache<K, V> {
    pub(crate) store: Arc<CacheStore<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("entry_count", &self.store.entry_count())
            .field("pending", &self.store.pending_count())
            .finish()
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(store: Arc<CacheStore<K, V>>) -> Self {
        Self { store }
    }

    // == Reads ==
    /// Returns the live value for `key`, never loading.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.store.get(key)
    }

    /// Returns the value for `key`, computing it with `load` if absent.
    ///
    /// Concurrent callers for the same key run `load` once; the others block
    /// until it finishes and share its result. A failure is returned to every
    /// waiter and nothing is cached. `load` must not read the same key from
    /// this cache.
    pub fn get_with<F>(&self, key: &K, load: F) -> Result<V>
    where
        F: FnOnce(&K) -> std::result::Result<V, LoadError>,
    {
        self.store.get_or_compute(key, load)
    }

    /// Returns the live values among `keys`, skipping absent ones.
    pub fn get_all_present<'a, I>(&self, keys: I) -> HashMap<K, V>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        keys.into_iter()
            .filter_map(|key| self.store.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    // == Writes ==
    pub fn put(&self, key: K, value: V) {
        self.store.insert(key, value);
    }

    pub fn put_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.store.insert(key, value);
        }
    }

    /// Removes `key`, returning its value if it was live.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.store.remove(key)
    }

    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    // == Maintenance ==
    pub fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    /// Number of entries held, including expired ones not yet removed.
    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }

    /// Removes every expired entry now, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.store.cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBuilder;
    use crate::error::CacheError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_put_and_get_if_present() {
        let cache: Cache<String, String> = CacheBuilder::new().maximum_size(10).build().unwrap();

        cache.put("a".to_string(), "1".to_string());

        assert_eq!(cache.get_if_present(&"a".to_string()), Some("1".to_string()));
        assert_eq!(cache.get_if_present(&"b".to_string()), None);
    }

    #[test]
    fn test_get_with_computes_once_then_hits() {
        let cache: Cache<i32, i32> = CacheBuilder::new().build().unwrap();
        let calls = AtomicUsize::new(0);

        let load = |key: &i32| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(key + 1)
        };
        assert_eq!(cache.get_with(&1, load).unwrap(), 2);
        assert_eq!(cache.get_with(&1, load).unwrap(), 2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.load_successes, 1);
    }

    #[test]
    fn test_get_with_failure_is_not_cached() {
        let cache: Cache<i32, i32> = CacheBuilder::new().build().unwrap();

        let result = cache.get_with(&1, |_| Err(LoadError::msg("unavailable")));

        assert!(matches!(result, Err(CacheError::Load(_))));
        assert!(!cache.contains_key(&1));
        assert_eq!(cache.get_with(&1, |k| Ok(*k)).unwrap(), 1);
    }

    #[test]
    fn test_get_with_single_flight_across_threads() {
        let cache: Cache<&'static str, u64> = CacheBuilder::new().build().unwrap();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let results: Vec<u64> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache
                            .get_with(&"slow", |_| {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(50));
                                Ok(42)
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|v| *v == 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_load_releases_waiters() {
        let cache: Cache<u32, u32> = CacheBuilder::new().build().unwrap();

        let panicked = thread::scope(|scope| {
            scope
                .spawn(|| cache.get_with(&1, |_| panic!("loader bug")))
                .join()
                .is_err()
        });

        assert!(panicked);
        assert_eq!(cache.get_with(&1, |_| Ok(5)).unwrap(), 5);
    }

    #[test]
    fn test_get_all_present_and_put_all() {
        let cache: Cache<u32, &'static str> = CacheBuilder::new().build().unwrap();
        cache.put_all([(1, "one"), (2, "two")]);

        let found = cache.get_all_present(&[1, 2, 3]);

        assert_eq!(found, HashMap::from([(1, "one"), (2, "two")]));
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn test_remove_and_invalidate_all() {
        let cache: Cache<u32, u32> = CacheBuilder::new().build().unwrap();
        cache.put_all((0..5).map(|i| (i, i)));

        assert_eq!(cache.remove(&0), Some(0));
        assert_eq!(cache.remove(&0), None);

        cache.invalidate_all();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.get_if_present(&3), None);
    }
}
