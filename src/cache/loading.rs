//! Loading Cache
//!
//! Synchronous cache that computes missing values with its own loader.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use crate::cache::store::{LoadGuard, Started};
use crate::cache::{Cache, CacheStats, Loader};
use crate::error::{CacheError, Result};

pub struct LoadingCache<K, V> {
    cache: Cache<K, V>,
    loader: Arc<Loader<K, V>>,
}

impl<K, V> Clone for LoadingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<K, V> fmt::Debug for LoadingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache")
            .field("cache", &self.cache)
            .field("loader", &self.loader)
            .finish()
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(cache: Cache<K, V>, loader: Loader<K, V>) -> Self {
        Self {
            cache,
            loader: Arc::new(loader),
        }
    }

    /// Returns the value for `key`, loading it on the calling thread if
    /// absent. Concurrent callers for one key share a single load.
    pub fn get(&self, key: &K) -> Result<V> {
        let loader = &self.loader;
        self.cache.get_with(key, |key| loader.load(key))
    }

    /// Returns the values of `keys`, loading every missing key.
    ///
    /// Missing keys not already in flight are loaded together in one
    /// [`Loader::load_many`] call. Fails if any key fails; the values that did
    /// load stay cached.
    pub fn get_all<'a, I>(&self, keys: I) -> Result<HashMap<K, V>>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut seen = HashSet::new();
        let mut values = HashMap::new();
        let mut joined = Vec::new();
        let mut leaders: Vec<LoadGuard<K, V>> = Vec::new();

        for key in keys {
            if !seen.insert(key) {
                continue;
            }
            match self.cache.store.start_or_join(key) {
                Started::Present(value) => {
                    values.insert(key.clone(), value);
                }
                Started::Joined(future) => joined.push((key.clone(), future)),
                Started::Leader(guard) => leaders.push(guard),
            }
        }

        let mut failure: Option<CacheError> = None;
        if !leaders.is_empty() {
            let missing: Vec<K> = leaders.iter().map(|guard| guard.key().clone()).collect();
            debug!(count = missing.len(), "loading missing keys");
            let results = self.loader.load_many(&missing);
            for (guard, result) in leaders.into_iter().zip(results) {
                let key = guard.key().clone();
                match guard.finish(result.map_err(CacheError::from)) {
                    Ok(value) => {
                        values.insert(key, value);
                    }
                    Err(error) => {
                        failure.get_or_insert(error);
                    }
                }
            }
        }

        for (key, future) in joined {
            match futures::executor::block_on(future) {
                Ok(value) => {
                    values.insert(key, value);
                }
                Err(error) => {
                    failure.get_or_insert(error);
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(values),
        }
    }

    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.cache.get_if_present(key)
    }

    pub fn get_all_present<'a, I>(&self, keys: I) -> HashMap<K, V>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        self.cache.get_all_present(keys)
    }

    pub fn put(&self, key: K, value: V) {
        self.cache.put(key, value);
    }

    pub fn put_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.cache.put_all(entries);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.cache.remove(key)
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The underlying cache, for computing values through other functions.
    pub fn as_cache(&self) -> &Cache<K, V> {
        &self.cache
    }
}
