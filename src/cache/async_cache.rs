//! Asynchronous Caches
//!
//! Caches whose values are computed on a worker pool and handed out as
//! [`CacheFuture`]s.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tokio::runtime::Handle;

use crate::cache::dispatch::{get_or_load, put_future, CacheFuture, WorkerPool};
use crate::cache::store::CacheStore;
use crate::cache::{AsyncLoader, CacheStats};
use crate::error::{LoadError, Result};

// == Async Cache ==
/// Asynchronous cache computing values through functions given at each call.
pub struct AsyncCache<K, V> {
    store: Arc<CacheStore<K, V>>,
    pool: WorkerPool,
}

impl<K, V> Clone for AsyncCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pool: self.pool.clone(),
        }
    }
}

impl<K, V> AsyncCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(store: Arc<CacheStore<K, V>>, pool: WorkerPool) -> Self {
        Self { store, pool }
    }

    /// Returns the value or the computation in flight, without starting one.
    pub fn get_if_present(&self, key: &K) -> Option<CacheFuture<V>> {
        self.store.get_or_pending(key).map(CacheFuture::from)
    }

    /// Returns the value, computing it with the blocking function `load` on
    /// the pool's blocking threads if absent.
    pub fn get_with<F>(&self, key: K, load: F) -> CacheFuture<V>
    where
        F: FnOnce(&K) -> std::result::Result<V, LoadError> + Send + 'static,
    {
        get_or_load(&self.store, &self.pool, key, |key, handle| {
            let handle = handle.clone();
            async move {
                match handle.spawn_blocking(move || load(&key)).await {
                    Ok(result) => result,
                    Err(error) => Err(LoadError::new(error)),
                }
            }
            .boxed()
        })
    }

    /// Returns the value, computing it with the future returned by `load` if
    /// absent.
    ///
    /// `load` itself runs synchronously on the calling thread when this call
    /// starts a load, after the cache has released its locks; it may read or
    /// write this cache. The future it returns runs on the worker pool.
    pub fn get_with_future<F, Fut>(&self, key: K, load: F) -> CacheFuture<V>
    where
        F: FnOnce(K, Handle) -> Fut,
        Fut: Future<Output = std::result::Result<V, LoadError>> + Send + 'static,
    {
        get_or_load(&self.store, &self.pool, key, |key, handle| {
            load(key, handle.clone()).boxed()
        })
    }

    pub fn put(&self, key: K, value: V) {
        self.store.insert(key, value);
    }

    /// Installs a value that may not be computed yet.
    ///
    /// Readers get the pending future until it resolves; a failure leaves the
    /// key absent.
    pub fn put_async<F>(&self, key: K, value: F) -> CacheFuture<V>
    where
        F: Future<Output = std::result::Result<V, LoadError>> + Send + 'static,
    {
        put_future(&self.store, &self.pool, key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.store.remove(key)
    }

    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.store.cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn worker_pool(&self) -> &WorkerPool {
        &self.pool
    }
}

// == Async Loading Cache ==
/// Asynchronous cache computing missing values with its own loader.
pub struct AsyncLoadingCache<K, V> {
    cache: AsyncCache<K, V>,
    loader: Arc<AsyncLoader<K, V>>,
}

impl<K, V> Clone for AsyncLoadingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<K, V> AsyncLoadingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(cache: AsyncCache<K, V>, loader: AsyncLoader<K, V>) -> Self {
        Self {
            cache,
            loader: Arc::new(loader),
        }
    }

    /// Returns the value, loading it on the pool if absent.
    ///
    /// Never blocks: concurrent callers for the same key share one load.
    pub fn get(&self, key: K) -> CacheFuture<V> {
        let loader = Arc::clone(&self.loader);
        get_or_load(&self.cache.store, &self.cache.pool, key, move |key, handle| {
            loader.load(key, handle)
        })
    }

    /// Returns the values of `keys`, loading the missing ones.
    ///
    /// Loads start immediately; the returned future fails if any key fails.
    pub fn get_all<I>(&self, keys: I) -> BoxFuture<'static, Result<HashMap<K, V>>>
    where
        I: IntoIterator<Item = K>,
    {
        let mut seen = HashSet::new();
        let pending: Vec<_> = keys
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .map(|key| {
                let future = self.get(key.clone());
                future.map(move |result| result.map(|value| (key, value)))
            })
            .collect();
        async move { Ok(try_join_all(pending).await?.into_iter().collect()) }.boxed()
    }

    pub fn get_if_present(&self, key: &K) -> Option<CacheFuture<V>> {
        self.cache.get_if_present(key)
    }

    pub fn put(&self, key: K, value: V) {
        self.cache.put(key, value);
    }

    pub fn put_async<F>(&self, key: K, value: F) -> CacheFuture<V>
    where
        F: Future<Output = std::result::Result<V, LoadError>> + Send + 'static,
    {
        self.cache.put_async(key, value)
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
    pub fn as_async_cache(&self) -> &AsyncCache<K, V> {
        &self.cache
    }
}
