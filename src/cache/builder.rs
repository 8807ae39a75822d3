//! Cache Builder
//!
//! Collects the configuration of a cache and produces one of the four cache
//! kinds. The configuration is validated before anything is built.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::debug;

use crate::cache::dispatch::WorkerPool;
use crate::cache::store::CacheStore;
use crate::cache::{
    AsyncCache, AsyncLoader, AsyncLoadingCache, Cache, Loader, LoadingCache, RemovalCause,
    RemovalListener, SystemTicker, Ticker,
};
use crate::config::CacheConfig;
use crate::error::Result;

pub struct CacheBuilder<K, V> {
    config: CacheConfig,
    ticker: Option<Arc<dyn Ticker>>,
    executor: Option<Handle>,
    listener: Option<RemovalListener<K, V>>,
    _types: PhantomData<fn(K, V)>,
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self::from_config(CacheConfig::default())
    }
}

impl<K, V> fmt::Debug for CacheBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("config", &self.config)
            .field("ticker", &self.ticker)
            .field("has_executor", &self.executor.is_some())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl<K, V> CacheBuilder<K, V> {
    /// An unbounded cache whose entries never expire.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            ticker: None,
            executor: None,
            listener: None,
            _types: PhantomData,
        }
    }

    pub fn maximum_size(mut self, size: u64) -> Self {
        self.config.maximum_size = Some(size);
        self
    }

    pub fn expire_after_access(mut self, duration: Duration) -> Self {
        self.config.expire_after_access = Some(duration);
        self
    }

    pub fn expire_after_write(mut self, duration: Duration) -> Self {
        self.config.expire_after_write = Some(duration);
        self
    }

    /// Caps concurrent loads of the asynchronous caches.
    pub fn max_concurrent_loads(mut self, limit: usize) -> Self {
        self.config.max_concurrent_loads = Some(limit);
        self
    }

    /// Replaces the system clock, e.g. with a
    /// [`ManualTicker`](crate::cache::ManualTicker) in tests.
    pub fn ticker(mut self, ticker: Arc<dyn Ticker>) -> Self {
        self.ticker = Some(ticker);
        self
    }

    /// Runtime the asynchronous caches run loads on. Defaults to the runtime
    /// the cache is built in.
    pub fn executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
        self
    }

    pub fn removal_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&K, &V, RemovalCause) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Build ==
    pub fn build(self) -> Result<Cache<K, V>> {
        Ok(Cache::new(self.store()?))
    }

    pub fn build_loading(self, loader: Loader<K, V>) -> Result<LoadingCache<K, V>> {
        let cache = self.build()?;
        Ok(LoadingCache::new(cache, loader))
    }

    pub fn build_async(self) -> Result<AsyncCache<K, V>> {
        let pool = self.worker_pool()?;
        Ok(AsyncCache::new(self.store()?, pool))
    }

    pub fn build_async_loading(self, loader: AsyncLoader<K, V>) -> Result<AsyncLoadingCache<K, V>> {
        let cache = self.build_async()?;
        Ok(AsyncLoadingCache::new(cache, loader))
    }

    fn store(self) -> Result<Arc<CacheStore<K, V>>> {
        self.config.validate()?;
        debug!(
            maximum_size = ?self.config.maximum_size,
            expire_after_access = ?self.config.expire_after_access,
            expire_after_write = ?self.config.expire_after_write,
            "building cache"
        );
        let ticker = self
            .ticker
            .unwrap_or_else(|| Arc::new(SystemTicker::new()));
        Ok(Arc::new(CacheStore::new(&self.config, ticker, self.listener)))
    }

    fn worker_pool(&self) -> Result<WorkerPool> {
        self.config.validate()?;
        let pool = match &self.executor {
            Some(handle) => WorkerPool::new(handle.clone()),
            None => WorkerPool::current()?,
        };
        Ok(match self.config.max_concurrent_loads {
            Some(limit) => pool.with_max_concurrency(limit),
            None => pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::Mutex;

    #[test]
    fn test_zero_duration_is_rejected() {
        let result: Result<Cache<u32, u32>> = CacheBuilder::new()
            .expire_after_access(Duration::ZERO)
            .build();

        assert!(matches!(result, Err(CacheError::CapacityConfig(_))));
    }

    #[test]
    fn test_zero_maximum_size_evicts_immediately() {
        let cache: Cache<u32, u32> = CacheBuilder::new().maximum_size(0).build().unwrap();

        cache.put(1, 1);

        assert_eq!(cache.get_if_present(&1), None);
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_async_without_runtime_fails() {
        let result: Result<AsyncCache<u32, u32>> = CacheBuilder::new().build_async();

        assert!(matches!(result, Err(CacheError::CapacityConfig(_))));
    }

    #[test]
    fn test_async_with_explicit_executor() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let cache: AsyncCache<u32, u32> = CacheBuilder::new()
            .executor(runtime.handle().clone())
            .build_async()
            .unwrap();

        let value = runtime.block_on(cache.get_with(1, |k| Ok(k + 1)));

        assert_eq!(value.unwrap(), 2);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result: Result<AsyncCache<u32, u32>> = CacheBuilder::new()
            .executor(runtime.handle().clone())
            .max_concurrent_loads(0)
            .build_async();

        assert!(matches!(result, Err(CacheError::CapacityConfig(_))));
    }

    #[test]
    fn test_removal_listener_sees_size_eviction() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cache: Cache<u32, u32> = CacheBuilder::new()
            .maximum_size(1)
            .removal_listener(move |key: &u32, _: &u32, cause: RemovalCause| {
                sink.lock().unwrap().push((*key, cause));
            })
            .build()
            .unwrap();

        cache.put(1, 1);
        cache.put(2, 2);

        assert_eq!(*seen.lock().unwrap(), vec![(1, RemovalCause::Size)]);
    }
}
