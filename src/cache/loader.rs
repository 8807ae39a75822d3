//! Loader Module
//!
//! The computations a cache runs on a miss. Loaders are a closed set of
//! variants chosen when the cache is built.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;

use crate::error::LoadError;

pub type LoadFn<K, V> = dyn Fn(&K) -> Result<V, LoadError> + Send + Sync;
pub type BatchLoadFn<K, V> = dyn Fn(&[K]) -> Result<HashMap<K, V>, LoadError> + Send + Sync;
pub type AsyncLoadFn<K, V> =
    dyn Fn(K, Handle) -> BoxFuture<'static, Result<V, LoadError>> + Send + Sync;

// == Loader ==
/// Synchronous loader, run on the calling thread.
pub enum Loader<K, V> {
    /// One invocation per missing key
    PerKey(Arc<LoadFn<K, V>>),
    /// Per-key loads for `get`, one bulk call for `get_all`
    Batch {
        load: Arc<LoadFn<K, V>>,
        load_all: Arc<BatchLoadFn<K, V>>,
    },
}

impl<K, V> Loader<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn from_fn<F>(load: F) -> Self
    where
        F: Fn(&K) -> Result<V, LoadError> + Send + Sync + 'static,
    {
        Loader::PerKey(Arc::new(load))
    }

    pub fn batched<F, B>(load: F, load_all: B) -> Self
    where
        F: Fn(&K) -> Result<V, LoadError> + Send + Sync + 'static,
        B: Fn(&[K]) -> Result<HashMap<K, V>, LoadError> + Send + Sync + 'static,
    {
        Loader::Batch {
            load: Arc::new(load),
            load_all: Arc::new(load_all),
        }
    }

    pub fn load(&self, key: &K) -> Result<V, LoadError> {
        match self {
            Loader::PerKey(load) | Loader::Batch { load, .. } => load(key),
        }
    }

    /// Loads several keys, returning one result per key in `keys` order.
    ///
    /// A batch loader that omits a requested key fails that key; extra keys it
    /// returns are ignored.
    pub fn load_many(&self, keys: &[K]) -> Vec<Result<V, LoadError>> {
        match self {
            Loader::PerKey(load) => keys.iter().map(|key| load(key)).collect(),
            Loader::Batch { load_all, .. } => match load_all(keys) {
                Ok(mut values) => keys
                    .iter()
                    .map(|key| {
                        values
                            .remove(key)
                            .ok_or_else(|| LoadError::msg("batch loader returned no value for key"))
                    })
                    .collect(),
                Err(error) => keys.iter().map(|_| Err(error.clone())).collect(),
            },
        }
    }
}

impl<K, V> Clone for Loader<K, V> {
    fn clone(&self) -> Self {
        match self {
            Loader::PerKey(load) => Loader::PerKey(Arc::clone(load)),
            Loader::Batch { load, load_all } => Loader::Batch {
                load: Arc::clone(load),
                load_all: Arc::clone(load_all),
            },
        }
    }
}

impl<K, V> fmt::Debug for Loader<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loader::PerKey(_) => f.write_str("Loader::PerKey"),
            Loader::Batch { .. } => f.write_str("Loader::Batch"),
        }
    }
}

// == Async Loader ==
/// Asynchronous loader, run on the cache's worker pool.
pub enum AsyncLoader<K, V> {
    /// Produces a future; receives the pool's runtime handle
    Future(Arc<AsyncLoadFn<K, V>>),
    /// A blocking function, run on the runtime's blocking threads
    Blocking(Arc<LoadFn<K, V>>),
}

impl<K, V> AsyncLoader<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Loads through the future returned by `load`.
    ///
    /// `load` is called synchronously on the thread that requested the key,
    /// once the cache has registered the load and released its locks, so it
    /// may use the cache. The returned future runs on the worker pool.
    pub fn from_fn<F, Fut>(load: F) -> Self
    where
        F: Fn(K, Handle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, LoadError>> + Send + 'static,
    {
        AsyncLoader::Future(Arc::new(move |key, handle| load(key, handle).boxed()))
    }

    pub fn blocking<F>(load: F) -> Self
    where
        F: Fn(&K) -> Result<V, LoadError> + Send + Sync + 'static,
    {
        AsyncLoader::Blocking(Arc::new(load))
    }

    /// Builds the future computing `key`. Nothing runs until it is polled.
    pub fn load(&self, key: K, handle: &Handle) -> BoxFuture<'static, Result<V, LoadError>> {
        match self {
            AsyncLoader::Future(load) => load(key, handle.clone()),
            AsyncLoader::Blocking(load) => {
                let load = Arc::clone(load);
                blocking_load(handle.clone(), move || load(&key))
            }
        }
    }
}

fn blocking_load<V, F>(handle: Handle, call: F) -> BoxFuture<'static, Result<V, LoadError>>
where
    V: Send + 'static,
    F: FnOnce() -> Result<V, LoadError> + Send + 'static,
{
    async move {
        match handle.spawn_blocking(call).await {
            Ok(result) => result,
            Err(error) => Err(LoadError::new(error)),
        }
    }
    .boxed()
}

impl<K, V> Clone for AsyncLoader<K, V> {
    fn clone(&self) -> Self {
        match self {
            AsyncLoader::Future(load) => AsyncLoader::Future(Arc::clone(load)),
            AsyncLoader::Blocking(load) => AsyncLoader::Blocking(Arc::clone(load)),
        }
    }
}

impl<K, V> fmt::Debug for AsyncLoader<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncLoader::Future(_) => f.write_str("AsyncLoader::Future"),
            AsyncLoader::Blocking(_) => f.write_str("AsyncLoader::Blocking"),
        }
    }
}
