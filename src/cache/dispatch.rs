//! Async Dispatch Module
//!
//! Runs asynchronous loads on a worker pool and hands every caller asking for
//! the same key a handle to the same in-flight computation.

use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::cache::pending::SharedLoad;
use crate::cache::store::{CacheStore, LoadGuard, Lookup, Started};
use crate::error::{CacheError, LoadError, Result};

// == Worker Pool ==
/// Where asynchronous loads run: a Tokio runtime, optionally with a cap on
/// how many loads may run at once. Excess loads queue for a permit; callers
/// are never blocked.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    handle: Handle,
    permits: Option<Arc<Semaphore>>,
}

impl WorkerPool {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            permits: None,
        }
    }

    /// Uses the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        Handle::try_current().map(Self::new).map_err(|_| {
            CacheError::CapacityConfig(
                "asynchronous caches need an executor: pass one or build inside a Tokio runtime"
                    .to_string(),
            )
        })
    }

    /// Caps the number of loads running at once.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(limit)));
        self
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns `task`, waiting for a permit inside the task when capped.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();
        self.handle.spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            task.await
        })
    }
}

// == Cache Future ==
/// Handle to a value that is present or being computed.
///
/// Clones observe the same result. Dropping a handle only drops this
/// caller's view: the computation keeps running for everyone else and its
/// result is still cached.
#[must_use = "futures do nothing unless polled"]
pub struct CacheFuture<V> {
    inner: SharedLoad<V>,
}

impl<V> CacheFuture<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_shared(inner: SharedLoad<V>) -> Self {
        Self { inner }
    }

    /// An already resolved handle.
    pub fn ready(value: V) -> Self {
        Self::from_shared(future::ready(Ok(value)).boxed().shared())
    }

    /// Returns the result if the computation has finished and a handle has
    /// observed it.
    pub fn peek(&self) -> Option<&Result<V>> {
        self.inner.peek()
    }
}

impl<V> Clone for CacheFuture<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Future for CacheFuture<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Output = Result<V>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl<V> From<Lookup<V>> for CacheFuture<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn from(lookup: Lookup<V>) -> Self {
        match lookup {
            Lookup::Present(value) => CacheFuture::ready(value),
            Lookup::Joined(shared) => CacheFuture::from_shared(shared),
        }
    }
}

// == Dispatch ==
/// Returns the present value, joins the load in flight, or starts `load`.
///
/// `load` is called on the calling thread once the key's slot is registered
/// and every cache lock is released, so it may itself use the cache. The
/// future it returns runs on the pool and installs its result before
/// resolving, so a waiter that sees the value can also read it from the
/// cache.
pub(crate) fn get_or_load<K, V, L>(
    store: &Arc<CacheStore<K, V>>,
    pool: &WorkerPool,
    key: K,
    load: L,
) -> CacheFuture<V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: FnOnce(K, &Handle) -> BoxFuture<'static, std::result::Result<V, LoadError>>,
{
    match store.start_or_join(&key) {
        Started::Present(value) => CacheFuture::ready(value),
        Started::Joined(shared) => CacheFuture::from_shared(shared),
        Started::Leader(guard) => {
            let shared = guard.shared();
            let load = load(key, pool.handle());
            spawn_load(pool, guard, load);
            CacheFuture::from_shared(shared)
        }
    }
}

/// Registers `value` as the key's pending value, replacing whatever the
/// cache held.
pub(crate) fn put_future<K, V, F>(
    store: &Arc<CacheStore<K, V>>,
    pool: &WorkerPool,
    key: K,
    value: F,
) -> CacheFuture<V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Future<Output = std::result::Result<V, LoadError>> + Send + 'static,
{
    let guard = store.replace_with_pending(&key);
    let shared = guard.shared();
    spawn_load(pool, guard, value.boxed());
    CacheFuture::from_shared(shared)
}

/// Drives `load` on the pool and publishes its outcome through `guard`.
///
/// A panicking load resolves waiters with a load error. A task dropped before
/// finishing (its runtime shut down) drops the guard, which frees the slot
/// and resolves waiters with [`CacheError::Cancelled`].
fn spawn_load<K, V>(
    pool: &WorkerPool,
    guard: LoadGuard<K, V>,
    load: BoxFuture<'static, std::result::Result<V, LoadError>>,
) where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pool.spawn(async move {
        let result = match AssertUnwindSafe(load).catch_unwind().await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => {
                warn!("async loader panicked");
                Err(CacheError::Load(LoadError::msg("loader panicked")))
            }
        };
        // waiters observe the result through the shared future
        let _ = guard.finish(result);
    });
}
