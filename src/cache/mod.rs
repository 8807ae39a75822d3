//! Cache Module
//!
//! In-process caches with size bounded LRU eviction, access and write
//! expiration, and single-flight loading.
//!
//! Four kinds are built from a [`CacheBuilder`]:
//! - [`Cache`]: synchronous, values computed by a function passed per call
//! - [`LoadingCache`]: synchronous, values computed by its [`Loader`]
//! - [`AsyncCache`]: values computed on a worker pool, returned as [`CacheFuture`]s
//! - [`AsyncLoadingCache`]: asynchronous, values computed by its [`AsyncLoader`]

mod async_cache;
mod builder;
mod dispatch;
mod entry;
mod expiry;
mod loader;
mod loading;
mod lru;
mod manual;
mod pending;
mod removal;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use async_cache::{AsyncCache, AsyncLoadingCache};
pub use builder::CacheBuilder;
pub use dispatch::{CacheFuture, WorkerPool};
pub use expiry::{ManualTicker, SystemTicker, Ticker};
pub use loader::{AsyncLoadFn, AsyncLoader, BatchLoadFn, LoadFn, Loader};
pub use loading::LoadingCache;
pub use manual::Cache;
pub use removal::{RemovalCause, RemovalListener};
pub use stats::CacheStats;

pub(crate) use entry::Entry;
pub(crate) use expiry::Expiry;
pub(crate) use lru::LruPolicy;
pub(crate) use stats::StatsCounter;
