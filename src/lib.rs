//! Mini Cache - An embeddable in-process cache
//!
//! Provides keyed caching with LRU eviction, access and write expiration,
//! and single-flight loading, both synchronous and on a Tokio runtime.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{
    AsyncCache, AsyncLoader, AsyncLoadingCache, Cache, CacheBuilder, CacheFuture, CacheStats,
    Loader, LoadingCache, RemovalCause,
};
pub use config::CacheConfig;
pub use error::{CacheError, LoadError, Result};
pub use tasks::spawn_cleanup_task;
