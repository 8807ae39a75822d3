//! Expiry Cleanup Task
//!
//! Background task that periodically removes expired cache entries, so idle
//! caches release memory without waiting for a read to find them.

use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{AsyncCache, AsyncLoadingCache, Cache, LoadingCache};

/// A cache the cleanup task can sweep.
pub trait CleanupTarget: Send + Sync + 'static {
    /// Removes expired entries, returning how many were removed.
    fn cleanup_expired(&self) -> usize;
}

macro_rules! cleanup_target {
    ($($cache:ident),*) => {
        $(
            impl<K, V> CleanupTarget for $cache<K, V>
            where
                K: Eq + Hash + Clone + Send + Sync + 'static,
                V: Clone + Send + Sync + 'static,
            {
                fn cleanup_expired(&self) -> usize {
                    $cache::cleanup_expired(self)
                }
            }
        )*
    };
}

cleanup_target!(Cache, LoadingCache, AsyncCache, AsyncLoadingCache);

/// Spawns a background task that periodically cleans up expired entries.
///
/// The task sweeps once per `interval` until aborted through the returned
/// handle. Pass a clone of the cache; clones share entries.
///
/// # Example
/// ```ignore
/// let cache: Cache<String, String> = CacheBuilder::new()
///     .expire_after_write(Duration::from_secs(60))
///     .build()?;
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<C>(cache: C, interval: Duration) -> JoinHandle<()>
where
    C: CleanupTarget,
{
    tokio::spawn(async move {
        info!(
            "Starting expiry cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.cleanup_expired();

            if removed > 0 {
                info!("Expiry cleanup: removed {} expired entries", removed);
            } else {
                debug!("Expiry cleanup: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBuilder, ManualTicker};
    use std::sync::Arc;

    fn cache_with_ticker() -> (Cache<String, String>, Arc<ManualTicker>) {
        let ticker = Arc::new(ManualTicker::new());
        let cache = CacheBuilder::new()
            .expire_after_write(Duration::from_secs(1))
            .ticker(ticker.clone())
            .build()
            .unwrap();
        (cache, ticker)
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let (cache, ticker) = cache_with_ticker();
        cache.put("expire_soon".to_string(), "value".to_string());
        ticker.advance(Duration::from_secs(2));

        let handle = spawn_cleanup_task(cache.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // counted without touching the entry
        assert_eq!(cache.entry_count(), 0, "Expired entry should have been cleaned up");

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let (cache, _ticker) = cache_with_ticker();
        cache.put("long_lived".to_string(), "value".to_string());

        let handle = spawn_cleanup_task(cache.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            cache.get_if_present(&"long_lived".to_string()),
            Some("value".to_string()),
            "Valid entry should not be removed"
        );

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps_async_cache() {
        let ticker = Arc::new(ManualTicker::new());
        let cache: AsyncCache<u32, u32> = CacheBuilder::new()
            .expire_after_access(Duration::from_secs(1))
            .ticker(ticker.clone())
            .build_async()
            .unwrap();
        cache.put(1, 1);
        ticker.advance(Duration::from_secs(1));

        let handle = spawn_cleanup_task(cache.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.entry_count(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let (cache, _ticker) = cache_with_ticker();

        let handle = spawn_cleanup_task(cache, Duration::from_secs(1));

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
