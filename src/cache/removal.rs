//! Removal notifications.

use std::sync::Arc;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// Removed by `remove` or `invalidate_all`
    Explicit,
    /// Overwritten by `put`, a load, or `put_async`
    Replaced,
    /// A time bound elapsed
    Expired,
    /// Evicted to respect the size bound
    Size,
}

impl RemovalCause {
    /// True for removals the caller did not ask for.
    pub fn was_evicted(&self) -> bool {
        matches!(self, RemovalCause::Expired | RemovalCause::Size)
    }
}

/// Callback invoked for every entry leaving the cache, after internal locks
/// are released.
pub type RemovalListener<K, V> = Arc<dyn Fn(&K, &V, RemovalCause) + Send + Sync>;
