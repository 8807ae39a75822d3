//! Pending Computation Module
//!
//! Per-key single-flight slots for in-flight loads. The table is sharded and
//! each shard has its own lock, so unrelated keys never wait on each other.

use std::collections::HashMap;
use std::hash::Hash;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, MutexGuard};

use crate::error::{CacheError, Result};

/// A load result that any number of waiters can await.
pub(crate) type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;

// == Pending Slot ==
/// One in-flight computation.
pub(crate) struct PendingSlot<V> {
    /// Generation the computation was started under
    pub generation: u64,
    /// Handle shared by every waiter
    pub future: SharedLoad<V>,
}

impl<V> PendingSlot<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// A slot whose shared future already failed is a leftover from a
    /// computation that never cleaned up (its task was dropped before
    /// running). It must not be joined.
    pub fn is_abandoned(&self) -> bool {
        matches!(self.future.peek(), Some(Err(_)))
    }
}

// == Pending Table ==
pub(crate) struct PendingTable<K, V> {
    shards: Box<[Mutex<HashMap<K, PendingSlot<V>>>]>,
}

impl<K, V> PendingTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new(shard_count: usize) -> Self {
        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    /// Locks the shard at `index`. Callers compute the index with the same
    /// hash as the entry shards.
    pub fn shard(&self, index: usize) -> MutexGuard<'_, HashMap<K, PendingSlot<V>>> {
        self.shards[index].lock()
    }

    /// Number of computations in flight.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Drops every slot. Holders of the shared futures still see their results.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }
}

/// Builds the shared side of a computation that is driven by the caller
/// holding `sender`. If the sender is dropped unused, waiters see
/// [`CacheError::Cancelled`].
pub(crate) fn channel_load<V>() -> (oneshot::Sender<Result<V>>, SharedLoad<V>)
where
    V: Clone + Send + Sync + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let future = receiver
        .map(|received| received.unwrap_or(Err(CacheError::Cancelled)))
        .boxed()
        .shared();
    (sender, future)
}
