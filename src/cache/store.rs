//! Cache Store Module
//!
//! Main cache engine combining sharded storage with LRU tracking, lazy
//! expiration and single-flight load coordination.
//!
//! Lock order, when more than one is held: policy, then pending shard, then
//! entry shard. Readers only take an entry shard read lock and try-lock the
//! policy.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::cache::pending::{channel_load, PendingSlot, PendingTable, SharedLoad};
use crate::cache::{
    CacheStats, Entry, Expiry, LruPolicy, RemovalCause, RemovalListener, StatsCounter, Ticker,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, LoadError, Result};

const SHARD_COUNT: usize = 16;
/// Reads recorded while the policy was busy; excess reads are dropped.
const ACCESS_BUFFER_CAPACITY: usize = 128;
/// How many cold keys an eviction pass inspects for expiry.
const EXPIRY_SCAN_LIMIT: usize = 32;

type Shard<K, V> = RwLock<HashMap<K, Entry<V>>>;
type Removal<K, V> = (K, V, RemovalCause);

/// A live value or the computation producing it.
pub(crate) enum Lookup<V> {
    Present(V),
    Joined(SharedLoad<V>),
}

enum Read<V> {
    Live(V),
    Expired(u64),
    Absent,
}

// == Cache Store ==
/// Shared state behind every cache handle.
pub(crate) struct CacheStore<K, V> {
    /// Key-value storage
    shards: Box<[Shard<K, V>]>,
    /// In-flight computations, sharded like `shards`
    pending: PendingTable<K, V>,
    /// LRU access tracker
    policy: Mutex<LruPolicy<K>>,
    /// Accesses waiting for the policy lock
    access_buffer: Mutex<Vec<K>>,
    expiry: Expiry,
    ticker: Arc<dyn Ticker>,
    /// Source of entry and computation generations
    generation: AtomicU64,
    /// Performance statistics
    stats: StatsCounter,
    listener: Option<RemovalListener<K, V>>,
    hasher: RandomState,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a store from an already validated configuration.
    pub(crate) fn new(
        config: &CacheConfig,
        ticker: Arc<dyn Ticker>,
        listener: Option<RemovalListener<K, V>>,
    ) -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            pending: PendingTable::new(SHARD_COUNT),
            policy: Mutex::new(LruPolicy::new(config.maximum_size)),
            access_buffer: Mutex::new(Vec::new()),
            expiry: Expiry::new(config.expire_after_access, config.expire_after_write),
            ticker,
            generation: AtomicU64::new(0),
            stats: StatsCounter::default(),
            listener,
            hasher: RandomState::new(),
        }
    }

    fn shard_index(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) as usize) % SHARD_COUNT
    }

    fn now(&self) -> u64 {
        self.ticker.read()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    // == Get ==
    /// Returns the live value for `key`, refreshing its access time.
    ///
    /// An expired entry is never returned; it is removed on discovery.
    pub fn get(&self, key: &K) -> Option<V> {
        let index = self.shard_index(key);
        match self.read(index, key) {
            Read::Live(value) => {
                self.stats.record_hit();
                Some(value)
            }
            Read::Expired(generation) => {
                self.stats.record_miss();
                self.expire(index, key, generation);
                None
            }
            Read::Absent => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Checks for a live entry without touching it.
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.now();
        self.shards[self.shard_index(key)]
            .read()
            .get(key)
            .is_some_and(|entry| self.expiry.is_live(entry, now))
    }

    fn read(&self, index: usize, key: &K) -> Read<V> {
        let now = self.now();
        let outcome = {
            let shard = self.shards[index].read();
            match shard.get(key) {
                Some(entry) if self.expiry.is_live(entry, now) => {
                    entry.touch(now);
                    Read::Live(entry.value().clone())
                }
                Some(entry) => Read::Expired(entry.generation()),
                None => Read::Absent,
            }
        };
        if matches!(outcome, Read::Live(_)) {
            self.record_access(key);
        }
        outcome
    }

    fn record_access(&self, key: &K) {
        match self.policy.try_lock() {
            Some(mut policy) => {
                self.drain_access_buffer(&mut policy);
                policy.on_access(key);
            }
            None => {
                if let Some(mut buffer) = self.access_buffer.try_lock() {
                    if buffer.len() < ACCESS_BUFFER_CAPACITY {
                        buffer.push(key.clone());
                    }
                }
            }
        }
    }

    fn drain_access_buffer(&self, policy: &mut LruPolicy<K>) {
        let buffered = std::mem::take(&mut *self.access_buffer.lock());
        for key in &buffered {
            policy.on_access(key);
        }
    }

    // == Insert ==
    /// Stores a value, replacing any previous entry under a new generation.
    ///
    /// Any computation still in flight for the key is superseded: its result
    /// will be discarded when it lands.
    pub fn insert(&self, key: K, value: V) {
        let mut removals = Vec::new();
        {
            let mut policy = self.policy.lock();
            self.drain_access_buffer(&mut policy);

            let index = self.shard_index(&key);
            let now = self.now();
            let generation = self.next_generation();
            // held across both updates: no caller may join the superseded
            // load once the new value is readable
            let mut pending = self.pending.shard(index);
            let replaced = self.shards[index]
                .write()
                .insert(key.clone(), Entry::new(value, now, generation));
            if pending.remove(&key).is_some() {
                debug!(generation, "explicit write superseded an in-flight load");
            }
            drop(pending);
            if let Some(old) = replaced {
                removals.push(self.replaced(key.clone(), old, now));
            }

            policy.on_insert(key);
            self.evict(&mut policy, &mut removals);
        }
        self.notify(removals);
    }

    // == Remove ==
    /// Removes an entry, returning its value if it was still live.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut removals = Vec::new();
        let live = {
            let mut policy = self.policy.lock();
            self.drain_access_buffer(&mut policy);

            let index = self.shard_index(key);
            let removed = {
                let mut pending = self.pending.shard(index);
                let removed = self.shards[index].write().remove(key);
                pending.remove(key);
                removed
            };

            removed.and_then(|entry| {
                policy.on_remove(key);
                let live = self.expiry.is_live(&entry, self.now());
                let value = entry.into_value();
                let cause = if live {
                    RemovalCause::Explicit
                } else {
                    RemovalCause::Expired
                };
                removals.push((key.clone(), value.clone(), cause));
                live.then_some(value)
            })
        };
        self.notify(removals);
        live
    }

    // == Invalidate All ==
    /// Removes every entry and supersedes every in-flight computation.
    pub fn invalidate_all(&self) {
        let mut removals = Vec::new();
        {
            let mut policy = self.policy.lock();
            self.drain_access_buffer(&mut policy);
            self.pending.clear();

            let now = self.now();
            for shard in self.shards.iter() {
                for (key, entry) in shard.write().drain() {
                    let cause = if self.expiry.is_live(&entry, now) {
                        RemovalCause::Explicit
                    } else {
                        RemovalCause::Expired
                    };
                    removals.push((key, entry.into_value(), cause));
                }
            }
            policy.clear();
        }
        debug!(removed = removals.len(), "invalidated all entries");
        self.notify(removals);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        if !self.expiry.is_enabled() {
            return 0;
        }
        let mut removals = Vec::new();
        {
            let mut policy = self.policy.lock();
            self.drain_access_buffer(&mut policy);

            let now = self.now();
            for shard in self.shards.iter() {
                let mut shard = shard.write();
                let expired: Vec<K> = shard
                    .iter()
                    .filter(|(_, entry)| !self.expiry.is_live(entry, now))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in expired {
                    if let Some(entry) = shard.remove(&key) {
                        policy.on_remove(&key);
                        removals.push((key, entry.into_value(), RemovalCause::Expired));
                    }
                }
            }
        }
        let count = removals.len();
        self.notify(removals);
        count
    }

    /// Removes an entry found expired by a reader, unless it was rewritten
    /// in the meantime.
    fn expire(&self, index: usize, key: &K, generation: u64) {
        let mut removals = Vec::new();
        {
            let mut policy = self.policy.lock();
            let mut shard = self.shards[index].write();
            let stale = shard
                .get(key)
                .is_some_and(|entry| entry.generation() == generation);
            if stale {
                if let Some(entry) = shard.remove(key) {
                    policy.on_remove(key);
                    removals.push((key.clone(), entry.into_value(), RemovalCause::Expired));
                }
            }
        }
        self.notify(removals);
    }

    // == Evict ==
    /// Restores the size bound. Expired keys at the cold end go first.
    fn evict(&self, policy: &mut LruPolicy<K>, removals: &mut Vec<Removal<K, V>>) {
        if !policy.over_capacity() {
            return;
        }

        if self.expiry.is_enabled() {
            let now = self.now();
            let expired: Vec<K> = policy
                .iter_oldest()
                .take(EXPIRY_SCAN_LIMIT)
                .filter(|key| {
                    !self.shards[self.shard_index(key)]
                        .read()
                        .get(*key)
                        .is_some_and(|entry| self.expiry.is_live(entry, now))
                })
                .cloned()
                .collect();
            for key in expired {
                policy.on_remove(&key);
                let index = self.shard_index(&key);
                if let Some(entry) = self.shards[index].write().remove(&key) {
                    removals.push((key, entry.into_value(), RemovalCause::Expired));
                }
            }
        }

        let victims = policy.evict_if_needed();
        if victims.is_empty() {
            return;
        }
        trace!(count = victims.len(), "size eviction pass");
        for key in victims {
            let index = self.shard_index(&key);
            if let Some(entry) = self.shards[index].write().remove(&key) {
                self.stats.record_eviction();
                removals.push((key, entry.into_value(), RemovalCause::Size));
            }
        }
    }

    fn replaced(&self, key: K, old: Entry<V>, now: u64) -> Removal<K, V> {
        let cause = if self.expiry.is_live(&old, now) {
            RemovalCause::Replaced
        } else {
            RemovalCause::Expired
        };
        (key, old.into_value(), cause)
    }

    fn notify(&self, removals: Vec<Removal<K, V>>) {
        if let Some(listener) = &self.listener {
            for (key, value, cause) in removals {
                listener(&key, &value, cause);
            }
        }
    }

    // == Single-Flight ==
    /// Returns the live value, joins the computation already running for
    /// `key`, or registers a new one owned by the returned guard.
    ///
    /// Every lock is released on return, so the leader may run arbitrary
    /// code, including reads and writes on this cache, before finishing.
    pub(crate) fn start_or_join(self: &Arc<Self>, key: &K) -> Started<K, V> {
        let index = self.shard_index(key);
        let mut pending = self.pending.shard(index);

        if let Some(slot) = pending.get(key) {
            if !slot.is_abandoned() {
                self.stats.record_miss();
                return Started::Joined(slot.future.clone());
            }
        }
        if let Read::Live(value) = self.read(index, key) {
            self.stats.record_hit();
            return Started::Present(value);
        }

        self.stats.record_miss();
        let generation = self.next_generation();
        let (sender, future) = channel_load();
        pending.insert(
            key.clone(),
            PendingSlot {
                generation,
                future: future.clone(),
            },
        );
        drop(pending);
        Started::Leader(LoadGuard::new(
            Arc::clone(self),
            key.clone(),
            generation,
            sender,
            future,
        ))
    }

    /// Returns the live value or the computation in flight, without loading.
    pub(crate) fn get_or_pending(&self, key: &K) -> Option<Lookup<V>> {
        {
            let pending = self.pending.shard(self.shard_index(key));
            if let Some(slot) = pending.get(key).filter(|slot| !slot.is_abandoned()) {
                self.stats.record_hit();
                return Some(Lookup::Joined(slot.future.clone()));
            }
        }
        self.get(key).map(Lookup::Present)
    }

    /// Drops the current entry and registers a new computation as the key's
    /// pending value, superseding anything already in flight.
    pub(crate) fn replace_with_pending(self: &Arc<Self>, key: &K) -> LoadGuard<K, V> {
        let mut removals = Vec::new();
        let guard = {
            let mut policy = self.policy.lock();
            self.drain_access_buffer(&mut policy);

            let index = self.shard_index(key);
            let mut pending = self.pending.shard(index);
            let removed = self.shards[index].write().remove(key);

            let generation = self.next_generation();
            let (sender, future) = channel_load();
            pending.insert(
                key.clone(),
                PendingSlot {
                    generation,
                    future: future.clone(),
                },
            );
            drop(pending);

            if let Some(old) = removed {
                policy.on_remove(key);
                removals.push(self.replaced(key.clone(), old, self.now()));
            }
            LoadGuard::new(Arc::clone(self), key.clone(), generation, sender, future)
        };
        self.notify(removals);
        guard
    }

    /// Computes the value for `key` on the calling thread unless it is
    /// present or already being computed, in which case this waits for that
    /// computation instead.
    pub(crate) fn get_or_compute<F>(self: &Arc<Self>, key: &K, compute: F) -> Result<V>
    where
        F: FnOnce(&K) -> std::result::Result<V, LoadError>,
    {
        match self.start_or_join(key) {
            Started::Present(value) => Ok(value),
            Started::Joined(future) => futures::executor::block_on(future),
            Started::Leader(guard) => guard.finish(compute(key).map_err(CacheError::from)),
        }
    }

    // == Completion ==
    /// Records the outcome of the computation started under `generation`.
    pub(crate) fn complete(&self, key: &K, generation: u64, result: &Result<V>) {
        match result {
            Ok(value) => {
                self.stats.record_load_success();
                self.install(key, value.clone(), generation);
            }
            Err(error) => {
                self.stats.record_load_failure();
                debug!(generation, %error, "load failed, nothing cached");
                self.abandon(key, generation);
            }
        }
    }

    /// Installs a loaded value if its computation is still the current one.
    fn install(&self, key: &K, value: V, generation: u64) -> bool {
        let mut removals = Vec::new();
        let installed = {
            let mut policy = self.policy.lock();
            self.drain_access_buffer(&mut policy);

            let index = self.shard_index(key);
            let mut pending = self.pending.shard(index);
            let current = pending
                .get(key)
                .is_some_and(|slot| slot.generation == generation);
            if current {
                let now = self.now();
                let replaced = self.shards[index]
                    .write()
                    .insert(key.clone(), Entry::new(value, now, generation));
                pending.remove(key);
                drop(pending);

                if let Some(old) = replaced {
                    removals.push(self.replaced(key.clone(), old, now));
                }
                policy.on_insert(key.clone());
                self.evict(&mut policy, &mut removals);
            }
            current
        };
        if !installed {
            debug!(generation, "discarded superseded load result");
        }
        self.notify(removals);
        installed
    }

    /// Forgets the computation started under `generation`, if still current.
    pub(crate) fn abandon(&self, key: &K, generation: u64) {
        let mut pending = self.pending.shard(self.shard_index(key));
        if pending
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
        {
            pending.remove(key);
        }
    }

    // == Introspection ==
    /// Number of entries held, including expired ones not yet removed.
    pub fn entry_count(&self) -> u64 {
        let mut policy = self.policy.lock();
        self.drain_access_buffer(&mut policy);
        policy.len() as u64
    }

    /// Number of computations currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.entry_count())
    }
}

/// Result of [`CacheStore::start_or_join`].
pub(crate) enum Started<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Present(V),
    Joined(SharedLoad<V>),
    Leader(LoadGuard<K, V>),
}

// == Load Guard ==
/// Ownership of a registered computation.
///
/// Finishing the guard installs the value and wakes waiters. Dropping it
/// unfinished (the loader panicked, or its task was dropped with the runtime)
/// frees the slot so the next request loads again; waiters see
/// [`CacheError::Cancelled`].
pub(crate) struct LoadGuard<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    store: Arc<CacheStore<K, V>>,
    key: K,
    generation: u64,
    sender: Option<oneshot::Sender<Result<V>>>,
    future: SharedLoad<V>,
    finished: bool,
}

impl<K, V> LoadGuard<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(
        store: Arc<CacheStore<K, V>>,
        key: K,
        generation: u64,
        sender: oneshot::Sender<Result<V>>,
        future: SharedLoad<V>,
    ) -> Self {
        Self {
            store,
            key,
            generation,
            sender: Some(sender),
            future,
            finished: false,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// The future every waiter on this computation resolves through.
    pub fn shared(&self) -> SharedLoad<V> {
        self.future.clone()
    }

    /// Publishes `result` to the store and to every waiter.
    pub fn finish(mut self, result: Result<V>) -> Result<V> {
        self.store.complete(&self.key, self.generation, &result);
        self.finished = true;
        if let Some(sender) = self.sender.take() {
            // every waiter may have gone away
            let _ = sender.send(result.clone());
        }
        result
    }
}

impl<K, V> Drop for LoadGuard<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.finished {
            debug!(generation = self.generation, "load dropped before completion");
            self.store.abandon(&self.key, self.generation);
        }
    }
}
