//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache against a simple model under arbitrary
//! operation sequences.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheBuilder, LruPolicy, ManualTicker};

// == Test Configuration ==
const TEST_MAX_ENTRIES: u64 = 100;

// == Strategies ==
/// Generates cache keys from a small alphabet so operations collide
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-h]{1,2}".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,32}".prop_map(|s| s)
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, value: String },
    Get { key: String },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Put { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Remove { key }),
    ]
}

fn bounded(maximum: u64) -> Cache<String, String> {
    CacheBuilder::new()
        .maximum_size(maximum)
        .build()
        .expect("valid test configuration")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Without a size bound or expiry, the cache behaves exactly like a map,
    // and the statistics count every read.
    #[test]
    fn prop_matches_map_model(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let cache: Cache<String, String> = CacheBuilder::new().build().unwrap();
        let mut model: HashMap<String, String> = HashMap::new();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Put { key, value } => {
                    cache.put(key.clone(), value.clone());
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    let found = cache.get_if_present(&key);
                    if found.is_some() {
                        expected_hits += 1;
                    } else {
                        expected_misses += 1;
                    }
                    prop_assert_eq!(found.as_ref(), model.get(&key));
                }
                CacheOp::Remove { key } => {
                    prop_assert_eq!(cache.remove(&key), model.remove(&key));
                }
            }
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_entries, model.len() as u64, "Total entries mismatch");
    }

    // Storing a value then reading it back before any bound applies returns
    // the value stored last.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        value1 in value_strategy(),
        value2 in value_strategy()
    ) {
        let cache = bounded(TEST_MAX_ENTRIES);

        cache.put(key.clone(), value1);
        cache.put(key.clone(), value2.clone());

        prop_assert_eq!(cache.get_if_present(&key), Some(value2));
        prop_assert_eq!(cache.entry_count(), 1);
    }

    // After a remove, a read finds nothing.
    #[test]
    fn prop_remove_clears_entry(key in key_strategy(), value in value_strategy()) {
        let cache = bounded(TEST_MAX_ENTRIES);

        cache.put(key.clone(), value.clone());
        prop_assert_eq!(cache.remove(&key), Some(value));

        prop_assert_eq!(cache.get_if_present(&key), None);
    }

    // The entry count never exceeds the size bound once a write returns.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..200),
        maximum in 0u64..20
    ) {
        let cache = bounded(maximum);

        for (key, value) in entries {
            cache.put(key, value);
            prop_assert!(
                cache.entry_count() <= maximum,
                "Cache size {} exceeds max {}",
                cache.entry_count(),
                maximum
            );
        }
    }

    // The size bound evicts in least recently used order: a single-threaded
    // run matches an LRU model exactly.
    #[test]
    fn prop_lru_matches_model(
        ops in prop::collection::vec(cache_op_strategy(), 1..120),
        maximum in 1u64..8
    ) {
        let cache = bounded(maximum);
        let mut model: LruPolicy<String> = LruPolicy::new(Some(maximum));
        let mut values: HashMap<String, String> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Put { key, value } => {
                    cache.put(key.clone(), value.clone());
                    model.on_insert(key.clone());
                    values.insert(key, value);
                    for victim in model.evict_if_needed() {
                        values.remove(&victim);
                    }
                }
                CacheOp::Get { key } => {
                    if model.contains(&key) {
                        model.on_access(&key);
                    }
                    prop_assert_eq!(cache.get_if_present(&key), values.get(&key).cloned());
                }
                CacheOp::Remove { key } => {
                    model.on_remove(&key);
                    prop_assert_eq!(cache.remove(&key), values.remove(&key));
                }
            }
        }
        prop_assert_eq!(cache.entry_count(), model.len() as u64);
    }

    // A read refreshes the access time but never the write time.
    #[test]
    fn prop_reads_do_not_extend_write_expiry(
        key in key_strategy(),
        value in value_strategy(),
        reads in 0u32..10
    ) {
        let ticker = Arc::new(ManualTicker::new());
        let cache: Cache<String, String> = CacheBuilder::new()
            .expire_after_write(Duration::from_secs(10))
            .expire_after_access(Duration::from_secs(60))
            .ticker(ticker.clone())
            .build()
            .unwrap();

        cache.put(key.clone(), value.clone());
        for _ in 0..reads {
            ticker.advance(Duration::from_millis(900));
            prop_assert_eq!(cache.get_if_present(&key), Some(value.clone()));
        }
        ticker.advance(Duration::from_secs(10));

        prop_assert_eq!(cache.get_if_present(&key), None);
    }
}
