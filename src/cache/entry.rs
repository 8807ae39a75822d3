//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with timestamp metadata.

use std::sync::atomic::{AtomicU64, Ordering};

// == Cache Entry ==
/// A single cached value with the metadata needed for expiration and
/// stale-load detection.
///
/// Timestamps are ticker readings in nanoseconds. The last-access timestamp is
/// atomic so readers holding only a shared lock can refresh it.
#[derive(Debug)]
pub struct Entry<V> {
    /// The stored value
    value: V,
    /// Ticker reading when the value was written
    inserted_at: u64,
    /// Ticker reading of the latest read (or the write, if never read)
    last_access: AtomicU64,
    /// Write version, unique per cache
    generation: u64,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates an entry written at `now` with the given generation.
    pub fn new(value: V, now: u64, generation: u64) -> Self {
        Self {
            value,
            inserted_at: now,
            last_access: AtomicU64::new(now),
            generation,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn inserted_at(&self) -> u64 {
        self.inserted_at
    }

    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // == Touch ==
    /// Records a read at `now`.
    ///
    /// Concurrent readers may race; the timestamp never moves backwards.
    pub fn touch(&self, now: u64) {
        self.last_access.fetch_max(now, Ordering::Relaxed);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = Entry::new("test_value".to_string(), 1_000, 7);

        assert_eq!(entry.value(), "test_value");
        assert_eq!(entry.inserted_at(), 1_000);
        assert_eq!(entry.last_access(), 1_000);
        assert_eq!(entry.generation(), 7);
    }

    #[test]
    fn test_touch_updates_last_access_only() {
        let entry = Entry::new(1, 1_000, 1);

        entry.touch(5_000);

        assert_eq!(entry.last_access(), 5_000);
        assert_eq!(entry.inserted_at(), 1_000);
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let entry = Entry::new(1, 1_000, 1);

        entry.touch(9_000);
        entry.touch(4_000);

        assert_eq!(entry.last_access(), 9_000);
    }

    #[test]
    fn test_into_value() {
        let entry = Entry::new(vec![1, 2, 3], 0, 1);
        assert_eq!(entry.into_value(), vec![1, 2, 3]);
    }
}
