//! Expiration Clock Module
//!
//! Time sources and the liveness rule applied to every read.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::cache::Entry;

// == Ticker ==
/// Monotonic time source, in nanoseconds since an arbitrary origin.
pub trait Ticker: Send + Sync + fmt::Debug {
    fn read(&self) -> u64;
}

/// Ticker backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemTicker {
    origin: Instant,
}

impl SystemTicker {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker for SystemTicker {
    fn read(&self) -> u64 {
        nanos(self.origin.elapsed())
    }
}

/// Ticker that only moves when told to. Intended for tests.
#[derive(Debug, Default)]
pub struct ManualTicker {
    nanos: AtomicU64,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `by`, stopping at the end of the clock.
    pub fn advance(&self, by: Duration) {
        let by = nanos(by);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(by))
            });
    }
}

impl Ticker for ManualTicker {
    fn read(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

/// Whole nanoseconds in `duration`, saturating at `u64::MAX` (about 584
/// years).
fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

// == Expiry ==
/// Expiration bounds of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expiry {
    after_access: Option<u64>,
    after_write: Option<u64>,
}

impl Expiry {
    pub fn new(after_access: Option<Duration>, after_write: Option<Duration>) -> Self {
        Self {
            after_access: after_access.map(nanos),
            after_write: after_write.map(nanos),
        }
    }

    /// Returns true if at least one bound is configured.
    pub fn is_enabled(&self) -> bool {
        self.after_access.is_some() || self.after_write.is_some()
    }

    // == Is Live ==
    /// Checks whether `entry` may still be returned at `now`.
    ///
    /// Boundary condition: once a full bound has elapsed the entry is dead,
    /// i.e. an entry idle for exactly `expire_after_access` is expired.
    pub fn is_live<V>(&self, entry: &Entry<V>, now: u64) -> bool {
        if let Some(limit) = self.after_access {
            if now.saturating_sub(entry.last_access()) >= limit {
                return false;
            }
        }
        if let Some(limit) = self.after_write {
            if now.saturating_sub(entry.inserted_at()) >= limit {
                return false;
            }
        }
        true
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: u64 = 1_000_000_000;

    #[test]
    fn test_no_bounds_is_always_live() {
        let expiry = Expiry::default();
        let entry = Entry::new((), 0, 1);

        assert!(!expiry.is_enabled());
        assert!(expiry.is_live(&entry, u64::MAX));
    }

    #[test]
    fn test_access_expiry_boundary() {
        let expiry = Expiry::new(Some(Duration::from_secs(2)), None);
        let entry = Entry::new((), 0, 1);

        assert!(expiry.is_live(&entry, 2 * SECOND - 1));
        assert!(!expiry.is_live(&entry, 2 * SECOND));
    }

    #[test]
    fn test_access_extends_access_expiry() {
        let expiry = Expiry::new(Some(Duration::from_secs(2)), None);
        let entry = Entry::new((), 0, 1);

        entry.touch(SECOND);

        assert!(expiry.is_live(&entry, 2 * SECOND + SECOND / 2));
        assert!(!expiry.is_live(&entry, 3 * SECOND));
    }

    #[test]
    fn test_access_does_not_extend_write_expiry() {
        let expiry = Expiry::new(None, Some(Duration::from_secs(1)));
        let entry = Entry::new((), 0, 1);

        entry.touch(SECOND / 2);
        entry.touch(SECOND - 1);

        assert!(expiry.is_live(&entry, SECOND - 1));
        assert!(!expiry.is_live(&entry, SECOND));
    }

    #[test]
    fn test_both_bounds_first_wins() {
        let expiry = Expiry::new(Some(Duration::from_secs(5)), Some(Duration::from_secs(1)));
        let entry = Entry::new((), 0, 1);
        entry.touch(SECOND / 2);

        assert!(!expiry.is_live(&entry, SECOND));
    }

    #[test]
    fn test_manual_ticker_advances() {
        let ticker = ManualTicker::new();
        assert_eq!(ticker.read(), 0);

        ticker.advance(Duration::from_millis(1500));
        assert_eq!(ticker.read(), 1_500_000_000);
    }

    #[test]
    fn test_manual_ticker_saturates() {
        let ticker = ManualTicker::new();
        ticker.advance(Duration::MAX);
        ticker.advance(Duration::from_secs(1));

        assert_eq!(ticker.read(), u64::MAX);
    }

    #[test]
    fn test_huge_bounds_never_expire() {
        // 2^58 ms overflows u64 nanoseconds
        let huge = Duration::from_millis(1 << 58);
        let expiry = Expiry::new(Some(huge), Some(Duration::MAX));
        let entry = Entry::new((), 0, 1);

        assert!(expiry.is_live(&entry, 1));
        assert!(expiry.is_live(&entry, 365 * 24 * 3600 * SECOND));
    }

    #[test]
    fn test_system_ticker_is_monotonic() {
        let ticker = SystemTicker::new();
        let first = ticker.read();
        let second = ticker.read();
        assert!(second >= first);
    }
}
