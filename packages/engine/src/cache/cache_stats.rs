//! Cache statistics and metrics tracking
//!
//! Counters are advisory: they are updated with relaxed atomics and may be
//! momentarily inconsistent with each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Statistics for the response cache
#[derive(Debug)]
pub struct CacheStats {
    /// Writes that committed
    pub write_success: AtomicU64,
    /// Writes that were aborted
    pub write_abort: AtomicU64,
    /// Lookups served from the cache
    pub hits: AtomicU64,
    /// Lookups that found nothing usable
    pub misses: AtomicU64,
    /// Cache creation time
    pub created_at: Instant,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub write_success: u64,
    pub write_abort: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Create new cache statistics
    #[must_use]
    pub fn new() -> Self {
        Self {
            write_success: AtomicU64::new(0),
            write_abort: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_success(&self) {
        self.write_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_abort(&self) {
        self.write_abort.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn write_success_count(&self) -> u64 {
        self.write_success.load(Ordering::Relaxed)
    }

    pub fn write_abort_count(&self) -> u64 {
        self.write_abort.load(Ordering::Relaxed)
    }

    /// Fraction of lookups that were hits
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count();
        let total = hits + self.miss_count();
        if total == 0 {
            0.0
        } else if total > (1u64 << 53) {
            // Scale in integers first to keep precision for huge counts.
            let scaled = (u128::from(hits) * 1_000_000_000) / u128::from(total);
            (scaled as f64) / 1_000_000_000.0
        } else {
            (hits as f64) / (total as f64)
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            write_success: self.write_success_count(),
            write_abort: self.write_abort_count(),
            hits: self.hit_count(),
            misses: self.miss_count(),
        }
    }

    /// Get cache age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_tracks_hits_and_misses() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_copies_counters() {
        let stats = CacheStats::default();
        stats.record_write_success();
        stats.record_write_abort();
        stats.record_write_abort();
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                write_success: 1,
                write_abort: 2,
                hits: 0,
                misses: 0,
            }
        );
    }
}
