//! Contention metrics for the consistency lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for lock acquisition and contention.
///
/// Thread-safe counters using atomic operations for lock-free updates.
#[derive(Debug, Default)]
pub struct LockMetrics {
    /// Exclusive acquisitions taken without waiting
    pub exclusive_fast: AtomicU64,

    /// Exclusive acquisitions that had to wait
    pub exclusive_contended: AtomicU64,

    /// Shared acquisitions taken without waiting
    pub shared_fast: AtomicU64,

    /// Shared acquisitions that had to wait
    pub shared_contended: AtomicU64,

    /// Time spent waiting for contended acquisitions (nanoseconds)
    pub wait_time_ns: AtomicU64,
}

impl LockMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_exclusive(&self, contended: bool, wait_ns: u64) {
        if contended {
            self.exclusive_contended.fetch_add(1, Ordering::Relaxed);
            self.wait_time_ns.fetch_add(wait_ns, Ordering::Relaxed);
        } else {
            self.exclusive_fast.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_shared(&self, contended: bool, wait_ns: u64) {
        if contended {
            self.shared_contended.fetch_add(1, Ordering::Relaxed);
            self.wait_time_ns.fetch_add(wait_ns, Ordering::Relaxed);
        } else {
            self.shared_fast.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> LockMetricsSnapshot {
        LockMetricsSnapshot {
            exclusive_fast: self.exclusive_fast.load(Ordering::Relaxed),
            exclusive_contended: self.exclusive_contended.load(Ordering::Relaxed),
            shared_fast: self.shared_fast.load(Ordering::Relaxed),
            shared_contended: self.shared_contended.load(Ordering::Relaxed),
            wait_time_ns: self.wait_time_ns.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.exclusive_fast.store(0, Ordering::Relaxed);
        self.exclusive_contended.store(0, Ordering::Relaxed);
        self.shared_fast.store(0, Ordering::Relaxed);
        self.shared_contended.store(0, Ordering::Relaxed);
        self.wait_time_ns.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of lock metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockMetricsSnapshot {
    pub exclusive_fast: u64,
    pub exclusive_contended: u64,
    pub shared_fast: u64,
    pub shared_contended: u64,
    pub wait_time_ns: u64,
}

impl LockMetricsSnapshot {
    pub fn exclusive_total(&self) -> u64 {
        self.exclusive_fast + self.exclusive_contended
    }

    pub fn shared_total(&self) -> u64 {
        self.shared_fast + self.shared_contended
    }

    /// Fraction of acquisitions that had to wait (0.0 to 1.0)
    pub fn contention_rate(&self) -> f64 {
        let total = self.exclusive_total() + self.shared_total();
        if total == 0 {
            0.0
        } else {
            (self.exclusive_contended + self.shared_contended) as f64 / total as f64
        }
    }
}
