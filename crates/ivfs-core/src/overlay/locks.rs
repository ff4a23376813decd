//! The consistency lock.
//!
//! Creating or removing a directory is never atomic on the backing store:
//! for a short window a directory may exist without its IV file, or its IV
//! file may sit under a temporary name in the parent. One coarse lock per
//! backing root serializes those windows.
//!
//! # Locking Strategy
//!
//! - **Exclusive**: held by create/remove around every inconsistent window.
//! - **Shared**: held by path translation while it reads IV files through the
//!   cache, so a stale IV can never be cached after a mutation flushed it.
//! - Listing reads its directory's IV without the lock. A mutator has to take
//!   the lock before it can make a directory inconsistent, so a listing that
//!   started earlier observes a state that existed at or before its own start.
//!
//! # Global Lock Registry
//!
//! [`LockRegistry`] hands out the same [`ConsistencyLock`] to every
//! [`IvFs`](super::IvFs) opened on the same backing directory.

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::trace;

use super::lock_metrics::{LockMetrics, LockMetricsSnapshot};

/// Global lock registry singleton.
static GLOBAL_LOCK_REGISTRY: OnceLock<LockRegistry> = OnceLock::new();

/// Registry mapping backing roots to their shared consistency locks.
#[derive(Debug, Default)]
pub struct LockRegistry {
    /// Map from canonicalized backing roots to their locks.
    locks: DashMap<PathBuf, Arc<ConsistencyLock>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Get the global lock registry singleton.
    pub fn global() -> &'static Self {
        GLOBAL_LOCK_REGISTRY.get_or_init(Self::new)
    }

    /// Get or create the lock for a backing root.
    ///
    /// The path is canonicalized so that different spellings of the same
    /// directory share one lock. If canonicalization fails the path is used
    /// as given.
    pub fn get_or_create(&self, cipherdir: &Path) -> Arc<ConsistencyLock> {
        let canonical_path = cipherdir
            .canonicalize()
            .unwrap_or_else(|_| cipherdir.to_path_buf());

        self.locks
            .entry(canonical_path)
            .or_insert_with(|| Arc::new(ConsistencyLock::new()))
            .clone()
    }

    /// Drop the registry's reference to a root's lock.
    ///
    /// Existing holders keep working with their clone.
    pub fn remove(&self, cipherdir: &Path) -> Option<Arc<ConsistencyLock>> {
        let canonical_path = cipherdir
            .canonicalize()
            .unwrap_or_else(|_| cipherdir.to_path_buf());
        self.locks.remove(&canonical_path).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// One filesystem-wide gate for directory-structure mutations.
#[derive(Debug, Default)]
pub struct ConsistencyLock {
    inner: RwLock<()>,
    metrics: LockMetrics,
}

impl ConsistencyLock {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(()),
            metrics: LockMetrics::new(),
        }
    }

    /// Acquire the lock for a mutation window.
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        if let Some(guard) = self.inner.try_write() {
            self.metrics.record_exclusive(false, 0);
            return guard;
        }
        let start = Instant::now();
        let guard = self.inner.write();
        let waited = elapsed_ns(start);
        trace!(waited_ns = waited, "Consistency lock contended (exclusive)");
        self.metrics.record_exclusive(true, waited);
        guard
    }

    /// Acquire the lock for a cached IV read.
    pub fn shared(&self) -> RwLockReadGuard<'_, ()> {
        if let Some(guard) = self.inner.try_read() {
            self.metrics.record_shared(false, 0);
            return guard;
        }
        let start = Instant::now();
        let guard = self.inner.read();
        let waited = elapsed_ns(start);
        trace!(waited_ns = waited, "Consistency lock contended (shared)");
        self.metrics.record_shared(true, waited);
        guard
    }

    /// Whether a mutation window is open right now.
    pub fn is_locked_exclusive(&self) -> bool {
        self.inner.is_locked_exclusive()
    }

    pub fn metrics(&self) -> LockMetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
