//! Cache of directory IVs keyed by backing path.
//!
//! Path translation needs the IV of every directory along a path, and reading
//! the IV file once per component would dominate lookup cost. The cache is
//! keyed by path, not by directory identity, so a path that is removed and
//! re-created would map to a stale IV. Every directory mutation therefore
//! flushes the whole cache rather than trying to evict precisely.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use super::DirIv;

/// Thread-safe cache mapping backing directory paths to their IVs.
///
/// # Thread Safety
///
/// `DirIvCache` uses `DashMap` internally and can be shared across threads.
/// Coherence with concurrent mutations is provided by the consistency lock,
/// not by the cache itself.
#[derive(Debug, Default)]
pub struct DirIvCache {
    entries: DashMap<PathBuf, DirIv>,
}

impl DirIvCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached IV.
    ///
    /// Returns `None` if the directory is not cached.
    #[inline]
    pub fn get(&self, dir: &Path) -> Option<DirIv> {
        self.entries.get(dir).map(|v| *v)
    }

    /// Store an IV in the cache.
    #[inline]
    pub fn insert(&self, dir: &Path, iv: DirIv) {
        self.entries.insert(dir.to_path_buf(), iv);
    }

    /// Drop every cached IV.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get cache statistics for monitoring and debugging.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached directory IVs
    pub entries: usize,
}
