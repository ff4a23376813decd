//! Per-directory initialization vectors.
//!
//! Every directory (in DirIV mode) holds a reserved file, [`DIRIV_FILENAME`],
//! with 16 random bytes. Those bytes key the encryption of every entry name
//! directly inside the directory. [`DirIvStore`] owns the file's lifecycle and
//! the process-wide [`DirIvCache`].

pub mod cache;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, trace};

use crate::fs::backing::RawFs;

pub use cache::{CacheStats, DirIvCache};

/// Reserved name of the IV file inside every directory.
pub const DIRIV_FILENAME: &str = "ivfs.diriv";

/// Prefix of the temporary name an IV file gets in the parent while its
/// directory is being removed.
pub const DIRIV_TEMP_PREFIX: &str = "ivfs.diriv.rmdir.";

/// Size of a directory IV in bytes.
pub const DIRIV_LEN: usize = 16;

/// Permission bits of IV files.
const DIRIV_MODE: u32 = 0o400;

/// A directory's initialization vector.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirIv([u8; DIRIV_LEN]);

impl DirIv {
    /// The fixed IV used for every directory when DirIV mode is off.
    pub const ZERO: DirIv = DirIv([0u8; DIRIV_LEN]);

    pub fn from_bytes(bytes: [u8; DIRIV_LEN]) -> Self {
        DirIv(bytes)
    }

    /// A fresh IV from a cryptographically secure RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; DIRIV_LEN];
        rand::rng().fill_bytes(&mut bytes);
        DirIv(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; DIRIV_LEN] {
        &self.0
    }
}

impl fmt::Debug for DirIv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirIv({})", hex::encode(self.0))
    }
}

/// Errors from reading or writing IV files.
#[derive(Error, Debug)]
pub enum DirIvError {
    #[error("IO error on IV file of {path}: {source}", path = .dir.display())]
    Io {
        #[source]
        source: io::Error,
        dir: PathBuf,
    },

    #[error("IV file of {path} has {len} bytes, expected {expected}", path = .dir.display(), expected = DIRIV_LEN)]
    InvalidLength { dir: PathBuf, len: usize },
}

impl DirIvError {
    /// The underlying I/O error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            DirIvError::Io { source, .. } => Some(source),
            DirIvError::InvalidLength { .. } => None,
        }
    }
}

/// Owner of IV files and of the IV cache.
///
/// No other component touches the cache: callers go through
/// [`lookup`](Self::lookup) and [`invalidate`](Self::invalidate).
#[derive(Debug)]
pub struct DirIvStore {
    raw: Arc<dyn RawFs>,
    cache: DirIvCache,
}

impl DirIvStore {
    pub fn new(raw: Arc<dyn RawFs>) -> Self {
        Self {
            raw,
            cache: DirIvCache::new(),
        }
    }

    /// Write a fresh random IV file into a directory that was just created.
    ///
    /// Must only be called while the consistency lock is held exclusively.
    pub fn create_iv(&self, dir: &Path) -> Result<(), DirIvError> {
        let iv = DirIv::random();
        trace!(dir = %dir.display(), "Writing IV file");
        self.raw
            .write_new_file(&dir.join(DIRIV_FILENAME), iv.as_bytes(), DIRIV_MODE)
            .map_err(|source| DirIvError::Io {
                source,
                dir: dir.to_path_buf(),
            })
    }

    /// Read a directory's IV from disk, bypassing the cache.
    pub fn read_iv(&self, dir: &Path) -> Result<DirIv, DirIvError> {
        let content = self
            .raw
            .read_file(&dir.join(DIRIV_FILENAME))
            .map_err(|source| DirIvError::Io {
                source,
                dir: dir.to_path_buf(),
            })?;

        let bytes: [u8; DIRIV_LEN] =
            content
                .as_slice()
                .try_into()
                .map_err(|_| DirIvError::InvalidLength {
                    dir: dir.to_path_buf(),
                    len: content.len(),
                })?;
        Ok(DirIv(bytes))
    }

    /// Read a directory's IV through the cache.
    ///
    /// Callers must hold the consistency lock (shared is enough) so that a
    /// concurrent mutation cannot flush the cache between the read and the
    /// insert.
    pub fn lookup(&self, dir: &Path) -> Result<DirIv, DirIvError> {
        if let Some(iv) = self.cache.get(dir) {
            trace!(dir = %dir.display(), "IV cache hit");
            return Ok(iv);
        }
        let iv = self.read_iv(dir)?;
        self.cache.insert(dir, iv);
        Ok(iv)
    }

    /// Evict `dir` from the cache.
    ///
    /// The cache is keyed by path, so the whole cache is flushed: any cached
    /// descendant of `dir` would be just as stale.
    pub fn invalidate(&self, dir: &Path) {
        debug!(dir = %dir.display(), "Flushing IV cache");
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
