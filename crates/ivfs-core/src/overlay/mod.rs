//! The directory-entry layer of the overlay.
//!
//! [`IvFs`] maps plaintext directory operations onto the encrypted backing
//! store:
//!
//! - [`IvFs::create_directory`] creates the directory and its IV file (and,
//!   for long encrypted names, the companion file in the parent)
//! - [`IvFs::remove_directory`] relocates the IV file, removes the directory
//!   and cleans up, restoring the IV file if the removal fails
//! - [`IvFs::list_directory`] decrypts a directory's entries, hiding every
//!   reserved file and skipping names that do not decrypt
//!
//! Each mutation keeps its inconsistent window inside the shared
//! [`ConsistencyLock`]. Failed cleanups are recorded in [`Diagnostics`] and
//! never change an operation's result.

pub mod config;
pub mod diagnostics;
mod listing;
pub mod lock_metrics;
pub mod locks;
mod mutate;
#[cfg(feature = "async")]
pub mod operations_async;
pub mod path;
pub mod rollback;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, trace};

use crate::crypto::NameKey;
use crate::error::{DirOpContext, DirOpError};
use crate::fs::backing::{PosixFs, RawFs};
use crate::fs::diriv::{CacheStats, DIRIV_FILENAME, DIRIV_TEMP_PREFIX, DirIv, DirIvStore};
use crate::fs::longname::{LONGNAME_PREFIX, is_long, long_name_hash};
use crate::fs::name::{NameTransform, is_valid_component};

pub use config::{CONF_FILENAME, ConfigError, FeatureFlag, FsConfig};
pub use diagnostics::{Diagnostics, InconsistentState};
pub use listing::DirEntry;
pub use lock_metrics::{LockMetrics, LockMetricsSnapshot};
pub use locks::{ConsistencyLock, LockRegistry};
#[cfg(feature = "async")]
pub use operations_async::IvFsAsync;
pub use path::VirtualPath;
pub use rollback::Rollback;

/// A plaintext path translated onto the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Full backing path of the entry.
    pub backing: PathBuf,
    /// Backing path of the directory holding the entry.
    pub parent: PathBuf,
    /// The entry's on-disk name inside `parent`.
    pub disk_name: String,
    /// The full encrypted name when `disk_name` is a long-content name.
    pub long_name: Option<String>,
}

/// One mounted filesystem instance.
pub struct IvFs {
    cipherdir: PathBuf,
    config: FsConfig,
    names: NameTransform,
    raw: Arc<dyn RawFs>,
    ivs: DirIvStore,
    lock: Arc<ConsistencyLock>,
    diagnostics: Diagnostics,
}

impl fmt::Debug for IvFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IvFs")
            .field("cipherdir", &self.cipherdir)
            .field("config", &self.config)
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl IvFs {
    /// Initialize a new filesystem in an existing, empty directory.
    ///
    /// Writes the configuration file and, in DirIV mode, the root IV file.
    #[instrument(level = "info", skip(config, key), fields(cipherdir = %cipherdir.display()))]
    pub fn create(cipherdir: &Path, config: FsConfig, key: NameKey) -> Result<Self, DirOpError> {
        config.validate()?;
        let context = || DirOpContext::new().with_backing_path(cipherdir);

        let mut existing = std::fs::read_dir(cipherdir)
            .map_err(|e| DirOpError::io(e, context().with_step("read_dir")))?;
        if existing.next().is_some() {
            return Err(DirOpError::io(
                std::io::Error::from_raw_os_error(nix::libc::ENOTEMPTY),
                context().with_step("init"),
            ));
        }

        config.save(cipherdir)?;
        let fs = Self::with_raw_fs(cipherdir, config, key, Arc::new(PosixFs::new()))?;
        if fs.config.dir_iv() {
            fs.ivs.create_iv(cipherdir)?;
        }
        info!(flags = ?fs.config.feature_flags, "Filesystem initialized");
        Ok(fs)
    }

    /// Open an initialized filesystem, reading its configuration from disk.
    #[instrument(level = "info", skip(key), fields(cipherdir = %cipherdir.display()))]
    pub fn open(cipherdir: &Path, key: NameKey) -> Result<Self, DirOpError> {
        let config = FsConfig::load(cipherdir)?;
        Self::with_raw_fs(cipherdir, config, key, Arc::new(PosixFs::new()))
    }

    /// Build an instance over custom primitives without touching the disk.
    pub fn with_raw_fs(
        cipherdir: &Path,
        config: FsConfig,
        key: NameKey,
        raw: Arc<dyn RawFs>,
    ) -> Result<Self, DirOpError> {
        config.validate()?;
        let lock = LockRegistry::global().get_or_create(cipherdir);
        debug!(cipherdir = %cipherdir.display(), "Filesystem instance ready");
        Ok(Self {
            cipherdir: cipherdir.to_path_buf(),
            config,
            names: NameTransform::new(Arc::new(key)),
            ivs: DirIvStore::new(Arc::clone(&raw)),
            raw,
            lock,
            diagnostics: Diagnostics::new(),
        })
    }

    pub fn cipherdir(&self) -> &Path {
        &self.cipherdir
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn names(&self) -> &NameTransform {
        &self.names
    }

    /// Cleanup failures recorded by this instance.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn lock_metrics(&self) -> LockMetricsSnapshot {
        self.lock.metrics()
    }

    pub fn iv_cache_stats(&self) -> CacheStats {
        self.ivs.cache_stats()
    }

    /// Whether `path` may never be created by the caller.
    ///
    /// Deny-listed paths (and everything below them) are always filtered.
    /// With plaintext names the reserved on-disk names are filtered too,
    /// since they would collide with the layer's own files.
    pub fn is_filtered(&self, path: &VirtualPath) -> bool {
        let denied = self.config.deny_paths.iter().any(|deny| {
            let deny = VirtualPath::new(deny);
            !deny.is_root() && is_within(path, &deny)
        });
        if denied {
            return true;
        }

        if !self.config.plaintext_names() {
            return false;
        }
        let Some(name) = path.file_name() else {
            return false;
        };
        let parent_is_root = path.parent().is_some_and(|p| p.is_root());
        (parent_is_root && name == CONF_FILENAME)
            || name == DIRIV_FILENAME
            || name.starts_with(DIRIV_TEMP_PREFIX)
            || name.starts_with(LONGNAME_PREFIX)
    }

    /// Backing path of a plaintext path (the backing root for `/`).
    pub fn backing_path(&self, path: &VirtualPath) -> Result<PathBuf, DirOpError> {
        if path.is_root() {
            return Ok(self.cipherdir.clone());
        }
        Ok(self.resolve(path)?.backing)
    }

    /// Translate a non-root plaintext path onto the backing store.
    ///
    /// Every component is encrypted with the IV of the directory holding it.
    /// IVs come from the cache, read under the shared side of the
    /// consistency lock.
    #[instrument(level = "trace", skip(self), fields(path = %path))]
    pub fn resolve(&self, path: &VirtualPath) -> Result<ResolvedPath, DirOpError> {
        let context = || DirOpContext::new().with_virtual_path(path);
        let components: Vec<&str> = path.components().collect();
        let Some((last, ancestors)) = components.split_last() else {
            return Err(DirOpError::InvalidPath {
                reason: "the root has no parent".to_string(),
                context: context(),
            });
        };
        if let Some(bad) = components.iter().find(|c| !is_valid_component(c)) {
            return Err(DirOpError::InvalidPath {
                reason: format!("'{bad}' is not a valid name"),
                context: context(),
            });
        }

        let _guard = self.lock.shared();
        let mut dir = self.cipherdir.clone();
        for component in ancestors {
            let (disk_name, _) = self.encrypt_component(&dir, component)?;
            dir.push(disk_name);
        }
        let (disk_name, long_name) = self.encrypt_component(&dir, last)?;
        trace!(disk_name = %disk_name, long = long_name.is_some(), "Resolved");

        Ok(ResolvedPath {
            backing: dir.join(&disk_name),
            parent: dir,
            disk_name,
            long_name,
        })
    }

    /// On-disk name of `name` inside the backing directory `dir`.
    fn encrypt_component(
        &self,
        dir: &Path,
        name: &str,
    ) -> Result<(String, Option<String>), DirOpError> {
        if self.config.plaintext_names() {
            return Ok((name.to_string(), None));
        }
        let iv = if self.config.dir_iv() {
            self.ivs.lookup(dir)?
        } else {
            DirIv::ZERO
        };
        let encrypted = self.names.encrypt_name(name, &iv)?;
        if self.config.long_names() && is_long(&encrypted, self.config.long_name_max) {
            Ok((long_name_hash(&encrypted), Some(encrypted)))
        } else {
            Ok((encrypted, None))
        }
    }
}

/// Whether `path` equals `prefix` or lies below it.
fn is_within(path: &VirtualPath, prefix: &VirtualPath) -> bool {
    let mut components = path.components();
    prefix.components().all(|p| components.next() == Some(p))
}
