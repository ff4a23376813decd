//! A filesystem instance in a temp directory, running over [`FaultyFs`].

use super::faulty::FaultyFs;
use ivfs_core::fs::DIRIV_TEMP_PREFIX;
use ivfs_core::overlay::ResolvedPath;
use ivfs_core::{FsConfig, IvFs, NameKey, VirtualPath};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::util::SubscriberInitExt;

/// Opt-in test logging: `RUST_LOG=ivfs_core=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Route warn-level events to the test writer on this thread, so every
/// `warn!` an operation issues is actually formatted.
pub fn warn_logging() -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::WARN)
        .with_test_writer()
        .set_default()
}

pub fn test_key() -> NameKey {
    NameKey::new([0x42; 64])
}

pub struct TestFs {
    pub tmp: TempDir,
    pub fs: IvFs,
    pub raw: Arc<FaultyFs>,
}

impl TestFs {
    pub fn new() -> Self {
        Self::with_config(FsConfig::new())
    }

    pub fn with_config(config: FsConfig) -> Self {
        init_tracing();
        let tmp = TempDir::new().expect("Failed to create temp dir");
        IvFs::create(tmp.path(), config.clone(), test_key()).expect("Failed to initialize");

        let raw = Arc::new(FaultyFs::new());
        let fs = IvFs::with_raw_fs(tmp.path(), config, test_key(), raw.clone())
            .expect("Failed to build instance");
        Self { tmp, fs, raw }
    }

    pub fn cipherdir(&self) -> &Path {
        self.tmp.path()
    }

    pub fn resolve(&self, path: &str) -> ResolvedPath {
        self.fs.resolve(&VirtualPath::new(path)).expect("resolve failed")
    }

    pub fn backing(&self, path: &str) -> PathBuf {
        self.fs
            .backing_path(&VirtualPath::new(path))
            .expect("resolve failed")
    }

    /// Sorted plaintext names of a directory.
    pub fn names(&self, path: &str) -> Vec<OsString> {
        let mut names: Vec<_> = self
            .fs
            .list_directory(path)
            .expect("listing failed")
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        names
    }

    /// Sorted raw names in a backing directory.
    pub fn raw_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .expect("read_dir failed")
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Names of leftover removal temp files in a backing directory.
    pub fn temp_aliases(dir: &Path) -> Vec<String> {
        Self::raw_names(dir)
            .into_iter()
            .filter(|n| n.starts_with(DIRIV_TEMP_PREFIX))
            .collect()
    }
}
