//! Filesystem configuration stored at the backing root.
//!
//! The configuration file is a small JSON document:
//!
//! ```json
//! {
//!   "Version": 1,
//!   "FeatureFlags": ["DirIV", "LongNames"],
//!   "LongNameMax": 255,
//!   "RmdirReadahead": 10,
//!   "DenyPaths": []
//! }
//! ```
//!
//! It is hidden from listings of the root directory in every mode.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Reserved name of the configuration file at the backing root.
pub const CONF_FILENAME: &str = "ivfs.conf";

/// Current configuration format version.
pub const CONFIG_VERSION: u16 = 1;

/// Default length above which encrypted names are stored out-of-line.
pub const DEFAULT_LONG_NAME_MAX: usize = 255;

/// Smallest accepted long-name threshold. Long-content names themselves are
/// 57 characters, so anything lower could never shorten a name.
pub const MIN_LONG_NAME_MAX: usize = 62;

/// Default number of names probed when checking a directory for emptiness.
pub const DEFAULT_RMDIR_READAHEAD: usize = 10;

/// Optional behaviors of a filesystem, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureFlag {
    /// Every directory carries its own IV file.
    #[serde(rename = "DirIV")]
    DirIv,
    /// Over-long encrypted names are stored in companion files.
    LongNames,
    /// Names are not encrypted at all.
    PlaintextNames,
}

impl fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureFlag::DirIv => "DirIV",
            FeatureFlag::LongNames => "LongNames",
            FeatureFlag::PlaintextNames => "PlaintextNames",
        };
        f.write_str(name)
    }
}

/// Errors from loading, saving or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error on config file {path}: {source}", path = .path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error("Malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config version {0} (supported: {CONFIG_VERSION})")]
    UnsupportedVersion(u16),

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Configuration of one filesystem instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct FsConfig {
    pub version: u16,
    pub feature_flags: BTreeSet<FeatureFlag>,
    #[serde(default = "default_long_name_max")]
    pub long_name_max: usize,
    #[serde(default = "default_rmdir_readahead")]
    pub rmdir_readahead: usize,
    /// Plaintext paths that may never be created.
    #[serde(default)]
    pub deny_paths: Vec<String>,
}

fn default_long_name_max() -> usize {
    DEFAULT_LONG_NAME_MAX
}

fn default_rmdir_readahead() -> usize {
    DEFAULT_RMDIR_READAHEAD
}

impl Default for FsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FsConfig {
    /// A configuration with DirIV and long names enabled.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            feature_flags: [FeatureFlag::DirIv, FeatureFlag::LongNames]
                .into_iter()
                .collect(),
            long_name_max: DEFAULT_LONG_NAME_MAX,
            rmdir_readahead: DEFAULT_RMDIR_READAHEAD,
            deny_paths: Vec::new(),
        }
    }

    pub fn with_flag(mut self, flag: FeatureFlag) -> Self {
        self.feature_flags.insert(flag);
        self
    }

    pub fn without_flag(mut self, flag: FeatureFlag) -> Self {
        self.feature_flags.remove(&flag);
        self
    }

    pub fn with_long_name_max(mut self, max: usize) -> Self {
        self.long_name_max = max;
        self
    }

    pub fn with_rmdir_readahead(mut self, readahead: usize) -> Self {
        self.rmdir_readahead = readahead;
        self
    }

    pub fn with_deny_path(mut self, path: impl Into<String>) -> Self {
        self.deny_paths.push(path.into());
        self
    }

    #[inline]
    pub fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.feature_flags.contains(&flag)
    }

    #[inline]
    pub fn dir_iv(&self) -> bool {
        self.is_enabled(FeatureFlag::DirIv)
    }

    #[inline]
    pub fn long_names(&self) -> bool {
        self.is_enabled(FeatureFlag::LongNames)
    }

    #[inline]
    pub fn plaintext_names(&self) -> bool {
        self.is_enabled(FeatureFlag::PlaintextNames)
    }

    /// Check version and option ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        if !(MIN_LONG_NAME_MAX..=DEFAULT_LONG_NAME_MAX).contains(&self.long_name_max) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "LongNameMax must be within {MIN_LONG_NAME_MAX}..={DEFAULT_LONG_NAME_MAX}, got {}",
                    self.long_name_max
                ),
            });
        }
        if self.rmdir_readahead < 2 {
            return Err(ConfigError::Invalid {
                reason: format!("RmdirReadahead must be at least 2, got {}", self.rmdir_readahead),
            });
        }
        if self.long_names() && !self.dir_iv() {
            return Err(ConfigError::Invalid {
                reason: "LongNames requires DirIV".to_string(),
            });
        }
        if self.plaintext_names() && self.long_names() {
            return Err(ConfigError::Invalid {
                reason: "LongNames has no effect together with PlaintextNames".to_string(),
            });
        }
        Ok(())
    }

    /// Path of the configuration file for a backing root.
    pub fn path_in(cipherdir: &Path) -> PathBuf {
        cipherdir.join(CONF_FILENAME)
    }

    /// Load and validate the configuration of a backing root.
    pub fn load(cipherdir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(cipherdir);
        debug!(path = %path.display(), "Loading config");
        let content = std::fs::read(&path).map_err(|source| ConfigError::Io {
            source,
            path: path.clone(),
        })?;
        let config: FsConfig = serde_json::from_slice(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration atomically (temp file + rename).
    pub fn save(&self, cipherdir: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let path = Self::path_in(cipherdir);
        let io_err = |source: io::Error| ConfigError::Io {
            source,
            path: path.clone(),
        };

        let mut content = serde_json::to_vec_pretty(self)?;
        content.push(b'\n');

        // Create temp file in the same directory (ensures same filesystem for rename)
        let mut temp_file = tempfile::NamedTempFile::new_in(cipherdir).map_err(io_err)?;
        temp_file.write_all(&content).map_err(io_err)?;
        temp_file.persist(&path).map_err(|e| io_err(e.error))?;

        info!(path = %path.display(), flags = ?self.feature_flags, "Config written");
        Ok(())
    }
}
