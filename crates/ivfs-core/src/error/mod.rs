//! Error types for the crate
//!
//! Every directory operation returns [`DirOpError`]. Module-level errors
//! (names, IV files, configuration) convert into it, and
//! [`DirOpError::errno`] maps the result onto the POSIX code the host bridge
//! hands back to the kernel.

use std::fmt;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

// Re-export error types from submodules
pub use crate::fs::diriv::DirIvError;
pub use crate::fs::name::{NameContext, NameError};
pub use crate::overlay::config::ConfigError;

/// Where a directory operation failed.
#[derive(Debug, Clone, Default)]
pub struct DirOpContext {
    /// The plaintext path as passed by the caller
    pub virtual_path: Option<String>,
    /// The translated path on the backing store
    pub backing_path: Option<PathBuf>,
    /// The primitive that failed (`mkdir`, `rename`, ...)
    pub step: Option<&'static str>,
}

impl DirOpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_virtual_path(mut self, path: impl fmt::Display) -> Self {
        self.virtual_path = Some(path.to_string());
        self
    }

    pub fn with_backing_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backing_path = Some(path.into());
        self
    }

    pub fn with_step(mut self, step: &'static str) -> Self {
        self.step = Some(step);
        self
    }
}

impl fmt::Display for DirOpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref path) = self.virtual_path {
            parts.push(format!("path '{path}'"));
        }
        if let Some(step) = self.step {
            parts.push(format!("during {step}"));
        }
        if let Some(ref backing) = self.backing_path {
            parts.push(format!("at {:?}", backing.display()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors returned by directory operations.
#[derive(Error, Debug)]
pub enum DirOpError {
    /// The path is reserved or listed in the deny list. Nothing was touched.
    #[error("Operation not permitted on reserved path: {context}")]
    PolicyDenied { context: DirOpContext },

    /// The directory holds more than its IV file. Nothing was touched.
    #[error("Directory not empty: {context}")]
    NotEmpty { context: DirOpContext },

    #[error("Invalid path {context}: {reason}")]
    InvalidPath { reason: String, context: DirOpContext },

    #[error("IO error for {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: DirOpContext,
    },

    #[error("Directory IV error: {0}")]
    DirIv(#[from] DirIvError),

    #[error("Filename error: {0}")]
    Name(#[from] NameError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The blocking task running the operation panicked or was cancelled.
    #[cfg(feature = "async")]
    #[error("Background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<io::Error> for DirOpError {
    fn from(source: io::Error) -> Self {
        DirOpError::Io {
            source,
            context: DirOpContext::new(),
        }
    }
}

impl DirOpError {
    pub(crate) fn io(source: io::Error, context: DirOpContext) -> Self {
        DirOpError::Io { source, context }
    }

    /// The POSIX error code for this error.
    ///
    /// Errors of the underlying primitives pass through unchanged. Anything
    /// without an OS code (bad IV file, undecryptable name, ...) is `EIO`.
    pub fn errno(&self) -> Errno {
        match self {
            DirOpError::PolicyDenied { .. } => Errno::EPERM,
            DirOpError::NotEmpty { .. } => Errno::ENOTEMPTY,
            DirOpError::InvalidPath { .. } => Errno::EINVAL,
            DirOpError::Io { source, .. } => errno_of(source),
            DirOpError::DirIv(e) => e.io_error().map_or(Errno::EIO, errno_of),
            DirOpError::Name(NameError::InvalidPlaintext { .. }) => Errno::EINVAL,
            DirOpError::Name(_) | DirOpError::Config(_) => Errno::EIO,
            #[cfg(feature = "async")]
            DirOpError::TaskJoin(_) => Errno::EIO,
        }
    }

    /// Whether the error is "no such file or directory".
    pub fn is_not_found(&self) -> bool {
        self.errno() == Errno::ENOENT
    }
}

fn errno_of(err: &io::Error) -> Errno {
    err.raw_os_error().map_or(Errno::EIO, Errno::from_raw)
}
