//! Asynchronous facade over [`IvFs`].
//!
//! Every directory operation is a short sequence of blocking system calls, so
//! each call runs on Tokio's blocking pool via `spawn_blocking`. The
//! consistency lock is a synchronous lock and is never held across an await
//! point.
//!
//! `IvFsAsync` is cheap to clone and `Send`, so it can be moved into spawned
//! tasks:
//!
//! ```ignore
//! let fs = IvFsAsync::new(ivfs);
//! let (a, b) = tokio::join!(fs.create_directory("/a", 0o755), fs.list_directory("/"));
//! ```

use std::sync::Arc;

use tracing::instrument;

use super::{DirEntry, IvFs};
use crate::error::DirOpError;

/// [`IvFs`] for use from async code.
#[derive(Debug, Clone)]
pub struct IvFsAsync {
    inner: Arc<IvFs>,
}

impl IvFsAsync {
    pub fn new(fs: IvFs) -> Self {
        Self {
            inner: Arc::new(fs),
        }
    }

    pub fn from_arc(inner: Arc<IvFs>) -> Self {
        Self { inner }
    }

    /// The wrapped synchronous instance.
    pub fn inner(&self) -> &Arc<IvFs> {
        &self.inner
    }

    async fn run<T, F>(&self, op: F) -> Result<T, DirOpError>
    where
        T: Send + 'static,
        F: FnOnce(&IvFs) -> Result<T, DirOpError> + Send + 'static,
    {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&fs)).await?
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn create_directory(&self, path: &str, mode: u32) -> Result<(), DirOpError> {
        let path = path.to_string();
        self.run(move |fs| fs.create_directory(&path, mode)).await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn remove_directory(&self, path: &str) -> Result<(), DirOpError> {
        let path = path.to_string();
        self.run(move |fs| fs.remove_directory(&path)).await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, DirOpError> {
        let path = path.to_string();
        self.run(move |fs| fs.list_directory(&path)).await
    }
}
