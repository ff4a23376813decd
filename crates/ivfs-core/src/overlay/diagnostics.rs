//! Structured record of cleanup failures.
//!
//! A failed compensating action (rollback rmdir, rollback rename, temp IV
//! unlink, permission restore, companion deletion) never changes the result of
//! the operation that triggered it. It is logged and kept here so callers can
//! observe leaks such as orphaned temp IV files.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Number of events retained.
pub const DIAGNOSTICS_CAPACITY: usize = 64;

/// A secondary failure that left the backing store slightly off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InconsistentState {
    /// Operation in progress (`create_directory`, `remove_directory`).
    pub operation: &'static str,
    /// The cleanup step that failed.
    pub step: &'static str,
    /// Backing path the step acted on.
    pub path: PathBuf,
    pub errno: Option<i32>,
    pub error: String,
}

impl fmt::Display for InconsistentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} failed on {}: {}",
            self.operation,
            self.step,
            self.path.display(),
            self.error
        )
    }
}

/// Bounded ring of the most recent [`InconsistentState`] events.
#[derive(Debug, Default)]
pub struct Diagnostics {
    events: Mutex<VecDeque<InconsistentState>>,
    total: AtomicU64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and retain a cleanup failure.
    pub fn record(&self, operation: &'static str, step: &'static str, path: &Path, err: &io::Error) {
        warn!(
            operation,
            step,
            path = %path.display(),
            error = %err,
            "Cleanup step failed, backing store left inconsistent"
        );
        let event = InconsistentState {
            operation,
            step,
            path: path.to_path_buf(),
            errno: err.raw_os_error(),
            error: err.to_string(),
        };

        self.total.fetch_add(1, Ordering::Relaxed);
        let mut events = self.events.lock();
        if events.len() == DIAGNOSTICS_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> Vec<InconsistentState> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events recorded since creation, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
