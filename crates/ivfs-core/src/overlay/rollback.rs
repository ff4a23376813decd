//! Compensating actions for multi-step mutations.
//!
//! Each completed step of a mutation pushes the action that undoes it. On
//! failure the actions run in reverse order; on success the caller commits
//! and nothing runs. An armed [`Rollback`] that is dropped unwinds, so an
//! early `?` return can never skip the cleanup.

use std::io;
use std::path::PathBuf;
use tracing::debug;

use super::diagnostics::Diagnostics;

type Compensation<'a> = Box<dyn FnOnce() -> io::Result<()> + 'a>;

struct Step<'a> {
    name: &'static str,
    path: PathBuf,
    undo: Compensation<'a>,
}

pub struct Rollback<'a> {
    operation: &'static str,
    diagnostics: &'a Diagnostics,
    steps: Vec<Step<'a>>,
}

impl<'a> Rollback<'a> {
    pub fn new(operation: &'static str, diagnostics: &'a Diagnostics) -> Self {
        Self {
            operation,
            diagnostics,
            steps: Vec::new(),
        }
    }

    /// Register the compensation for a step that just completed.
    pub fn push(
        &mut self,
        name: &'static str,
        path: impl Into<PathBuf>,
        undo: impl FnOnce() -> io::Result<()> + 'a,
    ) {
        self.steps.push(Step {
            name,
            path: path.into(),
            undo: Box::new(undo),
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Keep every completed step.
    pub fn commit(mut self) {
        self.steps.clear();
    }

    /// Run all compensations, newest first.
    ///
    /// Failures are recorded in [`Diagnostics`] and otherwise ignored.
    pub fn unwind(mut self) {
        self.run();
    }

    fn run(&mut self) {
        while let Some(step) = self.steps.pop() {
            debug!(operation = self.operation, step = step.name, "Rolling back");
            if let Err(e) = (step.undo)() {
                self.diagnostics.record(self.operation, step.name, &step.path, &e);
            }
        }
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Rollback<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rollback")
            .field("operation", &self.operation)
            .field("steps", &self.steps.iter().map(|s| s.name).collect::<Vec<_>>())
            .finish()
    }
}
