//! A [`RawFs`] wrapper that injects errors and records every primitive call.

use ivfs_core::fs::{PosixFs, RawEntry, RawFs};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::Path;
use std::sync::Mutex;

/// Primitive operations of [`RawFs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Mkdir,
    Rmdir,
    RmdirAt,
    Chmod,
    LstatMode,
    OpenDir,
    OpenDirAt,
    ReadDir,
    ReadDirNamesAt,
    RenameAt,
    UnlinkAt,
    WriteNewFile,
    WriteNewFileAt,
    ReadFile,
}

impl Op {
    /// Whether the primitive changes the backing store.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Op::Mkdir
                | Op::Rmdir
                | Op::RmdirAt
                | Op::Chmod
                | Op::RenameAt
                | Op::UnlinkAt
                | Op::WriteNewFile
                | Op::WriteNewFileAt
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    errno: i32,
    /// Calls to let through before failing.
    skip: usize,
    /// Failures left; `None` fails forever.
    remaining: Option<usize>,
}

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct FaultyFs {
    inner: PosixFs,
    faults: Mutex<HashMap<Op, Fault>>,
    calls: Mutex<Vec<Op>>,
    before_rmdir: Mutex<Option<Hook>>,
}

impl fmt::Debug for FaultyFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultyFs")
            .field("faults", &self.faults.lock().unwrap())
            .finish_non_exhaustive()
    }
}

impl FaultyFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `op` with `errno`.
    pub fn fail(&self, op: Op, errno: i32) {
        self.set(op, Fault { errno, skip: 0, remaining: None });
    }

    /// Fail the next call of `op` only.
    pub fn fail_once(&self, op: Op, errno: i32) {
        self.fail_nth(op, 1, errno);
    }

    /// Fail only the `n`-th next call (1-based) of `op`.
    pub fn fail_nth(&self, op: Op, n: usize, errno: i32) {
        assert!(n >= 1);
        self.set(op, Fault { errno, skip: n - 1, remaining: Some(1) });
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    /// Run `hook` right before the next directory removal primitive.
    pub fn before_next_rmdir(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_rmdir.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Op> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<Op> {
        self.calls().into_iter().filter(|op| op.is_mutating()).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().into_iter().filter(|&c| c == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn set(&self, op: Op, fault: Fault) {
        self.faults.lock().unwrap().insert(op, fault);
    }

    fn check(&self, op: Op) -> io::Result<()> {
        self.calls.lock().unwrap().push(op);
        let mut faults = self.faults.lock().unwrap();
        let Some(fault) = faults.get_mut(&op) else {
            return Ok(());
        };
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        let errno = fault.errno;
        let exhausted = match fault.remaining.as_mut() {
            Some(n) => {
                *n -= 1;
                *n == 0
            }
            None => false,
        };
        if exhausted {
            faults.remove(&op);
        }
        Err(io::Error::from_raw_os_error(errno))
    }

    fn run_rmdir_hook(&self) {
        let hook = self.before_rmdir.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl RawFs for FaultyFs {
    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.check(Op::Mkdir)?;
        self.inner.mkdir(path, mode)
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        self.run_rmdir_hook();
        self.check(Op::Rmdir)?;
        self.inner.rmdir(path)
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.check(Op::Chmod)?;
        self.inner.chmod(path, mode)
    }

    fn lstat_mode(&self, path: &Path) -> io::Result<u32> {
        self.check(Op::LstatMode)?;
        self.inner.lstat_mode(path)
    }

    fn open_dir(&self, path: &Path) -> io::Result<OwnedFd> {
        self.check(Op::OpenDir)?;
        self.inner.open_dir(path)
    }

    fn open_dir_at(&self, parent: BorrowedFd<'_>, name: &str) -> io::Result<OwnedFd> {
        self.check(Op::OpenDirAt)?;
        self.inner.open_dir_at(parent, name)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<RawEntry>> {
        self.check(Op::ReadDir)?;
        self.inner.read_dir(path)
    }

    fn read_dir_names_at(&self, dir: BorrowedFd<'_>, limit: usize) -> io::Result<Vec<OsString>> {
        self.check(Op::ReadDirNamesAt)?;
        self.inner.read_dir_names_at(dir, limit)
    }

    fn rename_at(
        &self,
        old_dir: BorrowedFd<'_>,
        old_name: &str,
        new_dir: BorrowedFd<'_>,
        new_name: &str,
    ) -> io::Result<()> {
        self.check(Op::RenameAt)?;
        self.inner.rename_at(old_dir, old_name, new_dir, new_name)
    }

    fn rmdir_at(&self, parent: BorrowedFd<'_>, name: &str) -> io::Result<()> {
        self.run_rmdir_hook();
        self.check(Op::RmdirAt)?;
        self.inner.rmdir_at(parent, name)
    }

    fn unlink_at(&self, dir: BorrowedFd<'_>, name: &str) -> io::Result<()> {
        self.check(Op::UnlinkAt)?;
        self.inner.unlink_at(dir, name)
    }

    fn write_new_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        self.check(Op::WriteNewFile)?;
        self.inner.write_new_file(path, data, mode)
    }

    fn write_new_file_at(
        &self,
        dir: BorrowedFd<'_>,
        name: &str,
        data: &[u8],
        mode: u32,
    ) -> io::Result<()> {
        self.check(Op::WriteNewFileAt)?;
        self.inner.write_new_file_at(dir, name, data, mode)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.check(Op::ReadFile)?;
        self.inner.read_file(path)
    }
}
