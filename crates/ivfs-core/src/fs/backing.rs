//! Raw directory-entry primitives on the backing (ciphertext) filesystem.
//!
//! Everything above this module talks to the disk exclusively through the
//! [`RawFs`] trait. The production implementation, [`PosixFs`], maps each
//! primitive onto a single system call (or a `std::fs` equivalent). Tests wrap
//! it to inject failures or to record which primitives an operation issued.
//!
//! Directory handles are plain [`OwnedFd`]s: they close on drop, so every exit
//! path of an operation releases them.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::fd::{BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, DirEntryExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use nix::dir::Dir;
use nix::fcntl::{OFlag, open, openat, renameat};
use nix::sys::stat::Mode;
use nix::unistd::{UnlinkatFlags, unlinkat};

/// Kind of a raw directory entry, as reported by the backing filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    Other,
}

impl From<fs::FileType> for EntryKind {
    fn from(ft: fs::FileType) -> Self {
        if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_file() {
            EntryKind::File
        } else if ft.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::Other
        }
    }
}

/// One entry of a raw (ciphertext) directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// On-disk name.
    pub name: OsString,
    pub kind: EntryKind,
    /// Inode number hint.
    pub ino: u64,
}

/// The directory-entry primitives the overlay is allowed to use.
///
/// Implementations must be thread-safe: operations on the same mount run
/// concurrently from many worker threads.
pub trait RawFs: Send + Sync + fmt::Debug {
    /// Create a directory with the given permission bits.
    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Remove an empty directory.
    fn rmdir(&self, path: &Path) -> io::Result<()>;

    /// Change permission bits.
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Permission bits of `path` without following a final symlink.
    fn lstat_mode(&self, path: &Path) -> io::Result<u32>;

    /// Open a directory by absolute path.
    fn open_dir(&self, path: &Path) -> io::Result<OwnedFd>;

    /// Open the directory `name` relative to `parent`, never following a
    /// symlink in the final component.
    fn open_dir_at(&self, parent: BorrowedFd<'_>, name: &str) -> io::Result<OwnedFd>;

    /// List a directory (without `.` and `..`).
    fn read_dir(&self, path: &Path) -> io::Result<Vec<RawEntry>>;

    /// List at most `limit` names of an open directory (without `.` and `..`).
    fn read_dir_names_at(&self, dir: BorrowedFd<'_>, limit: usize) -> io::Result<Vec<OsString>>;

    /// Rename `old_name` in `old_dir` to `new_name` in `new_dir`.
    fn rename_at(
        &self,
        old_dir: BorrowedFd<'_>,
        old_name: &str,
        new_dir: BorrowedFd<'_>,
        new_name: &str,
    ) -> io::Result<()>;

    /// Remove the empty directory `name` relative to `parent`.
    fn rmdir_at(&self, parent: BorrowedFd<'_>, name: &str) -> io::Result<()>;

    /// Unlink a non-directory entry relative to `dir`.
    fn unlink_at(&self, dir: BorrowedFd<'_>, name: &str) -> io::Result<()>;

    /// Create a new file (failing if it exists) and write `data` in one shot.
    fn write_new_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;

    /// Like [`write_new_file`](Self::write_new_file), relative to `dir`.
    fn write_new_file_at(
        &self,
        dir: BorrowedFd<'_>,
        name: &str,
        data: &[u8],
        mode: u32,
    ) -> io::Result<()>;

    /// Read a whole file.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// [`RawFs`] backed by the host's POSIX filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixFs;

impl PosixFs {
    pub fn new() -> Self {
        Self
    }
}

const DIR_OPEN_FLAGS: OFlag = OFlag::O_RDONLY
    .union(OFlag::O_DIRECTORY)
    .union(OFlag::O_CLOEXEC);

impl RawFs for PosixFs {
    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        DirBuilder::new().mode(mode).create(path)
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, Permissions::from_mode(mode))
    }

    fn lstat_mode(&self, path: &Path) -> io::Result<u32> {
        Ok(fs::symlink_metadata(path)?.permissions().mode() & 0o7777)
    }

    fn open_dir(&self, path: &Path) -> io::Result<OwnedFd> {
        Ok(open(path, DIR_OPEN_FLAGS, Mode::empty())?)
    }

    fn open_dir_at(&self, parent: BorrowedFd<'_>, name: &str) -> io::Result<OwnedFd> {
        Ok(openat(
            parent,
            name,
            DIR_OPEN_FLAGS | OFlag::O_NOFOLLOW,
            Mode::empty(),
        )?)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<RawEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            entries.push(RawEntry {
                name: entry.file_name(),
                kind: entry.file_type()?.into(),
                ino: entry.ino(),
            });
        }
        Ok(entries)
    }

    fn read_dir_names_at(&self, dir: BorrowedFd<'_>, limit: usize) -> io::Result<Vec<OsString>> {
        let mut handle = Dir::openat(dir, ".", DIR_OPEN_FLAGS, Mode::empty())?;
        let mut names = Vec::new();
        for entry in handle.iter() {
            if names.len() >= limit {
                break;
            }
            let entry = entry?;
            let name = entry.file_name().to_bytes();
            if name == b"." || name == b".." {
                continue;
            }
            names.push(OsStr::from_bytes(name).to_os_string());
        }
        Ok(names)
    }

    fn rename_at(
        &self,
        old_dir: BorrowedFd<'_>,
        old_name: &str,
        new_dir: BorrowedFd<'_>,
        new_name: &str,
    ) -> io::Result<()> {
        Ok(renameat(old_dir, old_name, new_dir, new_name)?)
    }

    fn rmdir_at(&self, parent: BorrowedFd<'_>, name: &str) -> io::Result<()> {
        Ok(unlinkat(parent, name, UnlinkatFlags::RemoveDir)?)
    }

    fn unlink_at(&self, dir: BorrowedFd<'_>, name: &str) -> io::Result<()> {
        Ok(unlinkat(dir, name, UnlinkatFlags::NoRemoveDir)?)
    }

    fn write_new_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)?;
        file.write_all(data)
    }

    fn write_new_file_at(
        &self,
        dir: BorrowedFd<'_>,
        name: &str,
        data: &[u8],
        mode: u32,
    ) -> io::Result<()> {
        let fd = openat(
            dir,
            name,
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_CLOEXEC,
            Mode::from_bits_truncate(mode as nix::libc::mode_t),
        )?;
        File::from(fd).write_all(data)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}
