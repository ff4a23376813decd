//! Directory creation and removal.

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;

use tracing::{debug, instrument, trace};

use super::{IvFs, ResolvedPath, VirtualPath};
use crate::error::{DirOpContext, DirOpError};
use crate::fs::diriv::{DIRIV_FILENAME, DIRIV_TEMP_PREFIX};
use crate::fs::longname::{delete_long_name, store_long_name};
use crate::overlay::rollback::Rollback;

/// Owner write+execute, needed to create the IV file inside a new directory.
const CREATE_EXTRA_BITS: u32 = 0o300;

/// Owner read+write+execute, needed to open and empty a directory.
const REMOVE_EXTRA_BITS: u32 = 0o700;

const CREATE_OP: &str = "create_directory";
const REMOVE_OP: &str = "remove_directory";

fn step_err(
    path: &VirtualPath,
    backing: &Path,
    step: &'static str,
) -> impl FnOnce(io::Error) -> DirOpError + use<> {
    let context = DirOpContext::new()
        .with_virtual_path(path)
        .with_backing_path(backing)
        .with_step(step);
    move |source| DirOpError::io(source, context)
}

impl IvFs {
    /// Create the directory `path` with permission bits `mode`.
    ///
    /// In DirIV mode the new directory gets its IV file before anyone else can
    /// observe it. If the IV file cannot be written the directory is removed
    /// again, and a long-name companion written for it is deleted. The
    /// error returned is always the one that aborted the operation.
    #[instrument(level = "debug", skip(self, path), fields(path = %path.as_ref()))]
    pub fn create_directory(&self, path: impl AsRef<str>, mode: u32) -> Result<(), DirOpError> {
        let path = VirtualPath::new(path);
        if self.is_filtered(&path) {
            return Err(DirOpError::PolicyDenied {
                context: DirOpContext::new().with_virtual_path(&path),
            });
        }
        let resolved = self.resolve(&path)?;

        if !self.config.dir_iv() {
            return self
                .raw
                .mkdir(&resolved.backing, mode)
                .map_err(step_err(&path, &resolved.backing, "mkdir"));
        }

        let orig_mode = mode;
        let mode = mode | CREATE_EXTRA_BITS;

        // Companion handle outlives the rollback that borrows it
        let parent_fd: Option<OwnedFd> = match resolved.long_name {
            Some(_) => Some(
                self.raw
                    .open_dir(&resolved.parent)
                    .map_err(step_err(&path, &resolved.parent, "open parent"))?,
            ),
            None => None,
        };
        let mut companion = Rollback::new(CREATE_OP, &self.diagnostics);
        if let (Some(long_name), Some(fd)) = (&resolved.long_name, &parent_fd) {
            store_long_name(self.raw.as_ref(), fd.as_fd(), &resolved.disk_name, long_name)
                .map_err(step_err(&path, &resolved.parent, "store long name"))?;
            companion.push("delete long name", &resolved.parent, || {
                delete_long_name(self.raw.as_ref(), fd.as_fd(), &resolved.disk_name)
            });
        }

        self.mkdir_with_iv(&path, &resolved, mode)?;
        companion.commit();

        if orig_mode != mode
            && let Err(e) = self.raw.chmod(&resolved.backing, orig_mode)
        {
            self.diagnostics
                .record(CREATE_OP, "restore mode", &resolved.backing, &e);
        }
        debug!(backing = %resolved.backing.display(), "Directory created");
        Ok(())
    }

    /// Create the directory and its IV file as one locked window.
    fn mkdir_with_iv(
        &self,
        path: &VirtualPath,
        resolved: &ResolvedPath,
        mode: u32,
    ) -> Result<(), DirOpError> {
        let backing = &resolved.backing;
        let _guard = self.lock.exclusive();
        // The path may have held another directory before
        self.ivs.invalidate(backing);

        self.raw
            .mkdir(backing, mode)
            .map_err(step_err(path, backing, "mkdir"))?;

        // Declared after the guard: unwinds while the lock is still held
        let mut created = Rollback::new(CREATE_OP, &self.diagnostics);
        created.push("remove directory", backing, || self.raw.rmdir(backing));

        self.ivs.create_iv(backing)?;
        created.commit();
        trace!(backing = %backing.display(), "IV file written");
        Ok(())
    }

    /// Remove the empty directory `path`.
    ///
    /// The directory is opened relative to its parent and checked for
    /// entries other than its IV file; a non-empty directory is reported
    /// before anything is modified. The IV file is then moved into the parent
    /// under a temporary name so the directory can be removed. If removal
    /// fails the IV file is moved back.
    #[instrument(level = "debug", skip(self, path), fields(path = %path.as_ref()))]
    pub fn remove_directory(&self, path: impl AsRef<str>) -> Result<(), DirOpError> {
        let path = VirtualPath::new(path);
        let resolved = self.resolve(&path)?;
        let backing = &resolved.backing;

        if !self.config.dir_iv() {
            return self
                .raw
                .rmdir(backing)
                .map_err(step_err(&path, backing, "rmdir"));
        }

        let parent_fd = self
            .raw
            .open_dir(&resolved.parent)
            .map_err(step_err(&path, &resolved.parent, "open parent"))?;

        let mut restore_mode = Rollback::new(REMOVE_OP, &self.diagnostics);
        let dir_fd = match self.raw.open_dir_at(parent_fd.as_fd(), &resolved.disk_name) {
            Ok(fd) => fd,
            Err(e) if e.raw_os_error() == Some(nix::libc::EACCES) => {
                debug!(backing = %backing.display(), "Directory not readable, widening permissions");
                let orig_mode = self
                    .raw
                    .lstat_mode(backing)
                    .map_err(step_err(&path, backing, "lstat"))?;
                self.raw
                    .chmod(backing, orig_mode | REMOVE_EXTRA_BITS)
                    .map_err(step_err(&path, backing, "chmod"))?;
                restore_mode.push("restore mode", backing, move || {
                    self.raw.chmod(backing, orig_mode)
                });
                self.raw
                    .open_dir_at(parent_fd.as_fd(), &resolved.disk_name)
                    .map_err(step_err(&path, backing, "open directory"))?
            }
            Err(e) => return Err(step_err(&path, backing, "open directory")(e)),
        };

        let names = self
            .raw
            .read_dir_names_at(dir_fd.as_fd(), self.config.rmdir_readahead)
            .map_err(step_err(&path, backing, "read directory"))?;
        let holds_only_iv = match names.as_slice() {
            [] => false,
            [only] if only == DIRIV_FILENAME => true,
            _ => {
                return Err(DirOpError::NotEmpty {
                    context: DirOpContext::new()
                        .with_virtual_path(&path)
                        .with_backing_path(backing),
                });
            }
        };

        {
            let _guard = self.lock.exclusive();
            if holds_only_iv {
                self.remove_with_relocated_iv(&path, &resolved, &parent_fd, &dir_fd)?;
            } else {
                debug!(backing = %backing.display(), "Directory has no IV file, removing directly");
                self.raw
                    .rmdir_at(parent_fd.as_fd(), &resolved.disk_name)
                    .map_err(step_err(&path, backing, "rmdir"))?;
            }

            if resolved.long_name.is_some()
                && let Err(e) = delete_long_name(self.raw.as_ref(), parent_fd.as_fd(), &resolved.disk_name)
            {
                self.diagnostics
                    .record(REMOVE_OP, "delete long name", &resolved.parent, &e);
            }
            self.ivs.invalidate(backing);
        }

        // The directory is gone, there is no mode left to restore
        restore_mode.commit();
        debug!(backing = %backing.display(), "Directory removed");
        Ok(())
    }

    /// Move the IV file into the parent, remove the directory, drop the IV.
    ///
    /// Caller holds the consistency lock exclusively.
    fn remove_with_relocated_iv(
        &self,
        path: &VirtualPath,
        resolved: &ResolvedPath,
        parent_fd: &OwnedFd,
        dir_fd: &OwnedFd,
    ) -> Result<(), DirOpError> {
        let backing = &resolved.backing;
        let temp_name = format!("{DIRIV_TEMP_PREFIX}{}", rand::random::<u64>());

        self.raw
            .rename_at(dir_fd.as_fd(), DIRIV_FILENAME, parent_fd.as_fd(), &temp_name)
            .map_err(step_err(path, backing, "relocate IV file"))?;
        trace!(temp_name = %temp_name, "IV file relocated");

        let mut relocated = Rollback::new(REMOVE_OP, &self.diagnostics);
        relocated.push("restore IV file", backing, || {
            self.raw
                .rename_at(parent_fd.as_fd(), &temp_name, dir_fd.as_fd(), DIRIV_FILENAME)
        });

        self.raw
            .rmdir_at(parent_fd.as_fd(), &resolved.disk_name)
            .map_err(step_err(path, backing, "rmdir"))?;
        relocated.commit();

        if let Err(e) = self.raw.unlink_at(parent_fd.as_fd(), &temp_name) {
            self.diagnostics
                .record(REMOVE_OP, "unlink temp IV", &resolved.parent.join(&temp_name), &e);
        }
        Ok(())
    }
}
