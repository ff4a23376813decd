//! Directory listing.

use std::ffi::OsString;

use tracing::{debug, instrument, trace, warn};

use super::config::CONF_FILENAME;
use super::{IvFs, VirtualPath};
use crate::error::{DirOpContext, DirOpError};
use crate::fs::backing::EntryKind;
use crate::fs::diriv::{DIRIV_FILENAME, DIRIV_TEMP_PREFIX, DirIv};
use crate::fs::longname::{NameKind, load_long_name};

/// One visible entry of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Plaintext name.
    pub name: OsString,
    /// Name on the backing store (the long-content name for long names).
    pub cipher_name: OsString,
    pub kind: EntryKind,
    /// Inode number hint from the backing store.
    pub ino: u64,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

impl IvFs {
    /// List the plaintext entries of the directory `path`.
    ///
    /// Reserved files never show up. An entry whose name cannot be decrypted,
    /// or whose long-name companion cannot be read, is left out with a
    /// warning; the listing itself still succeeds.
    #[instrument(level = "debug", skip(self, path), fields(path = %path.as_ref()))]
    pub fn list_directory(&self, path: impl AsRef<str>) -> Result<Vec<DirEntry>, DirOpError> {
        let path = VirtualPath::new(path);
        let dir = self.backing_path(&path)?;

        let raw_entries = self.raw.read_dir(&dir).map_err(|e| {
            DirOpError::io(
                e,
                DirOpContext::new()
                    .with_virtual_path(&path)
                    .with_backing_path(&dir)
                    .with_step("read_dir"),
            )
        })?;
        if raw_entries.is_empty() {
            return Ok(Vec::new());
        }

        // Read once per listing, outside the consistency lock
        let iv = if self.config.dir_iv() {
            self.ivs.read_iv(&dir)?
        } else {
            DirIv::ZERO
        };

        let at_root = path.is_root();
        let mut entries = Vec::with_capacity(raw_entries.len());

        for raw in raw_entries {
            let cipher_name = raw.name;
            let text_name = cipher_name.to_str();

            if at_root && text_name == Some(CONF_FILENAME) {
                continue;
            }
            if self.config.dir_iv()
                && text_name.is_some_and(|n| n == DIRIV_FILENAME || n.starts_with(DIRIV_TEMP_PREFIX))
            {
                continue;
            }

            if self.config.plaintext_names() {
                entries.push(DirEntry {
                    name: cipher_name.clone(),
                    cipher_name,
                    kind: raw.kind,
                    ino: raw.ino,
                });
                continue;
            }

            let Some(text_name) = text_name else {
                warn!(name = ?cipher_name, dir = %dir.display(), "Skipping entry with non-UTF-8 name");
                continue;
            };

            let encrypted = match NameKind::classify(text_name) {
                NameKind::LongCompanion => continue,
                NameKind::LongContent => match load_long_name(self.raw.as_ref(), &dir, text_name) {
                    Ok(full) => full,
                    Err(e) => {
                        warn!(error = %e, "Skipping entry whose long name could not be loaded");
                        continue;
                    }
                },
                NameKind::Short => text_name.to_string(),
            };

            match self.names.decrypt_name(&encrypted, &iv) {
                Ok(name) => {
                    trace!(name = %name, "Decrypted entry");
                    entries.push(DirEntry {
                        name: OsString::from(name),
                        kind: raw.kind,
                        ino: raw.ino,
                        cipher_name,
                    });
                }
                Err(e) => {
                    warn!(error = %e, dir = %dir.display(), "Skipping undecryptable entry");
                }
            }
        }

        debug!(count = entries.len(), "Directory listed");
        Ok(entries)
    }
}
