//! Out-of-line storage for over-long encrypted names.
//!
//! An encrypted name longer than the configured threshold cannot be used as an
//! on-disk name directly. It is replaced by a fixed-length *long-content* name
//! derived from its hash, and the full encrypted name is written to a
//! *companion* file next to it:
//!
//! ```text
//! ivfs.longname.<base64url(sha256(full name))>        <- the entry itself
//! ivfs.longname.<base64url(sha256(full name))>.name   <- companion file
//! ```
//!
//! A companion without its entry is a tolerated leftover: listings skip
//! companion files unconditionally.

use std::io;
use std::os::fd::BorrowedFd;
use std::path::Path;

use base64::{Engine as _, engine::general_purpose};
use ring::digest;
use tracing::debug;

use crate::fs::backing::RawFs;
use crate::fs::name::{NameContext, NameError};

/// Prefix of every long-content name.
pub const LONGNAME_PREFIX: &str = "ivfs.longname.";

/// Suffix appended to a long-content name to get its companion file.
pub const LONGNAME_SUFFIX: &str = ".name";

/// Permission bits of companion files.
const COMPANION_MODE: u32 = 0o400;

/// How an on-disk name must be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// A regular encrypted name.
    Short,
    /// A hashed stand-in whose full name lives in a companion file.
    LongContent,
    /// The companion file of a [`NameKind::LongContent`] entry.
    LongCompanion,
}

impl NameKind {
    pub fn classify(name: &str) -> Self {
        if !name.starts_with(LONGNAME_PREFIX) {
            NameKind::Short
        } else if name.ends_with(LONGNAME_SUFFIX) {
            NameKind::LongCompanion
        } else {
            NameKind::LongContent
        }
    }
}

/// Whether an encrypted name must be stored out-of-line.
#[inline]
pub fn is_long(encrypted_name: &str, long_name_max: usize) -> bool {
    encrypted_name.len() > long_name_max
}

/// Long-content name for a full encrypted name.
pub fn long_name_hash(encrypted_name: &str) -> String {
    let hash = digest::digest(&digest::SHA256, encrypted_name.as_bytes());
    format!(
        "{LONGNAME_PREFIX}{}",
        general_purpose::URL_SAFE_NO_PAD.encode(hash.as_ref())
    )
}

/// Companion file name for a long-content name.
#[inline]
pub fn companion_name(long_name: &str) -> String {
    format!("{long_name}{LONGNAME_SUFFIX}")
}

/// Write the companion file for `long_name` into `dir`.
///
/// Fails if the companion already exists.
pub fn store_long_name(
    raw: &dyn RawFs,
    dir: BorrowedFd<'_>,
    long_name: &str,
    encrypted_name: &str,
) -> io::Result<()> {
    debug!(long_name, "Writing long name companion");
    raw.write_new_file_at(
        dir,
        &companion_name(long_name),
        encrypted_name.as_bytes(),
        COMPANION_MODE,
    )
}

/// Read the full encrypted name of `long_name` from its companion in `dir_path`.
///
/// The content must hash back to `long_name`, so a companion that belongs to
/// another entry is never trusted.
pub fn load_long_name(raw: &dyn RawFs, dir_path: &Path, long_name: &str) -> Result<String, NameError> {
    let context = || {
        NameContext::new()
            .with_encrypted_name(long_name)
            .with_directory(dir_path.display().to_string())
    };

    let content = raw
        .read_file(&dir_path.join(companion_name(long_name)))
        .map_err(|e| NameError::LongName {
            reason: e.to_string(),
            context: context(),
        })?;

    let encrypted_name = String::from_utf8(content).map_err(|e| NameError::LongName {
        reason: format!("companion is not UTF-8: {e}"),
        context: context(),
    })?;

    if encrypted_name.is_empty() || long_name_hash(&encrypted_name) != long_name {
        return Err(NameError::LongName {
            reason: "companion content does not match the entry name".to_string(),
            context: context(),
        });
    }
    Ok(encrypted_name)
}

/// Remove the companion file of `long_name` from `dir`.
///
/// Callers treat a failure as a leak, not an error: a stray companion is
/// ignored by listings.
pub fn delete_long_name(raw: &dyn RawFs, dir: BorrowedFd<'_>, long_name: &str) -> io::Result<()> {
    debug!(long_name, "Deleting long name companion");
    raw.unlink_at(dir, &companion_name(long_name))
}
