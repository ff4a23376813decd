//! Directory-entry layer of an encrypted overlay filesystem.
//!
//! Every backing directory carries a 16-byte IV file that keys the encryption
//! of the names inside it, and encrypted names that are too long for the
//! backing filesystem live in companion files. [`IvFs`] keeps the directory,
//! its IV file and its companion consistent across create, remove and list,
//! rolling back partial work and serializing the inconsistent windows behind
//! one lock.
//!
//! ```no_run
//! use ivfs_core::{FsConfig, IvFs, NameKey};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), ivfs_core::DirOpError> {
//! let fs = IvFs::create(Path::new("/srv/cipher"), FsConfig::new(), NameKey::random())?;
//! fs.create_directory("/photos", 0o755)?;
//! for entry in fs.list_directory("/")? {
//!     println!("{:?}", entry.name);
//! }
//! fs.remove_directory("/photos")?;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod fs;
pub mod overlay;

pub use crypto::NameKey;
pub use error::{DirOpContext, DirOpError};
pub use overlay::{DirEntry, FeatureFlag, FsConfig, IvFs, VirtualPath};

#[cfg(feature = "async")]
pub use overlay::IvFsAsync;
