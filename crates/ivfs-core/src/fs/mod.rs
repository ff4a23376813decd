//! On-disk building blocks: raw primitives, IV files and name handling

pub mod backing;
pub mod diriv;
pub mod longname;
pub mod name;

// Re-export commonly used types
pub use backing::{EntryKind, PosixFs, RawEntry, RawFs};
pub use diriv::{DIRIV_FILENAME, DIRIV_LEN, DIRIV_TEMP_PREFIX, DirIv, DirIvCache, DirIvError, DirIvStore};
pub use longname::{
    LONGNAME_PREFIX, LONGNAME_SUFFIX, NameKind, companion_name, delete_long_name, is_long,
    load_long_name, long_name_hash, store_long_name,
};
pub use name::{NameContext, NameError, NameTransform};
