//! Key material for filename encryption

pub mod keys;

pub use keys::NameKey;
