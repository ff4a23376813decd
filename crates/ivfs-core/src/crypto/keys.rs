#![forbid(unsafe_code)]

use std::fmt;

use rand::RngCore;
use zeroize::Zeroizing;

/// Size of the combined AES-SIV key (MAC key || encryption key).
pub const NAME_KEY_LEN: usize = 64;

/// Key used to encrypt and decrypt entry names.
///
/// Holds 512 bits of AES-SIV key material. The bytes live in a heap allocation
/// wrapped in [`Zeroizing`], so they are wiped when the key is dropped, and they
/// are only reachable through the scoped [`with_siv_key`](Self::with_siv_key)
/// accessor.
///
/// # Thread Safety
///
/// The key is immutable after construction and can be shared across threads
/// behind an `Arc<NameKey>`.
pub struct NameKey {
    siv_key: Box<Zeroizing<[u8; NAME_KEY_LEN]>>,
}

impl NameKey {
    /// Generate a new random key using a cryptographically secure RNG.
    pub fn random() -> Self {
        let mut bytes = Zeroizing::new([0u8; NAME_KEY_LEN]);
        rand::rng().fill_bytes(bytes.as_mut());
        Self {
            siv_key: Box::new(bytes),
        }
    }

    /// Create a key from raw key material.
    ///
    /// The caller is responsible for zeroing its own copy of `bytes`.
    pub fn new(bytes: [u8; NAME_KEY_LEN]) -> Self {
        Self {
            siv_key: Box::new(Zeroizing::new(bytes)),
        }
    }

    /// Execute a function with access to the raw AES-SIV key.
    ///
    /// The key reference cannot escape the callback.
    pub fn with_siv_key<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; NAME_KEY_LEN]) -> R,
    {
        f(&self.siv_key)
    }
}

impl fmt::Debug for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameKey").finish_non_exhaustive()
    }
}
