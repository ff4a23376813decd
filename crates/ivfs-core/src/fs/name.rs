use std::fmt;
use std::sync::Arc;

use aes_siv::{KeyInit, siv::Aes256Siv};
use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::crypto::NameKey;
use crate::fs::diriv::DirIv;

/// Context for filename operations, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct NameContext {
    /// The encrypted filename (if available)
    pub encrypted_name: Option<String>,
    /// The cleartext filename (if available, e.g., during encryption)
    pub cleartext_name: Option<String>,
    /// The backing directory holding the entry
    pub directory: Option<String>,
}

impl NameContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encrypted_name(mut self, name: impl Into<String>) -> Self {
        self.encrypted_name = Some(name.into());
        self
    }

    pub fn with_cleartext_name(mut self, name: impl Into<String>) -> Self {
        self.cleartext_name = Some(name.into());
        self
    }

    pub fn with_directory(mut self, dir: impl Into<String>) -> Self {
        self.directory = Some(dir.into());
        self
    }
}

impl fmt::Display for NameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref name) = self.cleartext_name {
            parts.push(format!("filename '{name}'"));
        } else if let Some(ref enc_name) = self.encrypted_name {
            // Truncate long encrypted names for readability
            // On-disk names need not be ASCII, so cut on a char boundary
            let display_name = if enc_name.chars().count() > 40 {
                format!("{}...", enc_name.chars().take(37).collect::<String>())
            } else {
                enc_name.clone()
            };
            parts.push(format!("encrypted name '{display_name}'"));
        }

        if let Some(ref dir) = self.directory {
            parts.push(format!("in directory {dir}"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// Errors that can occur during filename encryption/decryption.
///
/// # Security Classification
///
/// Decryption failures indicate **integrity violations** since AES-SIV is authenticated
/// encryption. If decryption fails, the ciphertext has been tampered with, the wrong
/// key was used, or the entry was decrypted with another directory's IV.
#[derive(Error, Debug)]
pub enum NameError {
    /// AES-SIV decryption failed - the ciphertext is invalid or tampered.
    ///
    /// **[INTEGRITY VIOLATION]** This indicates either:
    /// - The encrypted filename was tampered with
    /// - The wrong key was used
    /// - The entry was moved between directories without re-encryption
    #[error("[INTEGRITY VIOLATION] Failed to decrypt {context}: authentication failed")]
    DecryptionFailed { context: NameContext },

    /// Base64 decoding failed - the encrypted filename is malformed.
    #[error("Invalid base64 encoding for {context}: {reason}")]
    Base64Decode { reason: String, context: NameContext },

    /// The decrypted bytes are not valid UTF-8.
    #[error("Invalid UTF-8 after decryption for {context}: {reason}")]
    Utf8Decode { reason: String, context: NameContext },

    /// The decrypted name can never be a single path component.
    #[error("Decrypted name is not a valid entry name for {context}")]
    InvalidPlaintext { context: NameContext },

    /// A long-name companion file could not be read or is malformed.
    #[error("Long name for {context} unavailable: {reason}")]
    LongName { reason: String, context: NameContext },

    /// Encryption failed unexpectedly.
    ///
    /// **[PROGRAMMING ERROR]** AES-SIV encryption should not fail with valid inputs.
    #[error("Unexpected encryption failure for {context}")]
    EncryptionFailed { context: NameContext },
}

/// Encrypts and decrypts single path components.
///
/// Names are encrypted with AES-SIV, using the IV of the directory that holds
/// the entry as associated data. The same name therefore encrypts differently
/// in every directory, and an entry copied into another directory fails to
/// decrypt there.
#[derive(Debug, Clone)]
pub struct NameTransform {
    key: Arc<NameKey>,
}

impl NameTransform {
    pub fn new(key: Arc<NameKey>) -> Self {
        Self { key }
    }

    /// Encrypt a plaintext name for the directory whose IV is `iv`.
    ///
    /// The name is normalized to Unicode NFC first so that NFC and NFD
    /// spellings of the same name map to the same ciphertext. The result is
    /// base64url without padding.
    pub fn encrypt_name(&self, name: &str, iv: &DirIv) -> Result<String, NameError> {
        let normalized: String = name.nfc().collect();

        self.key.with_siv_key(|key| {
            let context = || NameContext::new().with_cleartext_name(name);
            let mut cipher = Aes256Siv::new_from_slice(key)
                .map_err(|_| NameError::EncryptionFailed { context: context() })?;

            let associated_data: &[&[u8]] = &[iv.as_bytes()];
            let encrypted = cipher
                .encrypt(associated_data, normalized.as_bytes())
                .map_err(|_| NameError::EncryptionFailed { context: context() })?;

            Ok(general_purpose::URL_SAFE_NO_PAD.encode(encrypted))
        })
    }

    /// Decrypt an encrypted name found in the directory whose IV is `iv`.
    ///
    /// Accepts both padded and unpadded base64url.
    ///
    /// # Errors
    ///
    /// - `NameError::Base64Decode`: the name is not base64url
    /// - `NameError::DecryptionFailed`: **[INTEGRITY VIOLATION]**
    /// - `NameError::Utf8Decode`: the plaintext is not UTF-8
    /// - `NameError::InvalidPlaintext`: the plaintext is empty, `.`, `..`, or
    ///   contains `/` or NUL
    pub fn decrypt_name(&self, encrypted_name: &str, iv: &DirIv) -> Result<String, NameError> {
        let context = || NameContext::new().with_encrypted_name(encrypted_name);

        let decoded = general_purpose::URL_SAFE_NO_PAD
            .decode(encrypted_name.as_bytes())
            .or_else(|_| general_purpose::URL_SAFE.decode(encrypted_name.as_bytes()))
            .map_err(|e| NameError::Base64Decode {
                reason: e.to_string(),
                context: context(),
            })?;

        let plaintext = self.key.with_siv_key(|key| {
            let mut cipher = Aes256Siv::new_from_slice(key)
                .map_err(|_| NameError::DecryptionFailed { context: context() })?;
            let associated_data: &[&[u8]] = &[iv.as_bytes()];
            cipher
                .decrypt(associated_data, &decoded)
                .map_err(|_| NameError::DecryptionFailed { context: context() })
        })?;

        let name = String::from_utf8(plaintext).map_err(|e| NameError::Utf8Decode {
            reason: e.to_string(),
            context: context(),
        })?;

        if !is_valid_component(&name) {
            return Err(NameError::InvalidPlaintext { context: context() });
        }
        Ok(name)
    }
}

/// Whether `name` can stand as a single path component.
pub fn is_valid_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_transform() -> NameTransform {
        NameTransform::new(Arc::new(NameKey::new([0x11; 64])))
    }

    fn iv(byte: u8) -> DirIv {
        DirIv::from_bytes([byte; 16])
    }

    #[test]
    fn test_filename_roundtrip() {
        let names = create_test_transform();
        for name in ["a", "test.txt", "file with spaces", "файл-测试-🔐", ".hidden"] {
            let encrypted = names.encrypt_name(name, &iv(1)).unwrap();
            let decrypted = names.decrypt_name(&encrypted, &iv(1)).unwrap();
            assert_eq!(decrypted, name);
        }
    }

    #[test]
    fn test_encryption_is_deterministic_per_directory() {
        let names = create_test_transform();
        let a = names.encrypt_name("report.pdf", &iv(1)).unwrap();
        let b = names.encrypt_name("report.pdf", &iv(1)).unwrap();
        let c = names.encrypt_name("report.pdf", &iv(2)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c, "Different directory IVs should produce different ciphertexts");
    }

    #[test]
    fn test_decryption_with_wrong_iv_fails() {
        let names = create_test_transform();
        let encrypted = names.encrypt_name("secret", &iv(1)).unwrap();
        let err = names.decrypt_name(&encrypted, &iv(2)).unwrap_err();
        assert!(matches!(err, NameError::DecryptionFailed { .. }));
    }

    #[test]
    fn test_decryption_with_wrong_key_fails() {
        let names = create_test_transform();
        let other = NameTransform::new(Arc::new(NameKey::new([0x22; 64])));
        let encrypted = names.encrypt_name("secret", &iv(1)).unwrap();
        assert!(other.decrypt_name(&encrypted, &iv(1)).is_err());
    }

    #[test]
    fn test_invalid_base64_fails() {
        let names = create_test_transform();
        let err = names.decrypt_name("not*base64!", &iv(1)).unwrap_err();
        assert!(matches!(err, NameError::Base64Decode { .. }));
    }

    #[test]
    fn test_encrypted_names_are_path_safe() {
        let names = create_test_transform();
        let encrypted = names.encrypt_name("some/odd\\name", &iv(3)).unwrap();
        assert!(!encrypted.contains('/'));
        assert!(!encrypted.contains('='));
        assert!(!encrypted.contains('+'));
    }

    #[test]
    fn test_decrypt_accepts_padded_input() {
        let names = create_test_transform();
        let encrypted = names.encrypt_name("x", &iv(4)).unwrap();
        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(&encrypted).unwrap();
        let padded = general_purpose::URL_SAFE.encode(bytes);
        assert_eq!(names.decrypt_name(&padded, &iv(4)).unwrap(), "x");
    }

    #[test]
    fn test_nfd_input_normalizes_to_nfc() {
        let names = create_test_transform();
        let nfc = "caf\u{e9}";
        let nfd = "cafe\u{301}";
        let a = names.encrypt_name(nfc, &iv(5)).unwrap();
        let b = names.encrypt_name(nfd, &iv(5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(names.decrypt_name(&b, &iv(5)).unwrap(), nfc);
    }

    #[test]
    fn test_plaintext_that_is_not_a_component_is_rejected() {
        let names = create_test_transform();
        for bad in ["..", "a/b"] {
            let encrypted = names.encrypt_name(bad, &iv(6)).unwrap();
            let err = names.decrypt_name(&encrypted, &iv(6)).unwrap_err();
            assert!(matches!(err, NameError::InvalidPlaintext { .. }), "{bad}");
        }
    }

    #[test]
    fn test_name_context_truncates_long_names() {
        let ctx = NameContext::new()
            .with_encrypted_name("A".repeat(100))
            .with_directory("/tmp/x");
        let rendered = ctx.to_string();
        assert!(rendered.contains("..."));
        assert!(rendered.contains("in directory /tmp/x"));
        assert_eq!(NameContext::new().to_string(), "(no context)");
    }

    #[test]
    fn test_name_context_truncates_multibyte_names() {
        // 50 bytes but 25 chars, short enough to show whole
        let ctx = NameContext::new().with_encrypted_name("\u{e9}".repeat(25));
        assert_eq!(ctx.to_string(), format!("encrypted name '{}'", "\u{e9}".repeat(25)));

        let ctx = NameContext::new().with_encrypted_name("\u{e9}".repeat(50));
        assert_eq!(ctx.to_string(), format!("encrypted name '{}...'", "\u{e9}".repeat(37)));
    }
}
