//! Symmetric encryption for the persisted session.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Errors raised while sealing or opening a payload.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The secret was empty.
    #[error("storage secret must not be empty")]
    EmptySecret,

    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// The payload is not valid base64 or is too short.
    #[error("invalid ciphertext")]
    InvalidCiphertext,

    /// Authentication failed: wrong key or tampered payload.
    #[error("decryption failed")]
    Decrypt,
}

/// ChaCha20-Poly1305 cipher keyed by the SHA-256 digest of a secret.
///
/// Sealed payloads are `base64url(nonce || ciphertext)` with a fresh
/// random 12-byte nonce per call.
#[derive(Clone)]
pub struct SessionCipher {
    key: [u8; 32],
}

impl SessionCipher {
    /// Derives the key from `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EmptySecret`] for an empty or blank secret.
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        if secret.trim().is_empty() {
            return Err(CryptoError::EmptySecret);
        }
        Ok(Self {
            key: Sha256::digest(secret.as_bytes()).into(),
        })
    }

    /// Encrypts `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns an error if the AEAD rejects the input.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Decrypts a payload produced by [`Self::seal`].
    ///
    /// # Errors
    ///
    /// Returns an error for malformed payloads, a wrong key or tampering.
    pub fn open(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let payload = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidCiphertext)?;
        if payload.len() <= NONCE_LEN {
            return Err(CryptoError::InvalidCiphertext);
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_seal_then_open() {
        let cipher = SessionCipher::from_secret("s3cret").unwrap();
        let sealed = cipher.seal(b"{\"accessToken\":\"abc\"}").unwrap();

        assert!(!sealed.contains("abc"));
        assert_eq!(cipher.open(&sealed).unwrap(), b"{\"accessToken\":\"abc\"}".to_vec());
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let cipher = SessionCipher::from_secret("s3cret").unwrap();
        assert_ne!(cipher.seal(b"same").unwrap(), cipher.seal(b"same").unwrap());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sealed = SessionCipher::from_secret("one").unwrap().seal(b"data").unwrap();
        let other = SessionCipher::from_secret("two").unwrap();

        assert_eq!(other.open(&sealed), Err(CryptoError::Decrypt));
    }

    #[test]
    fn test_short_or_garbage_payload() {
        let cipher = SessionCipher::from_secret("s3cret").unwrap();
        assert_eq!(cipher.open("AAAA"), Err(CryptoError::InvalidCiphertext));
        assert_eq!(cipher.open("***"), Err(CryptoError::InvalidCiphertext));
    }

    #[test]
    fn test_blank_secret_rejected() {
        assert_eq!(
            SessionCipher::from_secret("  ").unwrap_err(),
            CryptoError::EmptySecret
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let cipher = SessionCipher::from_secret("s3cret").unwrap();
        assert_eq!(format!("{cipher:?}"), "SessionCipher { .. }");
    }
}
