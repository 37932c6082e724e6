//! Encrypted file-backed session storage.
//!
//! The session lives in a single JSON envelope:
//! ```json
//! {
//!   "schema_version": 1,
//!   "payload": "<base64url(nonce || ciphertext)>"
//! }
//! ```
//! The plaintext is the camelCase JSON of the credentials.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use seletivo_application::ports::{FileSystem, FileSystemError, SessionStorage, StorageError};
use seletivo_domain::Credentials;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cipher::SessionCipher;
use crate::serialization::{from_json_bytes, to_json_compact_bytes, to_json_stable_bytes};

/// Envelope version written by this build.
pub const SESSION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SessionEnvelope {
    schema_version: u32,
    payload: String,
}

fn to_io_error(e: FileSystemError) -> std::io::Error {
    match e {
        FileSystemError::Io(io_err) => io_err,
        FileSystemError::NotFound(path) => {
            std::io::Error::new(std::io::ErrorKind::NotFound, path.display().to_string())
        }
        FileSystemError::PermissionDenied(path) => std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            path.display().to_string(),
        ),
    }
}

/// Session storage that encrypts credentials at rest.
#[derive(Debug)]
pub struct EncryptedFileSessionStorage<F> {
    fs: F,
    path: PathBuf,
    cipher: SessionCipher,
}

impl<F: FileSystem> EncryptedFileSessionStorage<F> {
    /// Creates a storage writing to `path`.
    pub fn new(fs: F, path: impl Into<PathBuf>, cipher: SessionCipher) -> Self {
        Self {
            fs,
            path: path.into(),
            cipher,
        }
    }

    /// Location of the session file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<F: FileSystem> SessionStorage for EncryptedFileSessionStorage<F> {
    async fn load(&self) -> Result<Option<Credentials>, StorageError> {
        if !self.fs.exists(&self.path).await {
            debug!(path = %self.path.display(), "no persisted session");
            return Ok(None);
        }

        let bytes = match self.fs.read_file(&self.path).await {
            Ok(bytes) => bytes,
            Err(FileSystemError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(StorageError::Io(to_io_error(e))),
        };

        let envelope: SessionEnvelope =
            from_json_bytes(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
        if envelope.schema_version != SESSION_SCHEMA_VERSION {
            return Err(StorageError::Serialization(format!(
                "unsupported session schema version {}",
                envelope.schema_version
            )));
        }

        let plaintext = self
            .cipher
            .open(&envelope.payload)
            .map_err(|e| StorageError::Crypto(e.to_string()))?;
        let credentials =
            from_json_bytes(&plaintext).map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(credentials))
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), StorageError> {
        let plaintext = to_json_compact_bytes(credentials)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let envelope = SessionEnvelope {
            schema_version: SESSION_SCHEMA_VERSION,
            payload: self
                .cipher
                .seal(&plaintext)
                .map_err(|e| StorageError::Crypto(e.to_string()))?,
        };
        let bytes =
            to_json_stable_bytes(&envelope).map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.fs
            .write_file(&self.path, &bytes)
            .await
            .map_err(|e| StorageError::Io(to_io_error(e)))?;
        debug!(path = %self.path.display(), state = ?credentials.state(), "session persisted");
        Ok(())
    }
}
