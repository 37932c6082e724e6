//! Session storage port
//!
//! Defines the interface for durable credential persistence.

use async_trait::async_trait;
use parking_lot::Mutex;
use seletivo_domain::Credentials;

/// Errors that can occur during session storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Encryption or decryption failed.
    #[error("Crypto error: {0}")]
    Crypto(String),
}

/// Durable key-value slot holding the credential state.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Loads the persisted credentials.
    ///
    /// # Returns
    /// `None` if nothing was ever persisted.
    ///
    /// # Errors
    /// Returns an error if the stored value cannot be read or decrypted.
    async fn load(&self) -> Result<Option<Credentials>, StorageError>;

    /// Persists the credentials, replacing the previous value.
    ///
    /// # Errors
    /// Returns an error if the value cannot be written.
    async fn save(&self, credentials: &Credentials) -> Result<(), StorageError>;
}

/// Non-durable storage that keeps the last saved value in memory.
#[derive(Debug, Default)]
pub struct InMemorySessionStorage {
    slot: Mutex<Option<Credentials>>,
    writes: Mutex<usize>,
}

impl InMemorySessionStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-loaded with `credentials`.
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
            writes: Mutex::new(0),
        }
    }

    /// Last saved value.
    #[must_use]
    pub fn current(&self) -> Option<Credentials> {
        self.slot.lock().clone()
    }

    /// Number of `save` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn load(&self) -> Result<Option<Credentials>, StorageError> {
        Ok(self.current())
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), StorageError> {
        *self.slot.lock() = Some(credentials.clone());
        *self.writes.lock() += 1;
        Ok(())
    }
}
