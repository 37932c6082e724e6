//! Session persistence on the local file system.

mod cipher;
mod file_system;
mod session_storage;

pub use cipher::{CryptoError, SessionCipher};
pub use file_system::TokioFileSystem;
pub use session_storage::{EncryptedFileSessionStorage, SESSION_SCHEMA_VERSION};
