//! Seletivo Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer: the authenticated HTTP client,
//! the auth API, encrypted session storage and configuration.

pub mod adapters;
pub mod auth;
pub mod persistence;
pub mod serialization;
pub mod settings;

pub use adapters::{ApiResponse, HttpClientError, ReqwestApiClient, SystemClock};
pub use auth::{AuthEndpoints, HttpAuthApi};
pub use persistence::{
    CryptoError, EncryptedFileSessionStorage, SESSION_SCHEMA_VERSION, SessionCipher,
    TokioFileSystem,
};
pub use serialization::{
    SerializationError, from_json_bytes, to_json_compact_bytes, to_json_stable,
    to_json_stable_bytes,
};
pub use settings::{SessionSettings, SettingsError};
