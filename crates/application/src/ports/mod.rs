//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the session core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod auth_api;
mod clock;
mod file_system;
mod http_auth;
mod navigator;
mod session_storage;

pub use auth_api::{AuthApiError, LoginGateway, ProfileLookup, TokenExchange};
pub use clock::{Clock, FixedClock};
pub use file_system::{FileSystem, FileSystemError};
pub use http_auth::{AuthTokenSink, UnauthorizedHandler};
pub use navigator::Navigator;
pub use session_storage::{InMemorySessionStorage, SessionStorage, StorageError};
