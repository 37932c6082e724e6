//! Seletivo Application - Session services and ports
//!
//! This crate defines the application layer with:
//! - Port traits (interfaces for storage, the auth API, HTTP and navigation)
//! - The credential store, refresh coordinator and route guard
//! - Application-level error handling

pub mod error;
pub mod ports;
pub mod session;

pub use error::{ApplicationError, ApplicationResult};
pub use session::{
    ClearReason, CredentialStore, RefreshOutcome, RouteGuard, SessionRefreshCoordinator, SignIn,
    StoreError,
};
