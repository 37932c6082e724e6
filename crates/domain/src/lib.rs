//! Seletivo Domain - Session core types
//!
//! This crate defines the session model for the Seletivo back-office client.
//! All types here are pure Rust with no I/O dependencies.

pub mod error;
pub mod guard;
pub mod session;
pub mod token;

pub use error::{DomainResult, IdentityError, TokenDecodeError};
pub use guard::{GuardDecision, GuardPolicy, RejectReason};
pub use session::{
    Credentials, SessionState, SessionStatus, TokenPair, UserIdentity, UserProfile,
};
pub use token::{DEFAULT_MOCK_TOKEN_PREFIX, DecodedTokenPayload, ExpiryPolicy, token_preview};
