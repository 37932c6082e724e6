//! Application error types

use seletivo_domain::{IdentityError, TokenDecodeError};
use thiserror::Error;

use crate::ports::AuthApiError;
use crate::session::StoreError;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// The issued access token could not be decoded.
    #[error("invalid access token: {0}")]
    Token(#[from] TokenDecodeError),

    /// The issued access token lacks identity claims.
    #[error("incomplete identity: {0}")]
    Identity(#[from] IdentityError),

    /// The auth API call failed.
    #[error("auth API error: {0}")]
    AuthApi(#[from] AuthApiError),

    /// The credential store could not persist the session.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
