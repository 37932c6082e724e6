//! Auth API ports: token exchange, login and profile enrichment.

use async_trait::async_trait;
use seletivo_domain::{TokenPair, UserProfile};
use thiserror::Error;

/// Errors returned by the auth API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthApiError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-2xx status.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error message from the body, or the raw body.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Calls the token-exchange endpoint.
    ///
    /// # Errors
    ///
    /// Any non-2xx status, transport failure or body without an access
    /// token is an error.
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, AuthApiError>;
}

/// Authenticates a user with e-mail and password.
#[async_trait]
pub trait LoginGateway: Send + Sync {
    /// Calls the login endpoint.
    ///
    /// # Errors
    ///
    /// Wrong credentials surface as `AuthApiError::Rejected`.
    async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthApiError>;
}

/// Fetches profile fields that the access token does not carry.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Loads the profile of `user_id`, authorized by `access_token`.
    ///
    /// # Errors
    ///
    /// Returns an error when the profile endpoint fails.
    async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<UserProfile, AuthApiError>;
}
