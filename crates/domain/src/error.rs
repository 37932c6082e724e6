//! Domain error types

use thiserror::Error;

/// Errors raised while decoding a bearer token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenDecodeError {
    /// The token does not have exactly three dot-separated segments.
    #[error("expected 3 token segments, found {found}")]
    SegmentCount {
        /// Number of segments found.
        found: usize,
    },

    /// The payload segment is not valid base64url.
    #[error("invalid payload encoding: {0}")]
    InvalidEncoding(String),

    /// The payload segment does not hold a JSON object of claims.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Errors raised while building a user identity from token claims.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// A required identity claim is absent or empty.
    #[error("missing required claim: {claim}")]
    MissingClaim {
        /// Name of the claim as it appears in the token payload.
        claim: &'static str,
    },
}

/// Result type alias for token decoding.
pub type DomainResult<T> = Result<T, TokenDecodeError>;
