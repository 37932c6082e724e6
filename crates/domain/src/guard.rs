//! Route guard decision function.
//!
//! `evaluate` is a pure transition from the current access token to a
//! render/redirect decision. Side effects (clearing the store, navigating)
//! are applied by the caller.

use chrono::{DateTime, Utc};

use crate::error::IdentityError;
use crate::session::UserIdentity;
use crate::token::{self, DEFAULT_MOCK_TOKEN_PREFIX, ExpiryPolicy};

/// Checks the guard applies beyond token structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPolicy {
    /// Prefix that marks a bypass token. Empty disables the check.
    pub mock_token_prefix: String,
    /// Treatment of tokens without an expiry claim.
    pub expiry: ExpiryPolicy,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            mock_token_prefix: DEFAULT_MOCK_TOKEN_PREFIX.to_string(),
            expiry: ExpiryPolicy::Permissive,
        }
    }
}

/// Why the guard refused to render protected content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No access token is held.
    NoToken,
    /// The token is structurally invalid.
    Malformed,
    /// The token carries the bypass sentinel prefix.
    BypassToken,
    /// A required identity claim is missing.
    MissingClaim {
        /// Name of the missing claim.
        claim: &'static str,
    },
    /// The token is past its expiry.
    Expired,
}

impl RejectReason {
    /// Whether the held credentials must be cleared before redirecting.
    #[must_use]
    pub const fn clears_credentials(&self) -> bool {
        !matches!(self, Self::NoToken)
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NoToken => "no_token",
            Self::Malformed => "malformed",
            Self::BypassToken => "bypass_token",
            Self::MissingClaim { .. } => "missing_claim",
            Self::Expired => "expired",
        }
    }
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the protected view for this user.
    Render {
        /// Identity read from the token claims.
        user: UserIdentity,
    },
    /// Redirect to the login route.
    Redirect {
        /// Why access was refused.
        reason: RejectReason,
    },
}

impl GuardDecision {
    /// Returns true for `Render`.
    #[must_use]
    pub const fn is_render(&self) -> bool {
        matches!(self, Self::Render { .. })
    }

    /// Returns the rejection reason for `Redirect`.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Render { .. } => None,
            Self::Redirect { reason } => Some(reason),
        }
    }
}

/// Decides whether protected content may render for `access_token` at `now`.
///
/// Checks run in order: presence, structure, bypass prefix, identity
/// claims, expiry.
#[must_use]
pub fn evaluate(
    access_token: Option<&str>,
    policy: &GuardPolicy,
    now: DateTime<Utc>,
) -> GuardDecision {
    let redirect = |reason| GuardDecision::Redirect { reason };

    let Some(access_token) = access_token else {
        return redirect(RejectReason::NoToken);
    };

    let Ok(payload) = token::decode(access_token) else {
        return redirect(RejectReason::Malformed);
    };

    if token::is_bypass_token(access_token, &policy.mock_token_prefix) {
        return redirect(RejectReason::BypassToken);
    }

    let user = match UserIdentity::from_payload(&payload) {
        Ok(user) => user,
        Err(IdentityError::MissingClaim { claim }) => {
            return redirect(RejectReason::MissingClaim { claim });
        }
    };

    let expired = match payload.expires_at_epoch_seconds {
        None => policy.expiry == ExpiryPolicy::RequireExpiry,
        Some(_) => payload.is_expired_at(now),
    };
    if expired {
        return redirect(RejectReason::Expired);
    }

    GuardDecision::Render { user }
}
