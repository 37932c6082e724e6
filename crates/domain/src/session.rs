//! Session state types.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::token::{self, DecodedTokenPayload, token_preview};

/// Identity of the signed-in user.
///
/// Built from the access token claims; the profile fields may be filled in
/// afterwards from the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// User identifier (token subject).
    pub id: String,
    /// Granted role names.
    pub roles: BTreeSet<String>,
    /// Tenant identifier.
    pub tenant_id: String,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// E-mail address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserIdentity {
    /// Creates an identity without profile fields.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        roles: impl IntoIterator<Item = impl Into<String>>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            tenant_id: tenant_id.into(),
            first_name: None,
            last_name: None,
            email: None,
        }
    }

    /// Builds an identity from decoded token claims.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::MissingClaim` when `sub`, `roles` or
    /// `tenantId` is absent. An empty role list is accepted.
    pub fn from_payload(payload: &DecodedTokenPayload) -> Result<Self, IdentityError> {
        let id = payload
            .subject
            .clone()
            .ok_or(IdentityError::MissingClaim { claim: "sub" })?;
        let roles = payload
            .roles
            .clone()
            .ok_or(IdentityError::MissingClaim { claim: "roles" })?;
        let tenant_id = payload
            .tenant_id
            .clone()
            .ok_or(IdentityError::MissingClaim { claim: "tenantId" })?;

        Ok(Self {
            id,
            roles: roles.into_iter().collect(),
            tenant_id,
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            email: payload.email.clone(),
        })
    }

    /// Fills profile fields from the enrichment call. Fields the profile
    /// leaves empty keep their current value.
    #[must_use]
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.first_name = profile.first_name.or(self.first_name);
        self.last_name = profile.last_name.or(self.last_name);
        self.email = profile.email.or(self.email);
        self
    }

    /// Returns true if the user holds the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Name for display, falling back to e-mail and then the id.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => self.email.clone().unwrap_or_else(|| self.id.clone()),
        }
    }
}

/// Profile fields returned by the enrichment endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// E-mail address.
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens issued by the login or token-exchange endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// New access token.
    pub access_token: String,
    /// Rotated refresh token, when the endpoint issues one.
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Creates a token pair.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &token_preview(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(token_preview),
            )
            .finish()
    }
}

/// The full session credential state.
///
/// `access_token` and `user` are set and cleared together.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Current access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Current refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Signed-in user.
    #[serde(default)]
    pub user: Option<UserIdentity>,
}

impl Credentials {
    /// Empty credentials.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            user: None,
        }
    }

    /// Credentials of a signed-in user.
    #[must_use]
    pub fn authenticated(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        user: UserIdentity,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            user: Some(user),
        }
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.access_token.is_some() && self.user.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        }
    }

    /// Whether the access-token/user pairing holds.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.access_token.is_some() == self.user.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field(
                "access_token",
                &self.access_token.as_deref().map(token_preview),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(token_preview),
            )
            .field("user", &self.user)
            .finish()
    }
}

/// Session state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No user signed in.
    Anonymous,
    /// A user is signed in.
    Authenticated,
}

/// Read-only session summary for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No user signed in.
    Anonymous,
    /// A user is signed in.
    Authenticated {
        /// The signed-in user.
        user: UserIdentity,
        /// Seconds until the access token expires, or `None` if it has no
        /// expiry or cannot be decoded.
        seconds_remaining: Option<i64>,
        /// Whether a refresh token is held.
        can_refresh: bool,
    },
}

impl SessionStatus {
    /// Summarizes credentials at `now`.
    #[must_use]
    pub fn from_credentials(credentials: &Credentials, now: DateTime<Utc>) -> Self {
        match (&credentials.access_token, &credentials.user) {
            (Some(access_token), Some(user)) => Self::Authenticated {
                user: user.clone(),
                seconds_remaining: token::decode(access_token)
                    .ok()
                    .and_then(|p| p.seconds_until_expiry(now)),
                can_refresh: credentials.refresh_token.is_some(),
            },
            _ => Self::Anonymous,
        }
    }

    /// Get a user-friendly display message.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Anonymous => "Not signed in".to_string(),
            Self::Authenticated {
                user,
                seconds_remaining,
                ..
            } => {
                let name = user.display_name();
                match seconds_remaining {
                    None => format!("Signed in as {name} (no expiry)"),
                    Some(secs) if *secs <= 0 => format!("Signed in as {name} (token expired)"),
                    Some(secs) if *secs > 3600 => {
                        format!("Signed in as {name}, valid for {} hours", secs / 3600)
                    }
                    Some(secs) if *secs > 60 => {
                        format!("Signed in as {name}, valid for {} minutes", secs / 60)
                    }
                    Some(secs) => format!("Signed in as {name}, valid for {secs} seconds"),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload(subject: Option<&str>, roles: Option<&[&str]>, tenant: Option<&str>) -> DecodedTokenPayload {
        DecodedTokenPayload {
            subject: subject.map(String::from),
            roles: roles.map(|r| r.iter().map(ToString::to_string).collect()),
            tenant_id: tenant.map(String::from),
            ..DecodedTokenPayload::default()
        }
    }

    #[test]
    fn test_identity_from_payload() {
        let user = UserIdentity::from_payload(&payload(Some("42"), Some(&["ADMIN"]), Some("t1")))
            .unwrap();
        assert_eq!(user, UserIdentity::new("42", ["ADMIN"], "t1"));
        assert!(user.has_role("ADMIN"));
        assert!(!user.has_role("STAFF"));
    }

    #[test]
    fn test_identity_requires_each_claim() {
        let cases = [
            (payload(None, Some(&["A"]), Some("t")), "sub"),
            (payload(Some("1"), None, Some("t")), "roles"),
            (payload(Some("1"), Some(&["A"]), None), "tenantId"),
        ];
        for (p, claim) in cases {
            assert_eq!(
                UserIdentity::from_payload(&p),
                Err(IdentityError::MissingClaim { claim })
            );
        }
    }

    #[test]
    fn test_identity_accepts_empty_roles() {
        let user = UserIdentity::from_payload(&payload(Some("1"), Some(&[]), Some("t"))).unwrap();
        assert!(user.roles.is_empty());
    }

    #[test]
    fn test_with_profile_keeps_existing_fields() {
        let mut user = UserIdentity::new("7", ["STAFF"], "t1");
        user.email = Some("old@example.com".to_string());

        let enriched = user.with_profile(UserProfile {
            first_name: Some("Ana".to_string()),
            last_name: Some("Souza".to_string()),
            email: None,
        });

        assert_eq!(enriched.display_name(), "Ana Souza");
        assert_eq!(enriched.email.as_deref(), Some("old@example.com"));
    }

    #[test]
    fn test_credentials_state() {
        assert_eq!(Credentials::anonymous().state(), SessionState::Anonymous);

        let creds = Credentials::authenticated("a", Some("r".into()), UserIdentity::new("1", ["A"], "t"));
        assert_eq!(creds.state(), SessionState::Authenticated);
        assert!(creds.is_consistent());

        let torn = Credentials {
            access_token: Some("a".to_string()),
            ..Credentials::default()
        };
        assert_eq!(torn.state(), SessionState::Anonymous);
        assert!(!torn.is_consistent());
    }

    #[test]
    fn test_credentials_debug_redacts_tokens() {
        let creds = Credentials::authenticated(
            "eyJhbGciOiJIUzI1NiJ9.secret.payload",
            None,
            UserIdentity::new("1", ["A"], "t"),
        );
        let debug = format!("{creds:?}");
        assert!(debug.contains("eyJhbGci..."));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_credentials_serde_uses_camel_case() {
        let creds = Credentials::authenticated("a", None, UserIdentity::new("1", ["A"], "t"));
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["user"]["tenantId"], "t");

        let restored: Credentials = serde_json::from_value(json).unwrap();
        assert_eq!(restored, creds);
    }

    #[test]
    fn test_status_display_messages() {
        assert_eq!(SessionStatus::Anonymous.display_message(), "Not signed in");

        let status = SessionStatus::Authenticated {
            user: UserIdentity::new("42", ["ADMIN"], "t1"),
            seconds_remaining: Some(7200),
            can_refresh: true,
        };
        assert_eq!(status.display_message(), "Signed in as 42, valid for 2 hours");
    }
}
