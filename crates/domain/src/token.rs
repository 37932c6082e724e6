//! Bearer token codec.
//!
//! Access tokens are JWTs. Only the structure and the payload claims are
//! inspected here; signature verification is the API server's job.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{DomainResult, TokenDecodeError};

/// Number of dot-separated segments in a well-formed token.
pub const TOKEN_SEGMENTS: usize = 3;

/// Prefix carried by non-production bypass tokens.
pub const DEFAULT_MOCK_TOKEN_PREFIX: &str = "mock-";

/// Claims read from the payload segment of an access token.
///
/// Recomputed from the raw token whenever needed and never stored.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct DecodedTokenPayload {
    /// User identifier (`sub`). Numeric subjects are kept as their decimal text.
    #[serde(rename = "sub", default, deserialize_with = "claim_text")]
    pub subject: Option<String>,

    /// Role names granted to the user.
    #[serde(default, alias = "authorities")]
    pub roles: Option<Vec<String>>,

    /// Tenant the user belongs to.
    #[serde(
        rename = "tenantId",
        alias = "tenant_id",
        alias = "tenant",
        default,
        deserialize_with = "claim_text"
    )]
    pub tenant_id: Option<String>,

    /// Expiry as seconds since the Unix epoch (`exp`).
    #[serde(rename = "exp", default, deserialize_with = "numeric_date")]
    pub expires_at_epoch_seconds: Option<i64>,

    /// Issue time as seconds since the Unix epoch (`iat`).
    #[serde(rename = "iat", default, deserialize_with = "numeric_date")]
    pub issued_at_epoch_seconds: Option<i64>,

    /// Given name, when the issuer embeds it.
    #[serde(rename = "firstName", alias = "given_name", default)]
    pub first_name: Option<String>,

    /// Family name, when the issuer embeds it.
    #[serde(rename = "lastName", alias = "family_name", default)]
    pub last_name: Option<String>,

    /// E-mail address, when the issuer embeds it.
    #[serde(default)]
    pub email: Option<String>,

    /// Every other claim, untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DecodedTokenPayload {
    /// Expiry instant, if the token carries one.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at_epoch_seconds
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Whether the token is past its expiry at `now`.
    ///
    /// A payload without `exp` never expires.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_epoch_seconds
            .is_some_and(|exp| now.timestamp_millis() > exp.saturating_mul(1000))
    }

    /// Seconds left before expiry, or `None` when the token has no expiry.
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at_epoch_seconds
            .map(|exp| exp.saturating_sub(now.timestamp()))
    }
}

/// How tokens without an `exp` claim are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Missing `exp` means the token never expires.
    #[default]
    Permissive,
    /// Missing `exp` is treated as expired.
    RequireExpiry,
}

/// Decodes the payload of a bearer token.
///
/// # Errors
///
/// Fails when the token does not have exactly three dot-separated segments,
/// or when the middle segment is not base64url-encoded JSON.
pub fn decode(token: &str) -> DomainResult<DecodedTokenPayload> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(TokenDecodeError::SegmentCount {
            found: segments.len(),
        });
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| TokenDecodeError::InvalidEncoding(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| TokenDecodeError::InvalidPayload(e.to_string()))
}

/// Returns true when the token cannot be decoded or is past its expiry.
#[must_use]
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    is_expired_with(token, now, ExpiryPolicy::Permissive)
}

/// Same as [`is_expired`], with an explicit policy for tokens without `exp`.
#[must_use]
pub fn is_expired_with(token: &str, now: DateTime<Utc>, policy: ExpiryPolicy) -> bool {
    decode(token).map_or(true, |payload| match payload.expires_at_epoch_seconds {
        None => policy == ExpiryPolicy::RequireExpiry,
        Some(_) => payload.is_expired_at(now),
    })
}

/// Returns true when the token carries the bypass sentinel prefix.
#[must_use]
pub fn is_bypass_token(token: &str, prefix: &str) -> bool {
    !prefix.is_empty() && token.starts_with(prefix)
}

/// Short, log-safe preview of a token (first 8 chars + ...).
#[must_use]
pub fn token_preview(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    format!("{head}...")
}

fn claim_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        },
    )
}

// NumericDate may be fractional.
#[allow(clippy::cast_possible_truncation)]
fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.floor() as i64)),
            _ => None,
        },
    )
}
