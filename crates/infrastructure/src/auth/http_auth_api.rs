//! Auth API client over HTTP.
//!
//! Talks to the login, token-exchange and profile endpoints with its own
//! reqwest client. It never goes through [`crate::ReqwestApiClient`], so
//! a rejected refresh cannot re-enter the unauthorized handler.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use seletivo_application::ports::{AuthApiError, LoginGateway, ProfileLookup, TokenExchange};
use seletivo_domain::{TokenPair, UserProfile, token_preview};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::{HttpClientError, with_trailing_slash};

/// Placeholder for the user id in the profile path template.
const USER_ID_PLACEHOLDER: &str = "{id}";

/// Token response from the login and token-exchange endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(default, alias = "access_token", alias = "token")]
    access_token: Option<String>,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Endpoint paths, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    /// Login endpoint.
    pub login: String,
    /// Token-exchange endpoint.
    pub refresh: String,
    /// Profile endpoint; `{id}` is replaced by the user id.
    pub profile: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            refresh: "/auth/refresh".to_string(),
            profile: "/users/{id}".to_string(),
        }
    }
}

/// HTTP implementation of the auth API ports.
pub struct HttpAuthApi {
    http_client: Client,
    base_url: Url,
    endpoints: AuthEndpoints,
    timeout: Duration,
}

impl HttpAuthApi {
    /// Creates a client for the API at `base_url`. Redirects are never
    /// followed.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        endpoints: AuthEndpoints,
        timeout: Duration,
    ) -> Result<Self, HttpClientError> {
        let http_client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HttpClientError::Other(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: with_trailing_slash(base_url),
            endpoints,
            timeout,
        })
    }

    fn url(&self, path: &str) -> Result<Url, AuthApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AuthApiError::Network(format!("invalid endpoint {path}: {e}")))
    }

    async fn post_for_tokens<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<TokenPair, AuthApiError> {
        let response = self
            .http_client
            .post(self.url(path)?)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthApiError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthApiError::Network(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(rejected(status, &text));
        }

        let token_response: TokenResponse = serde_json::from_str(&text).map_err(|e| {
            AuthApiError::MalformedResponse(format!("failed to parse token response: {e}"))
        })?;

        match token_response.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(TokenPair::new(
                access_token,
                token_response.refresh_token.filter(|t| !t.is_empty()),
            )),
            _ => Err(AuthApiError::MalformedResponse(
                "response has no access token".to_string(),
            )),
        }
    }
}

fn rejected(status: StatusCode, body: &str) -> AuthApiError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.message.or(e.error))
        .unwrap_or_else(|| body.to_string());
    AuthApiError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl TokenExchange for HttpAuthApi {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, AuthApiError> {
        debug!(refresh_token = %token_preview(refresh_token), "calling token exchange");
        self.post_for_tokens(&self.endpoints.refresh, &RefreshRequest { refresh_token })
            .await
    }
}

#[async_trait]
impl LoginGateway for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthApiError> {
        debug!(email, "calling login");
        self.post_for_tokens(&self.endpoints.login, &LoginRequest { email, password })
            .await
    }
}

#[async_trait]
impl ProfileLookup for HttpAuthApi {
    async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<UserProfile, AuthApiError> {
        let path = self.endpoints.profile.replace(USER_ID_PLACEHOLDER, user_id);
        let response = self
            .http_client
            .get(self.url(&path)?)
            .timeout(self.timeout)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(rejected(status, &text));
        }

        response
            .json()
            .await
            .map_err(|e| AuthApiError::MalformedResponse(format!("failed to parse profile: {e}")))
    }
}
