//! Authenticated HTTP client implementation using reqwest.
//!
//! Attaches the current bearer token to every outgoing request. When a
//! response comes back `401 Unauthorized`, the registered handler is
//! started in the background and the response is returned to the caller
//! unchanged; the adapter never retries the request itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode, Url};
use seletivo_application::ports::{AuthTokenSink, UnauthorizedHandler};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::serialization::{SerializationError, from_json_bytes};

/// Errors raised by the HTTP client adapter.
#[derive(Debug, Clone, Error)]
pub enum HttpClientError {
    /// The request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The request did not finish in time.
    #[error("Request timed out after {timeout_ms} ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The server could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Response returned by the adapter for every status code.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
    /// Time from send to full body.
    pub duration: Duration,
}

impl ApiResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true for `401 Unauthorized`.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED.as_u16()
    }

    /// Body as lossy UTF-8 text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not JSON of the expected shape.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        from_json_bytes(&self.body)
    }
}

/// HTTP client for the back-office REST API.
pub struct ReqwestApiClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
    bearer: RwLock<Option<String>>,
    on_unauthorized: RwLock<Option<Arc<dyn UnauthorizedHandler>>>,
}

impl ReqwestApiClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .user_agent(concat!("seletivo/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| HttpClientError::Other(e.to_string()))?;

        Ok(Self::with_client(client, base_url, timeout))
    }

    /// Creates a client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            client,
            base_url: with_trailing_slash(base_url),
            timeout,
            bearer: RwLock::new(None),
            on_unauthorized: RwLock::new(None),
        }
    }

    /// Registers the handler invoked on `401` responses, replacing any
    /// previous one.
    pub fn set_on_unauthorized(&self, handler: Arc<dyn UnauthorizedHandler>) {
        *self.on_unauthorized.write() = Some(handler);
    }

    /// Bearer token currently attached to requests.
    #[must_use]
    pub fn auth_token(&self) -> Option<String> {
        self.bearer.read().clone()
    }

    /// Sends a GET request to `path`, relative to the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures; HTTP error statuses
    /// are returned as responses.
    pub async fn get(&self, path: &str) -> Result<ApiResponse, HttpClientError> {
        self.send(Method::GET, path, None).await
    }

    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiResponse, HttpClientError> {
        self.send(Method::POST, path, Some(body)).await
    }

    /// Sends a request to `path`, relative to the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, HttpClientError> {
        let url = self.resolve(path)?;
        let mut builder = self.client.request(method, url).timeout(self.timeout);

        let bearer = self.auth_token();
        if let Some(token) = &bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| self.map_error(&e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.notify_unauthorized(path, bearer);
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpClientError::Other(format!("Failed to read body: {e}")))?
            .to_vec();

        Ok(ApiResponse {
            status: status.as_u16(),
            headers,
            body,
            duration: start.elapsed(),
        })
    }

    fn notify_unauthorized(&self, path: &str, rejected_token: Option<String>) {
        let handler = self.on_unauthorized.read().clone();
        match handler {
            Some(handler) => {
                debug!(path, "unauthorized response, starting session recovery");
                tokio::spawn(async move {
                    handler.on_unauthorized(rejected_token.as_deref()).await;
                });
            }
            None => debug!(path, "unauthorized response, no handler registered"),
        }
    }

    fn resolve(&self, path: &str) -> Result<Url, HttpClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| HttpClientError::InvalidUrl(format!("{e}: {path}")))
    }

    fn map_error(&self, error: &reqwest::Error) -> HttpClientError {
        if error.is_timeout() {
            return HttpClientError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            };
        }
        if error.is_connect() {
            return HttpClientError::ConnectionFailed(error.to_string());
        }
        HttpClientError::Other(error.to_string())
    }
}

impl AuthTokenSink for ReqwestApiClient {
    fn set_auth_token(&self, token: Option<&str>) {
        *self.bearer.write() = token.map(String::from);
    }
}

/// Makes relative joins append to the base path instead of replacing its
/// last segment.
pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
