//! Ports between the credential store, the HTTP client adapter and the
//! refresh coordinator.

use async_trait::async_trait;

/// Receives the bearer token attached to outgoing requests.
///
/// The credential store calls this on every mutation and once at start-up.
pub trait AuthTokenSink: Send + Sync {
    /// Sets the token for all future requests. `None` stops sending one.
    fn set_auth_token(&self, token: Option<&str>);
}

/// Recovery delegate invoked when a request is rejected as unauthorized.
///
/// May be invoked concurrently when several requests fail at once.
#[async_trait]
pub trait UnauthorizedHandler: Send + Sync {
    /// Handles an authorization failure. The failed request is not retried.
    ///
    /// `rejected_token` is the bearer token the failed request carried.
    async fn on_unauthorized(&self, rejected_token: Option<&str>);
}
