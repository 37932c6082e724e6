//! Session refresh coordinator.
//!
//! Registered as the HTTP client's unauthorized handler. Exchanges the
//! refresh token for a new access token, or ends the session when that is
//! not possible. Failures are never surfaced to the caller: they show up
//! as the session going anonymous, which the route guard then acts on.

use std::sync::Arc;

use async_trait::async_trait;
use seletivo_domain::token_preview;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::ports::{TokenExchange, UnauthorizedHandler};
use crate::session::store::CredentialStore;

/// Why a refresh attempt ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// No refresh token was held; no network call was made.
    NoRefreshToken,
    /// The token-exchange call failed.
    ExchangeFailed,
}

/// Result of one refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token was stored.
    Refreshed,
    /// Another attempt already rotated or cleared the session this
    /// invocation was triggered for.
    AlreadyHandled,
    /// The session changed while the exchange was in flight; the result
    /// was discarded.
    Superseded,
    /// The session was cleared.
    Cleared(ClearReason),
}

/// Refreshes the session on authorization failures.
///
/// Concurrent invocations are serialized: the first one performs the
/// exchange and the rest observe its result, so a burst of 401 responses
/// costs a single token-exchange call.
pub struct SessionRefreshCoordinator {
    store: Arc<CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    in_flight: Mutex<()>,
}

impl SessionRefreshCoordinator {
    /// Creates a coordinator over `store` using `exchange` for the network call.
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            store,
            exchange,
            in_flight: Mutex::new(()),
        }
    }

    /// Attempts to refresh the current session.
    pub async fn refresh(&self) -> RefreshOutcome {
        let current = self.store.access_token().await;
        self.refresh_rejected(current.as_deref()).await
    }

    /// Attempts to refresh after `rejected_token` was refused by the API.
    ///
    /// Does nothing when the store no longer holds that token: another
    /// attempt already rotated it, or the session ended meanwhile.
    pub async fn refresh_rejected(&self, rejected_token: Option<&str>) -> RefreshOutcome {
        let _in_flight = self.in_flight.lock().await;

        let (epoch, current) = self.store.versioned_access_token().await;
        if current.as_deref() != rejected_token {
            debug!("session changed since the rejected request, nothing to do");
            return RefreshOutcome::AlreadyHandled;
        }

        let Some(refresh_token) = self.store.refresh_token().await else {
            info!("no refresh token held, ending session");
            self.clear(epoch).await;
            return RefreshOutcome::Cleared(ClearReason::NoRefreshToken);
        };

        debug!(refresh_token = %token_preview(&refresh_token), "exchanging refresh token");
        match self.exchange.exchange(&refresh_token).await {
            Ok(tokens) => match self.store.apply_refresh(epoch, tokens).await {
                Ok(true) => RefreshOutcome::Refreshed,
                Ok(false) => RefreshOutcome::Superseded,
                // The token is live in memory; only the write failed.
                Err(e) => {
                    warn!(error = %e, "refreshed token could not be persisted");
                    RefreshOutcome::Refreshed
                }
            },
            Err(e) => {
                warn!(error = %e, "token exchange failed, ending session");
                if self.clear(epoch).await {
                    RefreshOutcome::Cleared(ClearReason::ExchangeFailed)
                } else {
                    RefreshOutcome::Superseded
                }
            }
        }
    }

    async fn clear(&self, epoch: u64) -> bool {
        match self.store.clear_credentials_if(epoch).await {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!(error = %e, "cleared session could not be persisted");
                true
            }
        }
    }
}

#[async_trait]
impl UnauthorizedHandler for SessionRefreshCoordinator {
    async fn on_unauthorized(&self, rejected_token: Option<&str>) {
        let outcome = self.refresh_rejected(rejected_token).await;
        debug!(?outcome, "unauthorized response handled");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ports::{AuthApiError, AuthTokenSink, InMemorySessionStorage};
    use parking_lot::Mutex as SyncMutex;
    use pretty_assertions::assert_eq;
    use seletivo_domain::{Credentials, TokenPair, UserIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct NullSink;

    impl AuthTokenSink for NullSink {
        fn set_auth_token(&self, _token: Option<&str>) {}
    }

    /// Exchange double that answers from a queue and counts calls.
    struct ScriptedExchange {
        responses: SyncMutex<Vec<Result<TokenPair, AuthApiError>>>,
        calls: AtomicUsize,
        delay: Duration,
        seen: SyncMutex<Vec<String>>,
    }

    impl ScriptedExchange {
        fn new(responses: Vec<Result<TokenPair, AuthApiError>>) -> Self {
            Self {
                responses: SyncMutex::new(responses),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                seen: SyncMutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchange for ScriptedExchange {
        async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, AuthApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(refresh_token.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Err(AuthApiError::Network("exhausted".to_string())))
        }
    }

    /// Exchange that blocks until released, to interleave a logout.
    struct GatedExchange {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TokenExchange for GatedExchange {
        async fn exchange(&self, _refresh_token: &str) -> Result<TokenPair, AuthApiError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(TokenPair::new("late", None))
        }
    }

    fn user() -> UserIdentity {
        UserIdentity::new("42", ["ADMIN"], "t1")
    }

    async fn store() -> Arc<CredentialStore> {
        Arc::new(
            CredentialStore::init(Arc::new(InMemorySessionStorage::new()), Arc::new(NullSink)).await,
        )
    }

    #[tokio::test]
    async fn test_refresh_updates_access_token() {
        let store = store().await;
        store.set_credentials("old", Some("r1".to_string()), user()).await.unwrap();
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(TokenPair::new("new", None))]));
        let coordinator = SessionRefreshCoordinator::new(store.clone(), exchange.clone());

        assert_eq!(coordinator.refresh().await, RefreshOutcome::Refreshed);
        assert_eq!(
            store.snapshot().await,
            Credentials::authenticated("new", Some("r1".to_string()), user())
        );
        assert_eq!(*exchange.seen.lock(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_clears_without_network_call() {
        let store = store().await;
        store.set_credentials("old", None, user()).await.unwrap();
        let exchange = Arc::new(ScriptedExchange::new(vec![]));
        let coordinator = SessionRefreshCoordinator::new(store.clone(), exchange.clone());

        assert_eq!(
            coordinator.refresh().await,
            RefreshOutcome::Cleared(ClearReason::NoRefreshToken)
        );
        assert_eq!(store.snapshot().await, Credentials::anonymous());
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_failure_clears_session() {
        for error in [
            AuthApiError::Network("connection reset".to_string()),
            AuthApiError::Rejected {
                status: 401,
                message: "expired".to_string(),
            },
            AuthApiError::MalformedResponse("missing accessToken".to_string()),
        ] {
            let store = store().await;
            store.set_credentials("old", Some("r1".to_string()), user()).await.unwrap();
            let exchange = Arc::new(ScriptedExchange::new(vec![Err(error)]));
            let coordinator = SessionRefreshCoordinator::new(store.clone(), exchange);

            assert_eq!(
                coordinator.refresh().await,
                RefreshOutcome::Cleared(ClearReason::ExchangeFailed)
            );
            assert_eq!(store.snapshot().await, Credentials::anonymous());
        }
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_calls_refresh_once() {
        let store = store().await;
        store.set_credentials("old", Some("r1".to_string()), user()).await.unwrap();
        let exchange = Arc::new(
            ScriptedExchange::new(vec![Ok(TokenPair::new("new", None))])
                .with_delay(Duration::from_millis(20)),
        );
        let coordinator = Arc::new(SessionRefreshCoordinator::new(store.clone(), exchange.clone()));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh().await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(exchange.calls(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == RefreshOutcome::Refreshed)
                .count(),
            1
        );
        assert!(
            outcomes
                .iter()
                .all(|o| matches!(o, RefreshOutcome::Refreshed | RefreshOutcome::AlreadyHandled))
        );
        assert_eq!(store.access_token().await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_logout_during_refresh_is_not_overwritten() {
        let store = store().await;
        store.set_credentials("old", Some("r1".to_string()), user()).await.unwrap();
        let exchange = Arc::new(GatedExchange {
            started: Notify::new(),
            release: Notify::new(),
        });
        let coordinator = Arc::new(SessionRefreshCoordinator::new(store.clone(), exchange.clone()));

        let refresh = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });

        exchange.started.notified().await;
        store.clear_credentials().await.unwrap();
        exchange.release.notify_one();

        assert_eq!(refresh.await.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(store.snapshot().await, Credentials::anonymous());
    }

    #[tokio::test]
    async fn test_on_unauthorized_runs_refresh() {
        let store = store().await;
        store.set_credentials("old", Some("r1".to_string()), user()).await.unwrap();
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(TokenPair::new(
            "new",
            Some("r2".to_string()),
        ))]));
        let handler: Arc<dyn UnauthorizedHandler> =
            Arc::new(SessionRefreshCoordinator::new(store.clone(), exchange));

        handler.on_unauthorized(Some("old")).await;

        assert_eq!(store.access_token().await.as_deref(), Some("new"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_late_unauthorized_for_rotated_token_is_ignored() {
        let store = store().await;
        store.set_credentials("old", Some("r1".to_string()), user()).await.unwrap();
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(TokenPair::new("new", None))]));
        let coordinator = SessionRefreshCoordinator::new(store.clone(), exchange.clone());

        assert_eq!(
            coordinator.refresh_rejected(Some("old")).await,
            RefreshOutcome::Refreshed
        );
        assert_eq!(
            coordinator.refresh_rejected(Some("old")).await,
            RefreshOutcome::AlreadyHandled
        );
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_after_logout_is_ignored() {
        let store = store().await;
        let exchange = Arc::new(ScriptedExchange::new(vec![]));
        let coordinator = SessionRefreshCoordinator::new(store.clone(), exchange.clone());

        assert_eq!(
            coordinator.refresh_rejected(Some("old")).await,
            RefreshOutcome::AlreadyHandled
        );
        assert_eq!(exchange.calls(), 0);
    }
}
