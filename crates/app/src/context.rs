//! Session wiring shared by all commands.

use std::sync::Arc;

use anyhow::Context;
use seletivo_application::ports::{Clock, SessionStorage};
use seletivo_application::{
    CredentialStore, RefreshOutcome, RouteGuard, SessionRefreshCoordinator, SignIn,
};
use seletivo_domain::{GuardDecision, RejectReason, SessionStatus, UserIdentity};
use seletivo_infrastructure::{
    ApiResponse, EncryptedFileSessionStorage, HttpAuthApi, ReqwestApiClient, SessionCipher,
    SessionSettings, SystemClock, TokioFileSystem,
};
use tracing::{debug, info};

use crate::navigator::CliNavigator;

/// Result of an authenticated GET.
#[derive(Debug)]
pub enum GetOutcome {
    /// The route guard refused the session; no request was sent.
    Denied {
        /// Why the session was refused.
        reason: RejectReason,
        /// Where the user is sent to sign in again.
        login_route: String,
    },
    /// The API answered, possibly after one retry with a refreshed token.
    Response(ApiResponse),
}

/// The session core wired to HTTP, encrypted storage and the system clock.
pub struct SessionContext {
    settings: SessionSettings,
    client: Arc<ReqwestApiClient>,
    store: Arc<CredentialStore>,
    coordinator: Arc<SessionRefreshCoordinator>,
    guard: RouteGuard,
    sign_in: SignIn,
    navigator: Arc<CliNavigator>,
    clock: Arc<SystemClock>,
}

impl SessionContext {
    /// Builds the context and restores the persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage secret or path is missing or the
    /// HTTP client cannot be created.
    pub async fn open(settings: SessionSettings) -> anyhow::Result<Self> {
        let cipher = SessionCipher::from_secret(settings.storage_secret()?)?;
        let storage_path = settings.storage_path()?;
        debug!(path = %storage_path.display(), "using session file");
        let storage: Arc<dyn SessionStorage> = Arc::new(EncryptedFileSessionStorage::new(
            TokioFileSystem::new(),
            storage_path,
            cipher,
        ));

        let timeout = settings.request_timeout();
        let client = Arc::new(
            ReqwestApiClient::new(settings.api_base_url.clone(), timeout)
                .context("failed to create HTTP client")?,
        );
        let store = Arc::new(CredentialStore::init(storage, client.clone()).await);

        let auth_api = Arc::new(
            HttpAuthApi::new(
                settings.api_base_url.clone(),
                settings.auth_endpoints(),
                timeout,
            )
            .context("failed to create auth client")?,
        );
        let coordinator = Arc::new(SessionRefreshCoordinator::new(
            store.clone(),
            auth_api.clone(),
        ));
        client.set_on_unauthorized(coordinator.clone());

        let navigator = Arc::new(CliNavigator::new());
        let clock = Arc::new(SystemClock::new());
        let guard = RouteGuard::new(
            store.clone(),
            navigator.clone(),
            clock.clone(),
            settings.login_route.clone(),
        )
        .with_policy(settings.guard_policy());
        let sign_in = SignIn::new(store.clone(), auth_api.clone()).with_profiles(auth_api);

        Ok(Self {
            settings,
            client,
            store,
            coordinator,
            guard,
            sign_in,
            navigator,
            clock,
        })
    }

    /// Signs in with e-mail and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the API refuses the credentials or the session
    /// cannot be stored.
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<UserIdentity> {
        Ok(self.sign_in.sign_in(email, password).await?)
    }

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleared state cannot be persisted.
    pub async fn logout(&self) -> anyhow::Result<()> {
        Ok(self.sign_in.sign_out().await?)
    }

    /// Current session as seen by the guard, without side effects.
    pub async fn status(&self) -> (GuardDecision, SessionStatus) {
        let decision = self.guard.decide().await;
        (decision, self.store.status(self.clock.now()).await)
    }

    /// Exchanges the refresh token now.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.coordinator.refresh().await
    }

    /// Sends an authenticated GET to `path`.
    ///
    /// The route guard runs first. When the API answers `401`, waits for
    /// the background refresh to settle and retries once if the session
    /// survived it.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures.
    pub async fn get(&self, path: &str) -> anyhow::Result<GetOutcome> {
        if let GuardDecision::Redirect { reason } = self.guard.evaluate().await {
            return Ok(GetOutcome::Denied {
                reason,
                login_route: self
                    .navigator
                    .last_redirect()
                    .unwrap_or_else(|| self.settings.login_route.clone()),
            });
        }

        let mut changes = self.store.subscribe();
        let response = self.client.get(path).await?;
        if !response.is_unauthorized() {
            return Ok(GetOutcome::Response(response));
        }

        let settled = tokio::time::timeout(self.settings.request_timeout(), changes.changed()).await;
        if !matches!(settled, Ok(Ok(()))) || self.store.access_token().await.is_none() {
            info!(path, "session not refreshed after unauthorized response");
            return Ok(GetOutcome::Response(response));
        }

        info!(path, "session refreshed, retrying");
        Ok(GetOutcome::Response(self.client.get(path).await?))
    }

    /// Settings the context was built from.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}
