//! Credential store.
//!
//! Single owner of the session state. Every mutation is applied under one
//! write lock, pushed to the HTTP token sink, published to subscribers and
//! persisted before the lock is released, so readers never see a partial
//! credential state and persisted writes land in mutation order.
//!
//! A monotonic epoch is bumped whenever a session starts or ends. Refresh
//! results carry the epoch they were started under and are discarded if
//! it changed, so a late refresh can never resurrect a cleared session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use seletivo_domain::{
    Credentials, SessionState, SessionStatus, TokenPair, UserIdentity, token_preview,
};
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::ports::{AuthTokenSink, SessionStorage, StorageError};

/// Errors raised by credential store mutations.
///
/// The in-memory state is already updated when persistence fails.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The new state could not be written to durable storage.
    #[error("failed to persist session: {0}")]
    Persistence(#[from] StorageError),
}

#[derive(Debug, Default)]
struct StoreState {
    credentials: Credentials,
    epoch: u64,
}

/// Injectable owner of the current session credentials.
pub struct CredentialStore {
    state: RwLock<StoreState>,
    storage: Arc<dyn SessionStorage>,
    sink: Arc<dyn AuthTokenSink>,
    changes: watch::Sender<Option<String>>,
}

impl CredentialStore {
    /// Rehydrates the store from durable storage.
    ///
    /// The token sink receives the persisted access token before this
    /// returns. Unreadable or inconsistent persisted state starts the
    /// session anonymous.
    pub async fn init(storage: Arc<dyn SessionStorage>, sink: Arc<dyn AuthTokenSink>) -> Self {
        let credentials = match storage.load().await {
            Ok(Some(credentials)) if credentials.is_consistent() => credentials,
            Ok(Some(_)) => {
                warn!("persisted session has a token without a user, starting anonymous");
                Credentials::anonymous()
            }
            Ok(None) => Credentials::anonymous(),
            Err(e) => {
                warn!(error = %e, "failed to load persisted session, starting anonymous");
                Credentials::anonymous()
            }
        };

        debug!(state = ?credentials.state(), "credential store initialized");
        sink.set_auth_token(credentials.access_token.as_deref());
        let (changes, _) = watch::channel(credentials.access_token.clone());

        Self {
            state: RwLock::new(StoreState {
                credentials,
                epoch: 0,
            }),
            storage,
            sink,
            changes,
        }
    }

    /// Starts a session: sets all three fields at once.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the new state cannot be saved.
    pub async fn set_credentials(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        user: UserIdentity,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.credentials = Credentials::authenticated(access_token, refresh_token, user);
        state.epoch += 1;
        info!(
            epoch = state.epoch,
            user = state.credentials.user.as_ref().map(|u| u.id.as_str()),
            "session started"
        );
        self.commit(&state).await
    }

    /// Ends the session: clears all three fields at once. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the new state cannot be saved.
    pub async fn clear_credentials(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        Self::clear_locked(&mut state);
        self.commit(&state).await
    }

    /// Clears the session only if it is still the one from `epoch`.
    ///
    /// # Returns
    /// Whether the session was cleared.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the new state cannot be saved.
    pub async fn clear_credentials_if(&self, epoch: u64) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            debug!(expected = epoch, current = state.epoch, "skipping stale clear");
            return Ok(false);
        }
        Self::clear_locked(&mut state);
        self.commit(&state).await?;
        Ok(true)
    }

    /// Clears the session only if it is still the one from `epoch` and
    /// still holds `access_token`. A refresh rotating the token in between
    /// keeps the session.
    ///
    /// # Returns
    /// Whether the session was cleared.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the new state cannot be saved.
    pub async fn clear_rejected_token(
        &self,
        epoch: u64,
        access_token: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.epoch != epoch || state.credentials.access_token.as_deref() != access_token {
            debug!(expected = epoch, current = state.epoch, "token changed, keeping session");
            return Ok(false);
        }
        Self::clear_locked(&mut state);
        self.commit(&state).await?;
        Ok(true)
    }

    /// Replaces only the access token, leaving the refresh token and user
    /// untouched.
    ///
    /// An anonymous store has no session to refresh; the call is ignored.
    ///
    /// # Returns
    /// Whether the token was replaced.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the new state cannot be saved.
    pub async fn set_access_token(&self, access_token: impl Into<String>) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.credentials.state() == SessionState::Anonymous {
            warn!("ignoring access token update on an anonymous session");
            return Ok(false);
        }
        let access_token = access_token.into();
        debug!(token = %token_preview(&access_token), "access token replaced");
        state.credentials.access_token = Some(access_token);
        self.commit(&state).await?;
        Ok(true)
    }

    /// Applies a refresh result obtained under `epoch`.
    ///
    /// The refresh token is replaced only when the exchange rotated it.
    /// Results from an older epoch, or arriving after the session ended,
    /// are discarded.
    ///
    /// # Returns
    /// Whether the tokens were applied.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the new state cannot be saved.
    pub async fn apply_refresh(&self, epoch: u64, tokens: TokenPair) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.epoch != epoch || state.credentials.state() == SessionState::Anonymous {
            debug!(expected = epoch, current = state.epoch, "discarding stale refresh result");
            return Ok(false);
        }
        state.credentials.access_token = Some(tokens.access_token);
        if let Some(refresh_token) = tokens.refresh_token {
            state.credentials.refresh_token = Some(refresh_token);
        }
        info!(epoch, "access token refreshed");
        self.commit(&state).await?;
        Ok(true)
    }

    /// Copy of the current credentials.
    pub async fn snapshot(&self) -> Credentials {
        self.state.read().await.credentials.clone()
    }

    /// Current epoch together with the current access token, read atomically.
    pub async fn versioned_access_token(&self) -> (u64, Option<String>) {
        let state = self.state.read().await;
        (state.epoch, state.credentials.access_token.clone())
    }

    /// Current access token.
    pub async fn access_token(&self) -> Option<String> {
        self.state.read().await.credentials.access_token.clone()
    }

    /// Current refresh token.
    pub async fn refresh_token(&self) -> Option<String> {
        self.state.read().await.credentials.refresh_token.clone()
    }

    /// Signed-in user.
    pub async fn user(&self) -> Option<UserIdentity> {
        self.state.read().await.credentials.user.clone()
    }

    /// Current session state.
    pub async fn session_state(&self) -> SessionState {
        self.state.read().await.credentials.state()
    }

    /// Current session epoch.
    pub async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    /// Session summary at `now`.
    pub async fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        SessionStatus::from_credentials(&self.state.read().await.credentials, now)
    }

    /// Subscribes to access token changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.changes.subscribe()
    }

    fn clear_locked(state: &mut StoreState) {
        state.credentials = Credentials::anonymous();
        state.epoch += 1;
        info!(epoch = state.epoch, "session cleared");
    }

    async fn commit(&self, state: &StoreState) -> Result<(), StoreError> {
        let access_token = state.credentials.access_token.as_deref();
        self.sink.set_auth_token(access_token);
        self.changes.send_if_modified(|current| {
            if current.as_deref() == access_token {
                false
            } else {
                *current = access_token.map(String::from);
                true
            }
        });

        self.storage.save(&state.credentials).await.map_err(|e| {
            warn!(error = %e, "failed to persist session");
            StoreError::from(e)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ports::InMemorySessionStorage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingSink {
        tokens: Mutex<Vec<Option<String>>>,
    }

    impl RecordingSink {
        fn last(&self) -> Option<Option<String>> {
            self.tokens.lock().last().cloned()
        }
    }

    impl AuthTokenSink for RecordingSink {
        fn set_auth_token(&self, token: Option<&str>) {
            self.tokens.lock().push(token.map(String::from));
        }
    }

    struct FailingStorage;

    #[async_trait]
    impl SessionStorage for FailingStorage {
        async fn load(&self) -> Result<Option<Credentials>, StorageError> {
            Err(StorageError::Crypto("bad key".to_string()))
        }

        async fn save(&self, _credentials: &Credentials) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }
    }

    fn user() -> UserIdentity {
        UserIdentity::new("42", ["ADMIN"], "t1")
    }

    async fn store_with(
        storage: Arc<InMemorySessionStorage>,
    ) -> (CredentialStore, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let store = CredentialStore::init(storage, sink.clone()).await;
        (store, sink)
    }

    #[tokio::test]
    async fn test_starts_anonymous_without_persisted_state() {
        let (store, sink) = store_with(Arc::new(InMemorySessionStorage::new())).await;
        assert_eq!(store.session_state().await, SessionState::Anonymous);
        assert_eq!(sink.last(), Some(None));
    }

    #[tokio::test]
    async fn test_set_credentials_round_trip() {
        let storage = Arc::new(InMemorySessionStorage::new());
        let (store, sink) = store_with(storage.clone()).await;

        store
            .set_credentials("access-a", Some("refresh-r".to_string()), user())
            .await
            .unwrap();

        let expected = Credentials::authenticated("access-a", Some("refresh-r".to_string()), user());
        assert_eq!(store.snapshot().await, expected);
        assert_eq!(storage.current(), Some(expected));
        assert_eq!(sink.last(), Some(Some("access-a".to_string())));
        assert_eq!(store.session_state().await, SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_clear_credentials_is_idempotent() {
        let storage = Arc::new(InMemorySessionStorage::new());
        let (store, sink) = store_with(storage.clone()).await;
        store.set_credentials("a", Some("r".to_string()), user()).await.unwrap();

        store.clear_credentials().await.unwrap();
        let first = store.snapshot().await;
        store.clear_credentials().await.unwrap();

        assert_eq!(first, Credentials::anonymous());
        assert_eq!(store.snapshot().await, Credentials::anonymous());
        assert_eq!(storage.current(), Some(Credentials::anonymous()));
        assert_eq!(sink.last(), Some(None));
    }

    #[tokio::test]
    async fn test_set_access_token_keeps_refresh_token_and_user() {
        let (store, sink) = store_with(Arc::new(InMemorySessionStorage::new())).await;
        store.set_credentials("a1", Some("r".to_string()), user()).await.unwrap();
        let epoch = store.epoch().await;

        assert!(store.set_access_token("a2").await.unwrap());

        assert_eq!(
            store.snapshot().await,
            Credentials::authenticated("a2", Some("r".to_string()), user())
        );
        assert_eq!(store.epoch().await, epoch);
        assert_eq!(sink.last(), Some(Some("a2".to_string())));
    }

    #[tokio::test]
    async fn test_set_access_token_ignored_when_anonymous() {
        let storage = Arc::new(InMemorySessionStorage::new());
        let (store, _) = store_with(storage.clone()).await;

        assert!(!store.set_access_token("a2").await.unwrap());
        assert_eq!(store.snapshot().await, Credentials::anonymous());
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_init_rehydrates_sink_from_storage() {
        let persisted = Credentials::authenticated("saved", None, user());
        let storage = Arc::new(InMemorySessionStorage::with_credentials(persisted.clone()));
        let (store, sink) = store_with(storage).await;

        assert_eq!(store.snapshot().await, persisted);
        assert_eq!(sink.last(), Some(Some("saved".to_string())));
    }

    #[tokio::test]
    async fn test_init_drops_inconsistent_state() {
        let torn = Credentials {
            access_token: Some("orphan".to_string()),
            ..Credentials::default()
        };
        let storage = Arc::new(InMemorySessionStorage::with_credentials(torn));
        let (store, sink) = store_with(storage).await;

        assert_eq!(store.snapshot().await, Credentials::anonymous());
        assert_eq!(sink.last(), Some(None));
    }

    #[tokio::test]
    async fn test_unreadable_storage_starts_anonymous_and_reports_save_errors() {
        let sink = Arc::new(RecordingSink::default());
        let store = CredentialStore::init(Arc::new(FailingStorage), sink.clone()).await;
        assert_eq!(store.session_state().await, SessionState::Anonymous);

        let result = store.set_credentials("a", None, user()).await;
        assert!(matches!(result, Err(StoreError::Persistence(_))));
        // In-memory state and sink are updated regardless.
        assert_eq!(store.access_token().await.as_deref(), Some("a"));
        assert_eq!(sink.last(), Some(Some("a".to_string())));
    }

    #[tokio::test]
    async fn test_stale_refresh_is_discarded_after_clear() {
        let (store, _) = store_with(Arc::new(InMemorySessionStorage::new())).await;
        store.set_credentials("a1", Some("r1".to_string()), user()).await.unwrap();
        let epoch = store.epoch().await;

        store.clear_credentials().await.unwrap();
        let applied = store
            .apply_refresh(epoch, TokenPair::new("a2", Some("r2".to_string())))
            .await
            .unwrap();

        assert!(!applied);
        assert_eq!(store.snapshot().await, Credentials::anonymous());
    }

    #[tokio::test]
    async fn test_stale_refresh_is_discarded_after_new_sign_in() {
        let (store, _) = store_with(Arc::new(InMemorySessionStorage::new())).await;
        store.set_credentials("a1", Some("r1".to_string()), user()).await.unwrap();
        let epoch = store.epoch().await;
        store.set_credentials("b1", Some("s1".to_string()), user()).await.unwrap();

        assert!(!store.apply_refresh(epoch, TokenPair::new("a2", None)).await.unwrap());
        assert!(!store.clear_credentials_if(epoch).await.unwrap());
        assert_eq!(store.access_token().await.as_deref(), Some("b1"));
    }

    #[tokio::test]
    async fn test_clear_rejected_token_keeps_rotated_session() {
        let (store, _) = store_with(Arc::new(InMemorySessionStorage::new())).await;
        store.set_credentials("a1", Some("r1".to_string()), user()).await.unwrap();
        let epoch = store.epoch().await;
        assert!(store.set_access_token("a2").await.unwrap());

        assert!(!store.clear_rejected_token(epoch, Some("a1")).await.unwrap());
        assert_eq!(store.access_token().await.as_deref(), Some("a2"));

        assert!(store.clear_rejected_token(epoch, Some("a2")).await.unwrap());
        assert_eq!(store.snapshot().await, Credentials::anonymous());
    }

    #[tokio::test]
    async fn test_apply_refresh_rotates_refresh_token_when_issued() {
        let (store, _) = store_with(Arc::new(InMemorySessionStorage::new())).await;
        store.set_credentials("a1", Some("r1".to_string()), user()).await.unwrap();
        let epoch = store.epoch().await;

        assert!(store.apply_refresh(epoch, TokenPair::new("a2", None)).await.unwrap());
        assert_eq!(store.refresh_token().await.as_deref(), Some("r1"));

        assert!(
            store
                .apply_refresh(epoch, TokenPair::new("a3", Some("r3".to_string())))
                .await
                .unwrap()
        );
        assert_eq!(store.access_token().await.as_deref(), Some("a3"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("r3"));
    }

    #[tokio::test]
    async fn test_subscribers_see_token_changes_only() {
        let (store, _) = store_with(Arc::new(InMemorySessionStorage::new())).await;
        let mut changes = store.subscribe();

        store.set_credentials("a1", None, user()).await.unwrap();
        assert!(changes.has_changed().unwrap());
        assert_eq!(changes.borrow_and_update().as_deref(), Some("a1"));

        store.clear_credentials().await.unwrap();
        assert_eq!(changes.borrow_and_update().as_deref(), None);

        store.clear_credentials().await.unwrap();
        assert!(!changes.has_changed().unwrap());
    }
}
