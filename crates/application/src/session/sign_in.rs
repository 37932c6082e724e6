//! Sign-in use case.
//!
//! Turns the token pair issued by the login endpoint into a session:
//! the identity comes from the access token claims, optionally enriched
//! with profile fields, and is stored together with both tokens.

use std::sync::Arc;

use seletivo_domain::{TokenPair, UserIdentity, token};
use tracing::{info, warn};

use crate::error::ApplicationResult;
use crate::ports::{LoginGateway, ProfileLookup};
use crate::session::store::CredentialStore;

/// Use case for starting and ending sessions.
///
/// # Example
///
/// ```ignore
/// let sign_in = SignIn::new(store, Arc::new(auth_api.clone()))
///     .with_profiles(Arc::new(auth_api));
///
/// let user = sign_in.sign_in("ana@example.com", "secret").await?;
/// ```
pub struct SignIn {
    store: Arc<CredentialStore>,
    login: Arc<dyn LoginGateway>,
    profiles: Option<Arc<dyn ProfileLookup>>,
}

impl SignIn {
    /// Creates the use case without identity enrichment.
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, login: Arc<dyn LoginGateway>) -> Self {
        Self {
            store,
            login,
            profiles: None,
        }
    }

    /// Enables identity enrichment through `profiles`.
    #[must_use]
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileLookup>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Authenticates against the login endpoint and starts a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the login call fails, the issued token lacks
    /// identity claims, or the session cannot be persisted.
    pub async fn sign_in(&self, email: &str, password: &str) -> ApplicationResult<UserIdentity> {
        let tokens = self.login.login(email, password).await?;
        self.establish(tokens).await
    }

    /// Starts a session from an already-issued token pair.
    ///
    /// Enrichment failures are logged and the session starts with the
    /// claims alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the access token cannot be decoded or lacks
    /// identity claims, or if the session cannot be persisted.
    pub async fn establish(&self, tokens: TokenPair) -> ApplicationResult<UserIdentity> {
        let payload = token::decode(&tokens.access_token)?;
        let mut user = UserIdentity::from_payload(&payload)?;

        if let Some(profiles) = &self.profiles {
            match profiles
                .fetch_profile(&tokens.access_token, &user.id)
                .await
            {
                Ok(profile) => user = user.with_profile(profile),
                Err(e) => warn!(error = %e, user = %user.id, "profile enrichment failed"),
            }
        }

        self.store
            .set_credentials(tokens.access_token, tokens.refresh_token, user.clone())
            .await?;
        info!(user = %user.id, tenant = %user.tenant_id, "signed in");
        Ok(user)
    }

    /// Ends the current session.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleared state cannot be persisted.
    pub async fn sign_out(&self) -> ApplicationResult<()> {
        self.store.clear_credentials().await?;
        info!("signed out");
        Ok(())
    }
}
