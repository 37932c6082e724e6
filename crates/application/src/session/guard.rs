//! Route guard service.
//!
//! Wraps the pure guard decision with its side effects: clearing invalid
//! credentials and redirecting to the login route. Evaluation is reactive;
//! the guard never refreshes tokens itself.

use std::future::Future;
use std::sync::Arc;

use seletivo_domain::guard::{self, GuardDecision, GuardPolicy, RejectReason};
use tracing::{debug, warn};

use crate::ports::{Clock, Navigator};
use crate::session::store::CredentialStore;

/// Gatekeeper for protected views.
pub struct RouteGuard {
    store: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    policy: GuardPolicy,
    login_route: String,
}

impl RouteGuard {
    /// Creates a guard redirecting to `login_route`.
    #[must_use]
    pub fn new(
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            store,
            navigator,
            clock,
            policy: GuardPolicy::default(),
            login_route: login_route.into(),
        }
    }

    /// Replaces the guard policy.
    #[must_use]
    pub fn with_policy(mut self, policy: GuardPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Route the guard redirects to.
    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Decides without side effects.
    pub async fn decide(&self) -> GuardDecision {
        self.check().await.decision
    }

    /// Decides and applies the decision: on rejection, clears credentials
    /// where required and redirects to the login route.
    ///
    /// A session replaced while the decision was being made is decided
    /// again rather than cleared.
    pub async fn evaluate(&self) -> GuardDecision {
        loop {
            let check = self.check().await;
            if self.apply(&check, true).await {
                return check.decision;
            }
        }
    }

    /// Re-evaluates on every access token change until `shutdown` resolves.
    ///
    /// `on_decision` receives every decision, starting with the current
    /// one. Rejected tokens are always cleared. Navigation is skipped only
    /// for a `NoToken` decision following a redirect, such as the
    /// evaluation triggered by the guard's own clear.
    pub async fn watch<F, S>(&self, mut on_decision: F, shutdown: S)
    where
        F: FnMut(&GuardDecision) + Send,
        S: Future<Output = ()> + Send,
    {
        let mut changes = self.store.subscribe();
        tokio::pin!(shutdown);

        let mut last = self.evaluate().await;
        on_decision(&last);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let decision = loop {
                let check = self.check().await;
                let repeat = !last.is_render()
                    && check.decision.reject_reason() == Some(&RejectReason::NoToken);
                if repeat {
                    debug!("still no session, redirect already issued");
                }
                if self.apply(&check, !repeat).await {
                    break check.decision;
                }
            };
            on_decision(&decision);
            last = decision;
        }
    }

    async fn check(&self) -> Check {
        let (epoch, access_token) = self.store.versioned_access_token().await;
        let decision = guard::evaluate(access_token.as_deref(), &self.policy, self.clock.now());
        Check {
            epoch,
            access_token,
            decision,
        }
    }

    /// Returns `false` when the session changed since `check` was taken;
    /// nothing is cleared or redirected then.
    async fn apply(&self, check: &Check, navigate: bool) -> bool {
        let GuardDecision::Redirect { reason } = &check.decision else {
            return true;
        };

        if reason.clears_credentials() {
            match self
                .store
                .clear_rejected_token(check.epoch, check.access_token.as_deref())
                .await
            {
                Ok(true) => warn!(reason = reason.label(), "rejected session cleared"),
                Ok(false) => return false,
                Err(e) => warn!(
                    reason = reason.label(),
                    error = %e,
                    "rejected session cleared but could not be persisted"
                ),
            }
        } else if self.store.epoch().await != check.epoch {
            debug!("session started during evaluation");
            return false;
        } else {
            debug!("no session, redirecting to login");
        }

        if navigate {
            self.navigator.redirect(&self.login_route);
        }
        true
    }
}

struct Check {
    epoch: u64,
    access_token: Option<String>,
    decision: GuardDecision,
}
