//! Session lifecycle state machine.
//!
//! ```text
//!            boot                     code param
//! Booting ──────────► PendingCallback ──────────► Authenticated ◄──┐
//!    │                     │                         │   ▲         │
//!    │ stored session      │ error / mismatch /      │   │ ok      │
//!    ├─────────────────────┼──► Error                │ refresh     │
//!    │ none / corrupt      │                         ▼   │         │
//!    └──────────► Unauthenticated ◄──── logout ── Refreshing ──────┘
//!                       ▲                            │ failure
//!                       └──────── logout ◄───────────┘
//! ```
//!
//! Every commit holds the controller's commit guard across
//! "update memory → write store → publish", so observers never see a state
//! whose session is not yet persisted.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use url::Url;

use crate::claims::decode_claims;
use crate::csrf;
use crate::error::Error;
use crate::navigation::Navigation;
use crate::provider::IdentityProvider;
use crate::store::{KeyValueStore, SessionStore, StoreKeys};
use crate::types::{
    FailureReason, LifecycleState, RawTokenResponse, Session, TokenValidation, UserClaims,
};

/// Controller behaviour switches.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ControllerConfig {
    pub(crate) require_state: bool,
    pub(crate) store_keys: StoreKeys,
}

impl ControllerConfig {
    /// Reject callbacks when no `state` was recorded by [`SessionController::login`]
    /// (default: `false`, proceed with a warning).
    ///
    /// A recorded state is always enforced.
    #[must_use]
    pub fn with_require_state(mut self, require: bool) -> Self {
        self.require_state = require;
        self
    }

    #[must_use]
    pub fn with_store_keys(mut self, keys: StoreKeys) -> Self {
        self.store_keys = keys;
        self
    }
}

struct Inner {
    session: Option<Session>,
    state: LifecycleState,
    /// Bumped whenever a session is created, replaced or destroyed.
    epoch: u64,
    booted: bool,
}

/// Owns the in-memory session and drives every lifecycle transition.
pub struct SessionController<P, K, N> {
    provider: P,
    store: SessionStore<K>,
    navigation: N,
    config: ControllerConfig,
    inner: Mutex<Inner>,
    commit: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<LifecycleState>,
}

impl<P, K, N> SessionController<P, K, N>
where
    P: IdentityProvider,
    K: KeyValueStore,
    N: Navigation,
{
    #[must_use]
    pub fn new(provider: P, store: K, navigation: N) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Booting);
        Self {
            provider,
            store: SessionStore::new(store),
            navigation,
            config: ControllerConfig::default(),
            inner: Mutex::new(Inner {
                session: None,
                state: LifecycleState::Booting,
                epoch: 0,
                booted: false,
            }),
            commit: tokio::sync::Mutex::new(()),
            state_tx,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.store.set_keys(config.store_keys.clone());
        self.config = config;
        self
    }

    // ── Observation ────────────────────────────────────────────────

    /// Last published lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to lifecycle transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    /// Display claims of the live session. Not an authorization input.
    #[must_use]
    pub fn claims(&self) -> Option<UserClaims> {
        self.lock().session.as_ref().map(|s| s.claims.clone())
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.access_token.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().has_session()
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore<K> {
        &self.store
    }

    #[must_use]
    pub fn navigation(&self) -> &N {
        &self.navigation
    }

    // ── Boot ───────────────────────────────────────────────────────

    /// Resolve the initial state. Always ends in a non-loading state.
    ///
    /// An `error` callback parameter wins over `code`, which wins over a
    /// stored session. Calling again after the first boot returns the
    /// current state without doing anything.
    pub async fn boot(&self) -> LifecycleState {
        let guard = self.commit.lock().await;
        {
            let mut inner = self.lock();
            if inner.booted {
                return inner.state.clone();
            }
            inner.booted = true;
        }

        if let Some(error) = self.navigation.query_param("error") {
            let description = self.navigation.query_param("error_description");
            tracing::warn!(error = %error, description = ?description, "OAuth2 error from provider");
            self.discard_pending_state().await;
            return self.fail(FailureReason::AuthorizationDenied(error));
        }

        if let Some(code) = self.navigation.query_param("code") {
            return self.complete_callback(guard, &code).await;
        }

        self.restore().await
    }

    async fn restore(&self) -> LifecycleState {
        match self.store.load().await {
            Ok(Some(session)) => {
                tracing::debug!(subject = %session.claims.subject, "Restored stored session");
                self.set_session(Some(session), LifecycleState::Authenticated);
                self.publish(LifecycleState::Authenticated)
            }
            Ok(None) => self.publish_unauthenticated(),
            Err(Error::CorruptStoredSession(reason)) => {
                tracing::warn!(reason = %reason, "Discarding corrupt stored session");
                if let Err(e) = self.store.clear().await {
                    tracing::warn!(error = %e, "Failed to clear corrupt session");
                }
                self.publish_unauthenticated()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored session");
                self.publish_unauthenticated()
            }
        }
    }

    /// Drops the commit guard while the exchange is in flight so logout and
    /// login are not held up by the provider.
    async fn complete_callback(
        &self,
        guard: tokio::sync::MutexGuard<'_, ()>,
        code: &str,
    ) -> LifecycleState {
        self.set_session(None, LifecycleState::PendingCallback);
        self.publish(LifecycleState::PendingCallback);

        let returned_state = self.navigation.query_param("state");
        let expected_state = self.store.take_pending_state().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read recorded authorization state");
            None
        });

        match (expected_state, returned_state.as_deref()) {
            (Some(expected), Some(returned)) if expected == returned => {}
            (Some(_), _) => {
                tracing::warn!("OAuth state mismatch");
                return self.fail(FailureReason::StateMismatch);
            }
            (None, _) if self.config.require_state => {
                tracing::warn!("No recorded authorization state, rejecting callback");
                return self.fail(FailureReason::StateMismatch);
            }
            (None, _) => {
                tracing::warn!("No recorded authorization state, skipping CSRF check");
            }
        }

        let epoch = self.lock().epoch;
        drop(guard);

        let result = self
            .provider
            .exchange_code(code, returned_state.as_deref())
            .await;

        let _guard = self.commit.lock().await;
        if self.lock().epoch != epoch {
            tracing::debug!("Discarding stale token exchange response");
            return self.state();
        }

        let tokens = match result {
            Ok(tokens) if tokens.access_token.is_empty() => {
                tracing::error!("Token exchange returned an empty access token");
                return self.fail(FailureReason::ExchangeFailed("empty access token".into()));
            }
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(error = %e, "Token exchange failed");
                return self.fail(FailureReason::ExchangeFailed(e.to_string()));
            }
        };

        let session = assemble_session(tokens);
        self.set_session(Some(session.clone()), LifecycleState::Authenticated);

        if let Err(e) = self.store.save(&session).await {
            tracing::error!(error = %e, "Session persistence failed");
            if let Err(e) = self.store.clear().await {
                tracing::warn!(error = %e, "Failed to clear partial session");
            }
            return self.fail(FailureReason::ExchangeFailed(e.to_string()));
        }

        self.navigation.strip_authorization_params();
        tracing::info!(subject = %session.claims.subject, "OAuth2 login successful");
        self.publish(LifecycleState::Authenticated)
    }

    // ── Login ──────────────────────────────────────────────────────

    /// Start the authorization redirect.
    ///
    /// Records the request's `state` (appending a fresh one if the provider
    /// didn't include it) so the callback can be matched against it, then
    /// redirects the navigation context. Does not change the lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, [`Error::InvalidAuthorizationUrl`], or
    /// [`Error::Store`] if the state could not be recorded.
    pub async fn login(&self) -> Result<Url, Error> {
        let response = self.provider.authorization_url().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get authorization URL");
            e
        })?;

        let mut url: Url = response
            .auth_url
            .parse()
            .map_err(|e| Error::InvalidAuthorizationUrl(format!("{e}")))?;
        let state = csrf::ensure_state(&mut url);

        {
            let _guard = self.commit.lock().await;
            self.store.save_pending_state(&state).await?;
        }

        self.navigation.redirect(&url);
        Ok(url)
    }

    // ── Logout ─────────────────────────────────────────────────────

    /// End the session. Local state and storage are always cleared; the
    /// remote revoke is best-effort and its failure is only logged.
    pub async fn logout(&self) {
        let session = {
            let _guard = self.commit.lock().await;
            self.end_session().await
        };
        self.revoke_remote(session).await;
    }

    /// Caller must hold the commit guard.
    async fn end_session(&self) -> Option<Session> {
        let session = {
            let mut inner = self.lock();
            inner.epoch += 1;
            inner.state = LifecycleState::Unauthenticated;
            inner.session.take()
        };

        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Session deletion failed during logout");
        }
        self.publish(LifecycleState::Unauthenticated);
        tracing::info!("Logged out");
        session
    }

    async fn discard_pending_state(&self) {
        if let Err(e) = self.store.take_pending_state().await {
            tracing::warn!(error = %e, "Failed to clear recorded authorization state");
        }
    }

    async fn revoke_remote(&self, session: Option<Session>) {
        let Some(session) = session else {
            return;
        };
        match self.provider.revoke(Some(&session.access_token)).await {
            Ok(response) => tracing::debug!(reply = %response.message, "Provider logout acknowledged"),
            Err(e) => tracing::warn!(error = %e, "Logout request failed"),
        }
    }

    // ── Refresh ────────────────────────────────────────────────────

    /// Replace the session with freshly issued tokens.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAuthenticated`] / [`Error::RefreshInFlight`] /
    ///   [`Error::MissingRefreshToken`]: rejected up front, nothing changes.
    /// - [`Error::Superseded`]: the session was replaced or logged out while
    ///   the request was in flight; the response was discarded.
    /// - Any provider or store failure: the session is logged out, then the
    ///   original error is returned.
    pub async fn refresh(&self) -> Result<(), Error> {
        let (refresh_token, epoch) = {
            let _guard = self.commit.lock().await;
            let claimed = {
                let mut inner = self.lock();
                match inner.state {
                    LifecycleState::Authenticated => {}
                    LifecycleState::Refreshing => return Err(Error::RefreshInFlight),
                    _ => return Err(Error::NotAuthenticated),
                }
                let refresh_token = inner
                    .session
                    .as_ref()
                    .and_then(|s| s.refresh_token.clone())
                    .ok_or(Error::MissingRefreshToken)?;
                inner.state = LifecycleState::Refreshing;
                (refresh_token, inner.epoch)
            };
            self.publish(LifecycleState::Refreshing);
            claimed
        };

        let result = self.provider.refresh(&refresh_token).await;

        let guard = self.commit.lock().await;
        if self.lock().epoch != epoch {
            tracing::debug!("Discarding stale refresh response");
            return Err(Error::Superseded);
        }

        let failure = match result {
            Ok(tokens) if tokens.access_token.is_empty() => Error::Provider {
                operation: "token refresh",
                status: 200,
                message: "empty access token".into(),
            },
            Ok(tokens) => {
                let session = assemble_session(tokens);
                {
                    let mut inner = self.lock();
                    inner.epoch += 1;
                    inner.state = LifecycleState::Authenticated;
                    inner.session = Some(session.clone());
                }
                match self.store.save(&session).await {
                    Ok(()) => {
                        self.publish(LifecycleState::Authenticated);
                        tracing::info!("Tokens refreshed");
                        return Ok(());
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        tracing::error!(error = %failure, "Token refresh failed, logging out");
        let session = self.end_session().await;
        drop(guard);
        self.revoke_remote(session).await;
        Err(failure)
    }

    // ── Validation ─────────────────────────────────────────────────

    /// Ask the provider whether the current access token is valid.
    ///
    /// This is the check to use for permission decisions; decoded claims
    /// are display data only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a live session, otherwise
    /// the provider's error.
    pub async fn validate(&self) -> Result<TokenValidation, Error> {
        let token = self.access_token().ok_or(Error::NotAuthenticated)?;
        self.provider.validate_token(&token).await
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_session(&self, session: Option<Session>, state: LifecycleState) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.session = session;
        inner.state = state;
    }

    fn publish(&self, state: LifecycleState) -> LifecycleState {
        self.state_tx.send_replace(state.clone());
        state
    }

    fn publish_unauthenticated(&self) -> LifecycleState {
        self.set_session(None, LifecycleState::Unauthenticated);
        self.publish(LifecycleState::Unauthenticated)
    }

    fn fail(&self, reason: FailureReason) -> LifecycleState {
        let state = LifecycleState::Error(reason);
        self.set_session(None, state.clone());
        self.publish(state)
    }
}

fn assemble_session(tokens: RawTokenResponse) -> Session {
    let claims = tokens
        .identity_token
        .as_deref()
        .map_or_else(UserClaims::placeholder, decode_claims);
    Session::new(tokens, claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_without_identity_token_gets_placeholder_claims() {
        let session = assemble_session(RawTokenResponse::new("at"));
        assert_eq!(session.claims, UserClaims::placeholder());
        assert_eq!(session.access_token, "at");
    }

    #[test]
    fn session_with_garbage_identity_token_gets_unknown_claims() {
        let session = assemble_session(RawTokenResponse::new("at").with_identity_token("garbage"));
        assert_eq!(session.claims, UserClaims::unknown());
        assert_eq!(session.identity_token.as_deref(), Some("garbage"));
    }

    #[test]
    fn config_builder() {
        let config = ControllerConfig::default()
            .with_require_state(true)
            .with_store_keys(StoreKeys::default().with_session("s"));
        assert!(config.require_state);
        assert_eq!(config.store_keys.session, "s");
    }
}
