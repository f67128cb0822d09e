//! Auth state machine: who is logged in, through which provider, and how the
//! last operation went.
//!
//! DESIGN
//! ======
//! `status` describes the most recent operation (`idle`, `loading`,
//! `succeeded`, `failed`). Identity is the separate `is_authenticated` flag.
//! Each operation marks the session `loading`, awaits the gateway, then
//! applies exactly one terminal transition. Terminal transitions and the
//! store writes that go with them run under one lock, so observers never see
//! the session and the store disagree halfway through.
//!
//! Operations are not cancelled. When two overlap, whichever finishes last
//! decides the final state.
//!
//! PROVIDER TAG
//! ============
//! The provider lives in `Session::provider` and is mirrored onto
//! `user.provider`. The store's `auth_provider` key wins on disagreement, and
//! the in-memory user is rewritten to match.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Method;
use serde::Serialize;

use crate::api::{ApiError, Gateway, decode};
use crate::store::{
    INTENDED_PROVIDER_KEY, SessionStore, StoreError, StoredSession, TOKEN_KEY, clear_session, persist_session,
};
use crate::types::{LoginRequest, LoginResponse, Provider, RegisterRequest, RegisterResponse, User};

const REGISTER_FAILED: &str = "Registration failed";
const LOGIN_FAILED: &str = "Login failed";
const FETCH_USER_FAILED: &str = "Failed to get user";
const NOT_AUTHENTICATED: &str = "Not authenticated";
const SESSION_ENDED: &str = "Session ended while fetching user";
const OAUTH_FAILED: &str = "Authentication failed";

// =============================================================================
// SESSION
// =============================================================================

/// Lifecycle of the most recent auth operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// In-memory view of the current identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub user: Option<User>,
    pub provider: Option<Provider>,
    pub is_authenticated: bool,
    pub status: AuthStatus,
    pub error: Option<String>,
}

impl Session {
    /// Rebuild the session from whatever the store holds. A present token
    /// counts as authenticated until the server says otherwise.
    #[must_use]
    pub fn rehydrate(store: &dyn SessionStore) -> Self {
        let stored = StoredSession::load(store);
        let provider = stored
            .provider
            .or_else(|| stored.user.as_ref().and_then(|u| u.provider));
        let user = stored.user.map(|mut u| {
            if provider.is_some() {
                u.provider = provider;
            }
            u
        });
        Self {
            is_authenticated: stored.token.is_some(),
            token: stored.token,
            user,
            provider,
            status: AuthStatus::Idle,
            error: None,
        }
    }

    fn reset_identity(&mut self) {
        self.token = None;
        self.user = None;
        self.provider = None;
        self.is_authenticated = false;
    }

    fn authenticate(&mut self, token: String, user: User, provider: Provider) {
        self.token = Some(token);
        self.user = Some(user);
        self.provider = Some(provider);
        self.is_authenticated = true;
        self.status = AuthStatus::Succeeded;
        self.error = None;
    }
}

// =============================================================================
// ERRORS / PAYLOADS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The operation failed; `message` is what the session recorded in `error`.
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<ApiError>,
    },

    /// An OAuth grant arrived without a usable token.
    #[error("authentication token missing")]
    MissingToken,

    /// A redirect flow was requested for a provider that has none.
    #[error("provider '{0}' has no redirect flow")]
    UnsupportedProvider(Provider),

    /// A request body could not be serialized.
    #[error("request encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The session could not be written. The session is reset and the
    /// store cleared as far as possible.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another login replaced the stored token while `/auth/me` was in
    /// flight. The fetched user was discarded.
    #[error("session changed while fetching user")]
    Superseded,
}

/// Identity handed over by a completed OAuth redirect.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthGrant {
    pub token: String,
    pub user: User,
    pub provider: Provider,
}

// =============================================================================
// MACHINE
// =============================================================================

/// What a failed operation does to the identity.
#[derive(Debug, Clone, Copy)]
enum OnFailure {
    Keep,
    Deauthenticate,
    Reset,
}

pub struct AuthMachine {
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn Gateway>,
    session: Mutex<Session>,
}

impl AuthMachine {
    /// Create a machine whose initial state is rehydrated from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, gateway: Arc<dyn Gateway>) -> Self {
        let session = Session::rehydrate(store.as_ref());
        tracing::debug!(authenticated = session.is_authenticated, provider = ?session.provider, "session rehydrated");
        Self { store, gateway, session: Mutex::new(session) }
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, clear_error: bool) {
        let mut session = self.lock();
        session.status = AuthStatus::Loading;
        if clear_error {
            session.error = None;
        }
    }

    /// Record a failure and apply `identity` to the session in the same step.
    fn fail(&self, err: Option<ApiError>, fallback: &str, identity: OnFailure) -> AuthError {
        let message = err
            .as_ref()
            .and_then(ApiError::server_message)
            .unwrap_or(fallback)
            .to_owned();
        let mut session = self.lock();
        self.apply_failure(&mut session, &message, identity);
        AuthError::Failed { message, source: err }
    }

    /// Failure transition for callers already holding the session lock.
    fn apply_failure(&self, session: &mut Session, message: &str, identity: OnFailure) {
        match identity {
            OnFailure::Keep => {}
            OnFailure::Deauthenticate => session.is_authenticated = false,
            OnFailure::Reset => {
                self.clear_store();
                session.reset_identity();
            }
        }
        session.status = AuthStatus::Failed;
        session.error = Some(message.to_owned());
    }

    fn clear_store(&self) {
        if let Err(e) = clear_session(self.store.as_ref()) {
            tracing::warn!(error = %e, "session store could not be cleared");
        }
    }

    // -------------------------------------------------------------------------
    // register
    // -------------------------------------------------------------------------

    /// Create an account. Never logs the user in; a separate [`Self::login`] is required.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Failed`] with the server's message, or `"Registration failed"`.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Option<String>, AuthError> {
        let body = serde_json::to_value(request)?;
        self.begin(true);

        let result = self
            .gateway
            .request(Method::POST, "/auth/register", Some(body))
            .await
            .and_then(|body| {
                if body.is_null() {
                    Ok(RegisterResponse::default())
                } else {
                    decode::<RegisterResponse>(body)
                }
            });

        match result {
            Ok(resp) => {
                let mut session = self.lock();
                session.status = AuthStatus::Succeeded;
                session.error = None;
                tracing::info!(username = %request.username, "registered");
                Ok(resp.message)
            }
            Err(e) => {
                tracing::warn!(username = %request.username, error = %e, "registration failed");
                Err(self.fail(Some(e), REGISTER_FAILED, OnFailure::Keep))
            }
        }
    }

    // -------------------------------------------------------------------------
    // login
    // -------------------------------------------------------------------------

    /// Password login. On success the token and user are persisted with provider `local`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Failed`] with the server's message, or `"Login failed"`.
    pub async fn login(&self, request: &LoginRequest) -> Result<User, AuthError> {
        let body = serde_json::to_value(request)?;
        self.begin(true);

        let result = self
            .gateway
            .request(Method::POST, "/auth/login", Some(body))
            .await
            .and_then(decode::<LoginResponse>)
            .and_then(|resp| {
                if resp.token.trim().is_empty() {
                    Err(ApiError::Decode("login response carried an empty token".into()))
                } else {
                    Ok(resp)
                }
            });

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(username = %request.username, error = %e, "login failed");
                return Err(self.fail(Some(e), LOGIN_FAILED, OnFailure::Deauthenticate));
            }
        };

        let user = resp.user.with_provider(Provider::Local);
        {
            let mut session = self.lock();
            if let Err(e) = persist_session(self.store.as_ref(), &resp.token, &user, Provider::Local) {
                tracing::warn!(user_id = %user.id, error = %e, "login could not be stored");
                self.apply_failure(&mut session, LOGIN_FAILED, OnFailure::Reset);
                return Err(e.into());
            }
            session.authenticate(resp.token, user.clone(), Provider::Local);
        }
        tracing::info!(user_id = %user.id, "logged in");
        Ok(user)
    }

    // -------------------------------------------------------------------------
    // logout
    // -------------------------------------------------------------------------

    /// Best-effort remote logout. Local state is cleared whether or not the
    /// server call succeeds.
    pub async fn logout(&self) {
        self.begin(false);

        if let Err(e) = self.gateway.request(Method::POST, "/auth/logout", None).await {
            tracing::warn!(error = %e, "remote logout failed; clearing local session anyway");
        }

        let mut session = self.lock();
        self.clear_store();
        session.reset_identity();
        session.status = AuthStatus::Idle;
        session.error = None;
        tracing::info!("logged out");
    }

    // -------------------------------------------------------------------------
    // fetch_current_user
    // -------------------------------------------------------------------------

    /// Ask the server who the stored token belongs to. Any failure means the
    /// token is no longer trusted: the store is cleared and the session reset.
    ///
    /// The result is applied only if the stored token is still the one the
    /// request was sent with. If a logout removed it the session is reset; if
    /// another login replaced it the fetched user is discarded and the session
    /// is rebuilt from the store.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Failed`] with the server's message, or `"Failed to get user"`.
    pub async fn fetch_current_user(&self) -> Result<User, AuthError> {
        self.begin(false);

        let Some(sent_token) = self.store.get(TOKEN_KEY).filter(|t| !t.trim().is_empty()) else {
            return Err(self.fail(None, NOT_AUTHENTICATED, OnFailure::Reset));
        };

        let fetched = match self
            .gateway
            .request(Method::GET, "/auth/me", None)
            .await
            .and_then(decode::<User>)
        {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "current user fetch failed; resetting session");
                return Err(self.fail(Some(e), FETCH_USER_FAILED, OnFailure::Reset));
            }
        };

        let mut session = self.lock();
        let stored = StoredSession::load(self.store.as_ref());
        let Some(token) = stored.token else {
            self.apply_failure(&mut session, SESSION_ENDED, OnFailure::Reset);
            return Err(AuthError::Failed { message: SESSION_ENDED.to_owned(), source: None });
        };
        if token != sent_token {
            tracing::debug!(user_id = %fetched.id, "stored token replaced during fetch; discarding user");
            let status = match session.status {
                AuthStatus::Loading => AuthStatus::Idle,
                other => other,
            };
            let error = session.error.take();
            *session = Session { status, error, ..Session::rehydrate(self.store.as_ref()) };
            return Err(AuthError::Superseded);
        }

        let provider = stored
            .provider
            .or(session.provider)
            .or(fetched.provider)
            .unwrap_or(Provider::Unknown);
        let user = fetched.with_provider(provider);

        if let Err(e) = persist_session(self.store.as_ref(), &token, &user, provider) {
            tracing::warn!(error = %e, "current user could not be stored; resetting session");
            self.apply_failure(&mut session, FETCH_USER_FAILED, OnFailure::Reset);
            return Err(e.into());
        }
        session.authenticate(token, user.clone(), provider);
        tracing::debug!(user_id = %user.id, %provider, "current user refreshed");
        Ok(user)
    }

    // -------------------------------------------------------------------------
    // OAuth
    // -------------------------------------------------------------------------

    /// Adopt the identity delivered by an OAuth redirect. No network call.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingToken`] for a blank token (nothing is
    /// written), or [`AuthError::Store`] if the session cannot be stored, in
    /// which case the session is reset.
    pub fn ingest_oauth_callback(&self, grant: OAuthGrant) -> Result<(), AuthError> {
        if grant.token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        let OAuthGrant { token, user, provider } = grant;
        let user = user.with_provider(provider);

        let mut session = self.lock();
        if let Err(e) = persist_session(self.store.as_ref(), &token, &user, provider) {
            tracing::warn!(user_id = %user.id, %provider, error = %e, "oauth session could not be stored");
            self.apply_failure(&mut session, OAUTH_FAILED, OnFailure::Reset);
            return Err(e.into());
        }
        tracing::info!(user_id = %user.id, %provider, "oauth session established");
        session.authenticate(token, user, provider);
        Ok(())
    }

    /// Record which provider the user picked and return the URL to send them to.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedProvider`] for `local` and `unknown`,
    /// or [`AuthError::Store`] if the choice cannot be recorded.
    pub fn begin_oauth(&self, provider: Provider, api_base_url: &str) -> Result<String, AuthError> {
        if !provider.is_oauth() {
            return Err(AuthError::UnsupportedProvider(provider));
        }
        self.store
            .set(INTENDED_PROVIDER_KEY, provider.as_str())
            .map_err(StoreError::from)?;
        Ok(format!("{}/auth/{provider}", api_base_url.trim_end_matches('/')))
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
