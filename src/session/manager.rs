use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;

use super::config::ClientConfig;
use super::state::{
    ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, RefreshSlot, SESSION_KEYS, SessionInner, SessionState,
    USER_PROFILE_KEY,
};
use super::traits::{KeyValueStore, LoginRedirect, Navigator, NoopNavigator};
use crate::claims::{Claims, decode_claims, is_token_expired};
use crate::error::Error;
use crate::pipeline::ensure_success;
use crate::types::{Credentials, Identity, Role, TokenResponse, UserId, UserProfile};

/// `{token}` body of the refresh and logout endpoints.
#[derive(Serialize)]
pub(super) struct TokenBody<'a> {
    pub(super) token: &'a str,
}

/// Handle to the process-wide session.
///
/// Cheap to clone; every clone shares the same tokens and refresh
/// coordination. Inject it into collaborators instead of reaching for a global.
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<SessionInner>,
}

/// Builder for [`SessionManager`].
pub struct SessionBuilder {
    config: ClientConfig,
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    http: Option<reqwest::Client>,
}

impl SessionBuilder {
    /// Navigation used when the session ends with a redirect (default: [`NoopNavigator`]).
    #[must_use]
    pub fn with_navigator(mut self, navigator: impl Navigator) -> Self {
        self.navigator = Arc::new(navigator);
        self
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Build the manager and repopulate the session from the store.
    ///
    /// Unreadable store entries are logged and treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the default HTTP client cannot be constructed.
    pub fn build(self) -> Result<SessionManager, Error> {
        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.config.timeout())
                .build()?,
        };

        let state = load_state(self.store.as_ref());
        let (authenticated, _) = watch::channel(false);

        let manager = SessionManager {
            inner: Arc::new(SessionInner {
                config: self.config,
                http,
                store: self.store,
                navigator: self.navigator,
                state: Mutex::new(state),
                refresh: Mutex::new(RefreshSlot::default()),
                authenticated,
            }),
        };
        manager.publish_auth_state();
        Ok(manager)
    }
}

fn read_key(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            tracing::warn!(error = %e, key, "Could not read persisted session entry");
            None
        }
    }
}

fn load_state(store: &dyn KeyValueStore) -> SessionState {
    let profile = read_key(store, USER_PROFILE_KEY).and_then(|raw| {
        serde_json::from_str::<UserProfile>(&raw)
            .map_err(|e| tracing::warn!(error = %e, "Ignoring unreadable persisted user profile"))
            .ok()
    });

    SessionState {
        access_token: read_key(store, ACCESS_TOKEN_KEY),
        refresh_token: read_key(store, REFRESH_TOKEN_KEY),
        profile,
    }
}

impl SessionManager {
    /// Start building a session over `store`.
    #[must_use]
    pub fn builder(config: ClientConfig, store: impl KeyValueStore) -> SessionBuilder {
        SessionBuilder {
            config,
            store: Arc::new(store),
            navigator: Arc::new(NoopNavigator),
            http: None,
        }
    }

    /// Session with default navigation and HTTP client.
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::build`].
    pub fn new(config: ClientConfig, store: impl KeyValueStore) -> Result<Self, Error> {
        Self::builder(config, store).build()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// HTTP client shared with the authorized pipeline.
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.inner.http
    }

    // ── Login ──────────────────────────────────────────────────────

    /// Exchange credentials for tokens and persist them.
    ///
    /// Does not navigate anywhere; the caller decides what to show next.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthorizationFailure`] for rejected credentials,
    /// [`Error::InvalidResponse`] if the response carries no access token,
    /// [`Error::Network`] on transport failure and [`Error::Store`] if the
    /// tokens cannot be persisted.
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity, Error> {
        let url = self.inner.config.login_url()?;
        let response = self.inner.http.post(url).json(credentials).send().await?;
        let response = ensure_success(response, "login").await?;
        let body: TokenResponse = response.json().await.map_err(|e| Error::InvalidResponse {
            operation: "login",
            detail: e.to_string(),
        })?;

        let access_token = self.store_tokens(body, "login", None)?;
        let identity = self.identity_for(&access_token);
        tracing::info!(subject = ?identity.subject, role = ?identity.role, "Login successful");
        Ok(identity)
    }

    // ── Logout ─────────────────────────────────────────────────────

    /// End the session.
    ///
    /// Notifies the backend in the background (failures ignored), then
    /// synchronously clears the persisted keys, the in-memory tokens and the
    /// refresh coordination. Navigates to the login view when `redirect` is set.
    pub fn logout(&self, redirect: bool) {
        let target = redirect.then(|| self.login_redirect(None));
        self.end_session(target.as_ref());
    }

    /// Like `logout(true)`, with a path to come back to after signing in.
    pub fn logout_with_return(&self, return_to: impl Into<String>) {
        let target = self.login_redirect(Some(return_to.into()));
        self.end_session(Some(&target));
    }

    fn login_redirect(&self, return_to: Option<String>) -> LoginRedirect {
        LoginRedirect {
            login_view: self.inner.config.login_view().to_owned(),
            return_to,
        }
    }

    fn end_session(&self, redirect: Option<&LoginRedirect>) {
        // Waits out a token commit in progress; a later one sees the new epoch.
        self.inner.refresh_slot().reset();

        let refresh_token = {
            let mut state = self.inner.state();
            let token = state.refresh_token.take();
            state.access_token = None;
            state.profile = None;
            token
        };

        if let Some(token) = refresh_token {
            self.notify_backend_logout(token);
        }

        for key in SESSION_KEYS {
            if let Err(e) = self.inner.store.remove(key) {
                tracing::warn!(error = %e, key, "Could not remove persisted session entry");
            }
        }

        self.publish_auth_state();
        tracing::info!("Session cleared");

        if let Some(redirect) = redirect {
            self.inner.navigator.to_login(redirect);
        }
    }

    fn notify_backend_logout(&self, token: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime; skipping backend logout call");
            return;
        };
        let url = match self.inner.config.logout_url() {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping backend logout call");
                return;
            }
        };
        let http = self.inner.http.clone();

        runtime.spawn(async move {
            match http.post(url).json(&TokenBody { token: &token }).send().await {
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "Backend logout acknowledged");
                }
                Err(e) => tracing::debug!(error = %e, "Backend logout failed (ignored)"),
            }
        });
    }

    // ── State ──────────────────────────────────────────────────────

    /// Access token present and not expired.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token()
            .is_some_and(|token| !is_token_expired(&token))
    }

    /// Alias of [`is_authenticated`](Self::is_authenticated).
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.is_authenticated()
    }

    /// Authentication flag, updated after every token mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.authenticated.subscribe()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner.state().access_token.clone()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.inner.state().refresh_token.clone()
    }

    #[must_use]
    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.state().profile.clone()
    }

    /// Claims of the current access token.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        self.access_token().as_deref().and_then(decode_claims)
    }

    /// Role from the token claims, falling back to the persisted profile.
    #[must_use]
    pub fn user_role(&self) -> Option<Role> {
        self.claims()
            .and_then(|c| c.role())
            .or_else(|| self.profile().and_then(|p| p.role))
    }

    /// User id from the token `sub` claim, falling back to the persisted profile.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.claims()
            .and_then(|c| c.subject())
            .or_else(|| self.profile().and_then(|p| p.id))
    }

    /// Identity of the signed-in user, if any token is held.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.access_token().map(|token| self.identity_for(&token))
    }

    fn identity_for(&self, access_token: &str) -> Identity {
        let claims = decode_claims(access_token);
        let profile = self.profile();

        Identity {
            subject: claims
                .as_ref()
                .and_then(Claims::subject)
                .or_else(|| profile.as_ref().and_then(|p| p.id.clone())),
            role: claims
                .as_ref()
                .and_then(Claims::role)
                .or_else(|| profile.as_ref().and_then(|p| p.role.clone())),
            expiry: claims.as_ref().and_then(Claims::expiry),
        }
    }

    pub(super) fn publish_auth_state(&self) {
        self.inner.authenticated.send_replace(self.is_authenticated());
    }

    // ── Persistence ────────────────────────────────────────────────

    fn persist(&self, key: &str, value: Option<&str>) -> Result<(), Error> {
        let result = match value {
            Some(v) => self.inner.store.set(key, v),
            None => self.inner.store.remove(key),
        };
        result.map_err(|e| Error::Store(format!("{key}: {e}")))
    }

    /// Persist a login/refresh response. Returns the new access token.
    ///
    /// Runs under the refresh slot lock, so it cannot interleave with a
    /// logout. With `epoch` set, nothing is written unless the slot still
    /// belongs to that refresh attempt. On a store failure the keys already
    /// written are put back and memory is left untouched.
    pub(super) fn store_tokens(
        &self,
        response: TokenResponse,
        operation: &'static str,
        epoch: Option<u64>,
    ) -> Result<String, Error> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidResponse {
                operation,
                detail: "missing accessToken".into(),
            })?;
        let refresh_token = response.refresh_token.filter(|t| !t.is_empty());
        let profile_json = response
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Store(format!("{USER_PROFILE_KEY}: {e}")))?;

        let mut entries = vec![(ACCESS_TOKEN_KEY, access_token.as_str())];
        if let Some(token) = &refresh_token {
            entries.push((REFRESH_TOKEN_KEY, token.as_str()));
        }
        if let Some(json) = &profile_json {
            entries.push((USER_PROFILE_KEY, json.as_str()));
        }

        {
            let slot = self.inner.refresh_slot();
            if epoch.is_some_and(|epoch| epoch != slot.epoch) {
                return Err(Error::RefreshAborted("session ended during refresh".into()));
            }
            self.persist_all(&entries)?;

            let mut state = self.inner.state();
            state.access_token = Some(access_token.clone());
            if refresh_token.is_some() {
                state.refresh_token = refresh_token;
            }
            if response.user.is_some() {
                state.profile = response.user;
            }
        }

        self.publish_auth_state();
        Ok(access_token)
    }

    /// Write every entry or none of them.
    fn persist_all(&self, entries: &[(&'static str, &str)]) -> Result<(), Error> {
        let mut written: Vec<(&'static str, Option<String>)> = Vec::with_capacity(entries.len());
        for &(key, value) in entries {
            let previous = self.inner.store.get(key).ok().flatten();
            if let Err(e) = self.persist(key, Some(value)) {
                for (key, previous) in written.iter().rev() {
                    if let Err(undo) = self.persist(key, previous.as_deref()) {
                        tracing::warn!(error = %undo, key, "Could not roll back session entry");
                    }
                }
                return Err(e);
            }
            written.push((key, previous));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    use std::sync::Arc;

    use super::*;
    use crate::claims::unsigned_token;
    use crate::session::MemoryStore;

    type StoreResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

    /// Rejects writes to one key.
    struct FailingStore {
        inner: MemoryStore,
        failing_key: &'static str,
    }

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> StoreResult<()> {
            if key == self.failing_key {
                return Err("disk full".into());
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> StoreResult<()> {
            self.inner.remove(key)
        }
    }

    fn token_response(access: &str, refresh: &str) -> TokenResponse {
        serde_json::from_value(json!({"accessToken": access, "refreshToken": refresh})).unwrap()
    }

    fn test_config() -> ClientConfig {
        ClientConfig::new("http://127.0.0.1:9".parse().unwrap())
    }

    fn token_expiring_in(seconds: i64) -> String {
        let exp = (OffsetDateTime::now_utc() + Duration::seconds(seconds)).unix_timestamp();
        unsigned_token(&json!({"sub": "17", "role": "technicien", "exp": exp}))
    }

    #[test]
    fn restores_session_from_store() {
        let store = MemoryStore::new();
        store.set(ACCESS_TOKEN_KEY, &token_expiring_in(600)).unwrap();
        store.set(REFRESH_TOKEN_KEY, "refresh-1").unwrap();
        store
            .set(USER_PROFILE_KEY, r#"{"id":"17","role":"admin"}"#)
            .unwrap();

        let session = SessionManager::new(test_config(), store).unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(session.user_id(), Some(UserId("17".into())));
        // claim wins over profile
        assert_eq!(session.user_role(), Some(Role("technicien".into())));
        assert!(*session.subscribe().borrow());
    }

    #[test]
    fn expired_token_is_not_authenticated() {
        let store = MemoryStore::new();
        store.set(ACCESS_TOKEN_KEY, &token_expiring_in(-5)).unwrap();

        let session = SessionManager::new(test_config(), store).unwrap();
        assert!(!session.is_authenticated());
        assert!(!session.is_logged_in());
    }

    #[test]
    fn profile_fallback_when_token_has_no_claims() {
        let store = MemoryStore::new();
        store
            .set(ACCESS_TOKEN_KEY, &unsigned_token(&json!({"scope": "erp"})))
            .unwrap();
        store
            .set(USER_PROFILE_KEY, r#"{"id":5,"role":"rh"}"#)
            .unwrap();

        let session = SessionManager::new(test_config(), store).unwrap();
        assert_eq!(session.user_id(), Some(UserId("5".into())));
        assert_eq!(session.user_role(), Some(Role("rh".into())));
        assert!(session.is_authenticated(), "no exp means valid");
    }

    #[test]
    fn unreadable_profile_is_ignored() {
        let store = MemoryStore::new();
        store.set(USER_PROFILE_KEY, "{broken").unwrap();

        let session = SessionManager::new(test_config(), store).unwrap();
        assert!(session.profile().is_none());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn store_tokens_requires_access_token() {
        let session = SessionManager::new(test_config(), MemoryStore::new()).unwrap();
        let err = session
            .store_tokens(TokenResponse::default(), "login", None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { .. }));
        assert!(session.access_token().is_none());
    }

    #[test]
    fn logout_clears_everything() {
        let store = MemoryStore::new();
        store.set(ACCESS_TOKEN_KEY, &token_expiring_in(600)).unwrap();
        store.set(REFRESH_TOKEN_KEY, "refresh-1").unwrap();
        store.set(USER_PROFILE_KEY, r#"{"id":"17"}"#).unwrap();

        let session = SessionManager::new(test_config(), store).unwrap();
        let watcher = session.subscribe();
        assert!(session.is_authenticated());

        // no runtime: the backend call is skipped, local teardown still happens
        session.logout(false);

        assert!(!session.is_authenticated());
        assert!(session.access_token().is_none());
        assert!(session.refresh_token().is_none());
        assert!(session.profile().is_none());
        assert!(!*watcher.borrow());
    }

    #[test]
    fn logout_resets_refresh_epoch() {
        let session = SessionManager::new(test_config(), MemoryStore::new()).unwrap();
        let before = session.inner.refresh_slot().epoch;
        session.logout(false);
        assert_eq!(session.inner.refresh_slot().epoch, before + 1);
        assert!(session.inner.refresh_slot().pending.is_none());
    }

    #[test]
    fn failed_write_leaves_no_partial_session() {
        let store = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            failing_key: REFRESH_TOKEN_KEY,
        });
        let session = SessionManager::new(test_config(), store.clone()).unwrap();

        let response = token_response(&token_expiring_in(600), "refresh-2");
        let err = session.store_tokens(response, "login", None).unwrap_err();

        assert!(matches!(err, Error::Store(ref detail) if detail.contains("disk full")));
        assert!(store.inner.keys().is_empty());
        assert!(session.access_token().is_none());

        let restored = SessionManager::new(test_config(), store).unwrap();
        assert!(!restored.is_authenticated());
    }

    #[test]
    fn failed_write_restores_previous_entries() {
        let previous = token_expiring_in(600);
        let store = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            failing_key: USER_PROFILE_KEY,
        });
        store.inner.set(ACCESS_TOKEN_KEY, &previous).unwrap();
        store.inner.set(REFRESH_TOKEN_KEY, "refresh-1").unwrap();
        let session = SessionManager::new(test_config(), store.clone()).unwrap();

        let response: TokenResponse = serde_json::from_value(json!({
            "accessToken": token_expiring_in(900),
            "refreshToken": "refresh-2",
            "user": {"id": "17"},
        }))
        .unwrap();
        assert!(session.store_tokens(response, "login", None).is_err());

        assert_eq!(store.inner.get(ACCESS_TOKEN_KEY).unwrap(), Some(previous.clone()));
        assert_eq!(store.inner.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("refresh-1"));
        assert_eq!(session.access_token(), Some(previous));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn stale_refresh_result_is_not_stored() {
        let store = Arc::new(MemoryStore::new());
        let session = SessionManager::new(test_config(), store.clone()).unwrap();
        let epoch = session.inner.refresh_slot().epoch;
        session.logout(false);

        let response = token_response(&token_expiring_in(600), "refresh-2");
        let err = session
            .store_tokens(response, "token refresh", Some(epoch))
            .unwrap_err();

        assert!(matches!(err, Error::RefreshAborted(_)));
        assert!(store.keys().is_empty());
        assert!(!session.is_authenticated());
    }
}
