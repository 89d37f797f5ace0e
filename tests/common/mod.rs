#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use fieldops_client::{ClientConfig, KeyValueStore, LoginRedirect, Navigator, SessionManager};
use mockito::ServerGuard;
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};

/// Unsigned `header.payload.signature` token carrying `payload`.
pub fn token_with(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

static NEXT_JTI: AtomicU64 = AtomicU64::new(1);

/// Token for `sub` valid for the next hour. Every call yields a distinct token.
pub fn fresh_token(sub: &str) -> String {
    let exp = (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp();
    let jti = NEXT_JTI.fetch_add(1, Ordering::Relaxed);
    token_with(&json!({"sub": sub, "role": "technicien", "exp": exp, "jti": jti}))
}

pub fn expired_token(sub: &str) -> String {
    let exp = (OffsetDateTime::now_utc() - Duration::hours(1)).unix_timestamp();
    token_with(&json!({"sub": sub, "exp": exp}))
}

/// Navigator that records every redirect target.
#[derive(Clone, Default)]
pub struct RecordingNavigator {
    targets: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn to_login(&self, redirect: &LoginRedirect) {
        self.targets.lock().unwrap().push(redirect.target());
    }
}

pub fn config_for(server: &ServerGuard) -> ClientConfig {
    ClientConfig::new(server.url().parse().unwrap())
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn session_for(
    config: ClientConfig,
    store: impl KeyValueStore,
) -> (SessionManager, RecordingNavigator) {
    let navigator = RecordingNavigator::default();
    let session = SessionManager::builder(config, store)
        .with_navigator(navigator.clone())
        .build()
        .unwrap();
    (session, navigator)
}
