use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;

use super::config::ClientConfig;
use super::traits::{KeyValueStore, Navigator};
use crate::error::Error;
use crate::types::UserProfile;

pub(super) const ACCESS_TOKEN_KEY: &str = "access_token";
pub(super) const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub(super) const USER_PROFILE_KEY: &str = "user_profile";

pub(super) const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_PROFILE_KEY];

/// In-memory mirror of the persisted session.
#[derive(Debug, Default)]
pub(super) struct SessionState {
    pub(super) access_token: Option<String>,
    pub(super) refresh_token: Option<String>,
    pub(super) profile: Option<UserProfile>,
}

pub(super) type SharedRefresh = Shared<BoxFuture<'static, Result<String, Error>>>;

/// Single-flight refresh coordination.
///
/// `pending` is the in-flight attempt every caller awaits. `epoch` advances
/// each time the slot is reset (settlement or logout) so a stale attempt can
/// tell it no longer owns the slot.
#[derive(Default)]
pub(super) struct RefreshSlot {
    pub(super) pending: Option<SharedRefresh>,
    pub(super) epoch: u64,
}

impl RefreshSlot {
    pub(super) fn reset(&mut self) {
        self.pending = None;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

/// Shared state behind every [`SessionManager`](super::SessionManager) handle.
pub(super) struct SessionInner {
    pub(super) config: ClientConfig,
    pub(super) http: reqwest::Client,
    pub(super) store: Arc<dyn KeyValueStore>,
    pub(super) navigator: Arc<dyn Navigator>,
    pub(super) state: Mutex<SessionState>,
    pub(super) refresh: Mutex<RefreshSlot>,
    pub(super) authenticated: watch::Sender<bool>,
}

impl SessionInner {
    // Guards are never held across an await point, so a poisoned lock only
    // means another thread panicked mid-update; the data itself stays usable.
    pub(super) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn refresh_slot(&self) -> MutexGuard<'_, RefreshSlot> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
