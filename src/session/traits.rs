/// Consumer-provided durable key-value storage for the session.
///
/// Holds the access token, the refresh token and the JSON-encoded user
/// profile under three fixed keys. Reads happen once at startup; writes
/// happen on every token mutation.
///
/// # Example
///
/// ```rust,ignore
/// impl KeyValueStore for BrowserLikeStorage {
///     fn get(&self, key: &str) -> Result<Option<String>, ...> {
///         Ok(self.map.lock().unwrap().get(key).cloned())
///     }
///     fn set(&self, key: &str, value: &str) -> Result<(), ...> { ... }
///     fn remove(&self, key: &str) -> Result<(), ...> { ... }
/// }
/// ```
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Lets the caller keep a handle on the store it hands to the session.
impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).remove(key)
    }
}

/// Where to send the user when the session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    /// Login view path, e.g. `/login`.
    pub login_view: String,
    /// Path to come back to after signing in again.
    pub return_to: Option<String>,
}

impl LoginRedirect {
    /// Target URL: `login_view`, plus `?returnUrl=<encoded>` when a return path is set.
    #[must_use]
    pub fn target(&self) -> String {
        match &self.return_to {
            Some(path) => format!(
                "{}?returnUrl={}",
                self.login_view,
                urlencoding::encode(path)
            ),
            None => self.login_view.clone(),
        }
    }
}

/// Consumer-provided navigation, invoked after the session has been cleared.
pub trait Navigator: Send + Sync + 'static {
    fn to_login(&self, redirect: &LoginRedirect);
}

/// Navigator for headless use: only logs the redirect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn to_login(&self, redirect: &LoginRedirect) {
        tracing::debug!(redirect = %redirect.target(), "Login redirect requested");
    }
}
