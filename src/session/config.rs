use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Backend and session settings shared by the session manager, the
/// authorized pipeline and the data service.
///
/// The required field (`base_url`) is a constructor parameter. Everything
/// else has a default and a `with_*` override.
///
/// ```rust,ignore
/// let config = ClientConfig::new("https://erp.example.com/api".parse()?)
///     .with_page_size(25)
///     .with_login_view("/connexion");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) login_path: String,
    pub(crate) refresh_path: String,
    pub(crate) logout_path: String,
    pub(crate) login_view: String,
    pub(crate) page_size: u32,
    pub(crate) timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            login_path: "/auth/login".into(),
            refresh_path: "/auth/refresh".into(),
            logout_path: "/auth/logout".into(),
            login_view: "/login".into(),
            page_size: 10,
            timeout: Duration::from_secs(30),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `FIELDOPS_API_URL`: backend base URL
    ///
    /// # Optional env vars
    /// - `FIELDOPS_LOGIN_VIEW`: login view path (default `/login`)
    /// - `FIELDOPS_PAGE_SIZE`: listing page size (default `10`)
    /// - `FIELDOPS_TIMEOUT_SECS`: HTTP timeout in seconds (default `30`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is missing or a value does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let base_url_str = std::env::var("FIELDOPS_API_URL")
            .map_err(|_| Error::Config("FIELDOPS_API_URL is required".into()))?;
        let base_url: Url = base_url_str
            .parse()
            .map_err(|e| Error::Config(format!("FIELDOPS_API_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let Ok(view) = std::env::var("FIELDOPS_LOGIN_VIEW") {
            config = config.with_login_view(view);
        }
        if let Ok(size) = std::env::var("FIELDOPS_PAGE_SIZE") {
            let size: u32 = size
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("FIELDOPS_PAGE_SIZE: {e}")))?;
            config = config.with_page_size(size);
        }
        if let Ok(secs) = std::env::var("FIELDOPS_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("FIELDOPS_TIMEOUT_SECS: {e}")))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn with_login_view(mut self, path: impl Into<String>) -> Self {
        self.login_view = path.into();
        self
    }

    /// Page size for listings. Zero is bumped to one.
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn login_view(&self) -> &str {
        &self.login_view
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URL of a backend path, appended to the base URL's path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the result is not a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
            .parse()
            .map_err(|e| Error::Config(format!("endpoint {path}: {e}")))
    }

    /// Whether `url` targets the refresh endpoint. Such requests are never refreshed-and-retried.
    #[must_use]
    pub fn is_refresh_endpoint(&self, url: &Url) -> bool {
        url.path().trim_end_matches('/').ends_with(self.refresh_path.trim_end_matches('/'))
    }

    pub(crate) fn login_url(&self) -> Result<Url, Error> {
        self.endpoint(&self.login_path)
    }

    pub(crate) fn refresh_url(&self) -> Result<Url, Error> {
        self.endpoint(&self.refresh_path)
    }

    pub(crate) fn logout_url(&self) -> Result<Url, Error> {
        self.endpoint(&self.logout_path)
    }
}
