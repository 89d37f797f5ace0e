#[cfg(feature = "client")]
use std::sync::Arc;

/// Errors surfaced by the session, the authorized pipeline and the data service.
///
/// `Clone` so that one refresh outcome can be handed to every caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The backend answered but omitted a required field.
    #[error("Invalid response from {operation}: {detail}")]
    InvalidResponse {
        operation: &'static str,
        detail: String,
    },

    /// Refresh attempted with no stored refresh credential.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// 401 from an endpoint other than the refresh endpoint.
    #[error("Authorization failure during {operation}: {detail}")]
    AuthorizationFailure {
        operation: &'static str,
        detail: String,
    },

    /// The in-flight refresh ended without a result (task aborted or session ended meanwhile).
    #[error("Token refresh aborted: {0}")]
    RefreshAborted(String),

    /// Token claims could not be decoded. Never escapes [`crate::claims::decode_claims`].
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Non-success HTTP status other than 401.
    #[error("HTTP {status} during {operation}: {detail}")]
    Http {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    /// The backend replied with `success: false`.
    #[error("API error during {operation}: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[cfg(feature = "client")]
    #[error("Network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(Arc::new(e))
    }
}

impl Error {
    /// Whether this error is a 401 that was not recovered.
    #[must_use]
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, Self::AuthorizationFailure { .. })
    }
}
