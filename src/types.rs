use derive_more::{Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize};

/// Backend user identifier.
///
/// The backend emits ids either as JSON numbers or strings; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(s) => Self(s),
            Repr::Number(n) => Self(n.to_string()),
        })
    }
}

/// Role name as issued by the backend (`admin`, `technicien`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Minimal public user profile returned by the auth endpoints.
///
/// Persisted as JSON next to the tokens and used as a fallback when the
/// access token carries no usable claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<UserId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(UserId(id.into()));
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(Role(role.into()));
        self
    }

    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }
}

/// Login payload for `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_device: Option<bool>,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            mfa_code: None,
            remember_device: None,
        }
    }

    #[must_use]
    pub fn with_mfa_code(mut self, code: impl Into<String>) -> Self {
        self.mfa_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_remember_device(mut self, remember: bool) -> Self {
        self.remember_device = Some(remember);
        self
    }
}

/// Body returned by the login and refresh endpoints.
///
/// Every field is optional on the wire; a missing `accessToken` is rejected
/// by the session manager rather than by deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Identity of the signed-in user, derived from the access token claims.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Identity {
    pub subject: Option<UserId>,
    pub role: Option<Role>,
    /// Token expiry; `None` when the token carries no `exp` claim.
    pub expiry: Option<time::OffsetDateTime>,
}
