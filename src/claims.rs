//! Access-token claims, read without signature verification.
//!
//! The backend is the only verifier of its tokens. The client only peeks at
//! the payload to learn who is signed in and when the token runs out.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::error::Error;
use crate::types::{Role, UserId};

/// Decoded (unverified) token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    inner: JsonValue,
}

impl Claims {
    /// Gets a claim value by key.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    /// Gets the inner JSON value.
    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.inner
    }

    /// `sub` claim, accepting numeric or string subjects.
    #[must_use]
    pub fn subject(&self) -> Option<UserId> {
        match self.inner.get("sub")? {
            JsonValue::String(s) if !s.is_empty() => Some(UserId(s.clone())),
            JsonValue::Number(n) => Some(UserId(n.to_string())),
            _ => None,
        }
    }

    /// Role claim. The first entry of a `roles` list wins over a scalar `role`.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        let from_list = self
            .inner
            .get("roles")
            .and_then(JsonValue::as_array)
            .and_then(|roles| roles.first())
            .and_then(JsonValue::as_str);
        let scalar = self.inner.get("role").and_then(JsonValue::as_str);

        from_list
            .or(scalar)
            .filter(|r| !r.is_empty())
            .map(|r| Role(r.to_owned()))
    }

    /// `exp` claim in Unix seconds, if present and numeric.
    #[must_use]
    pub fn expires_at(&self) -> Option<f64> {
        match self.inner.get("exp")? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `exp` as a timestamp.
    #[must_use]
    pub fn expiry(&self) -> Option<OffsetDateTime> {
        let exp = self.expires_at()?;
        if !exp.is_finite() {
            return None;
        }
        OffsetDateTime::from_unix_timestamp(exp.floor() as i64).ok()
    }
}

/// Decodes the payload segment of a `header.payload.signature` token.
///
/// Malformed input is logged and reported as `None`; this function never fails.
#[must_use]
pub fn decode_claims(token: &str) -> Option<Claims> {
    match try_decode_claims(token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::warn!(error = %e, "Could not decode access token claims");
            None
        }
    }
}

fn try_decode_claims(token: &str) -> Result<Claims, Error> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| Error::MalformedToken("missing payload segment".into()))?;

    let bytes = decode_segment(payload)?;
    let inner: JsonValue = serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not JSON: {e}")))?;

    if !inner.is_object() {
        return Err(Error::MalformedToken("payload is not a JSON object".into()));
    }
    Ok(Claims { inner })
}

/// Base64url decoding with the `=` padding restored.
fn decode_segment(segment: &str) -> Result<Vec<u8>, Error> {
    let mut padded = segment.trim_end_matches('=').to_owned();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    URL_SAFE
        .decode(padded)
        .map_err(|e| Error::MalformedToken(format!("invalid base64url: {e}")))
}

/// Whether the token is expired at the current time.
///
/// Undecodable tokens count as expired. A token without `exp` never expires.
#[must_use]
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, OffsetDateTime::now_utc())
}

/// Same as [`is_token_expired`] with an explicit clock.
#[must_use]
pub fn is_token_expired_at(token: &str, now: OffsetDateTime) -> bool {
    let Some(claims) = decode_claims(token) else {
        return true;
    };
    match claims.expires_at() {
        Some(exp) => now.unix_timestamp() as f64 >= exp,
        None => false,
    }
}

#[cfg(test)]
pub(crate) fn unsigned_token(payload: &JsonValue) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}
