//! Authorized request pipeline.
//!
//! Every outbound request gets the current access token as a bearer
//! credential. A 401 (from anything but the refresh endpoint) triggers one
//! refresh through the session's single-flight coordination and one retry
//! of the original request.

use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::error::Error;
use crate::session::SessionManager;

/// HTTP client that authorizes requests from a [`SessionManager`].
#[derive(Clone)]
pub struct AuthorizedClient {
    session: SessionManager,
    http: Client,
}

impl AuthorizedClient {
    /// Shares the session's HTTP client.
    #[must_use]
    pub fn new(session: SessionManager) -> Self {
        let http = session.http_client().clone();
        Self { session, http }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send an authorized request.
    ///
    /// `build` describes the request and is called again for the retry, so
    /// bodies that cannot be cloned (multipart uploads) still retry correctly.
    /// The returned response may have any status; pass it to
    /// [`ensure_success`] to turn failures into errors. A retried request is
    /// never retried again: its response is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] on transport failure, or the refresh error
    /// when a 401 could not be recovered (the session has then been ended).
    pub async fn send<F>(&self, build: F) -> Result<Response, Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let access_token = self.session.access_token();
        let request = authorize(build(&self.http), access_token.as_deref()).build()?;
        let target = request.url().clone();
        let response = self.http.execute(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if self.session.config().is_refresh_endpoint(&target) {
            tracing::debug!(url = %target, "401 from refresh endpoint; not retrying");
            return Ok(response);
        }

        tracing::debug!(url = %target, "401 received; refreshing access token");
        let token = self.session.refresh().await?;

        let retry = authorize(build(&self.http), Some(&token)).build()?;
        Ok(self.http.execute(retry).await?)
    }
}

fn authorize(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

/// Checks HTTP response status; returns the response on success or an error with details.
///
/// 401 maps to [`Error::AuthorizationFailure`], every other failure to [`Error::Http`].
///
/// # Errors
///
/// See above.
pub async fn ensure_success(
    response: Response,
    operation: &'static str,
) -> Result<Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let detail = response.text().await.unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::AuthorizationFailure { operation, detail });
    }
    Err(Error::Http {
        operation,
        status: status.as_u16(),
        detail,
    })
}
