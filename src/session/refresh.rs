use futures::FutureExt;

use super::manager::{SessionManager, TokenBody};
use crate::error::Error;
use crate::pipeline::ensure_success;
use crate::types::TokenResponse;

impl SessionManager {
    /// Exchange the refresh token for a new access token.
    ///
    /// Single-flight: while one refresh is in flight, every other caller
    /// awaits the same attempt and receives the same token or the same error.
    /// The attempt runs as its own task, so dropping the caller does not
    /// cancel it.
    ///
    /// On failure the session is torn down with a redirect to the login view
    /// before the error reaches any caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshToken`] when no refresh token is stored,
    /// [`Error::InvalidResponse`] if the refresh response has no access token,
    /// or the transport/HTTP error of the refresh call.
    pub async fn refresh(&self) -> Result<String, Error> {
        let Some(refresh_token) = self.refresh_token() else {
            tracing::warn!("Refresh requested without a refresh token; ending session");
            self.logout(true);
            return Err(Error::NoRefreshToken);
        };

        let pending = {
            let mut slot = self.inner.refresh_slot();
            if let Some(pending) = slot.pending.clone() {
                tracing::debug!("Joining in-flight token refresh");
                pending
            } else {
                let epoch = slot.epoch;
                let this = self.clone();
                let task =
                    tokio::spawn(async move { this.run_refresh(refresh_token, epoch).await });

                let pending = async move {
                    task.await
                        .unwrap_or_else(|e| Err(Error::RefreshAborted(e.to_string())))
                }
                .boxed()
                .shared();
                slot.pending = Some(pending.clone());
                pending
            }
        };

        pending.await
    }

    /// Whether a refresh call is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh_slot().pending.is_some()
    }

    async fn run_refresh(self, refresh_token: String, epoch: u64) -> Result<String, Error> {
        tracing::debug!("Refreshing access token");
        let outcome = self.request_refresh(&refresh_token, epoch).await;
        let owned_slot = self.settle_refresh(epoch);

        match outcome {
            Ok(token) => {
                tracing::info!("Access token refreshed");
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; ending session");
                // A logout during the attempt already reset the session.
                if owned_slot {
                    self.logout(true);
                }
                Err(e)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str, epoch: u64) -> Result<String, Error> {
        let url = self.inner.config.refresh_url()?;
        let response = self
            .inner
            .http
            .post(url)
            .json(&TokenBody {
                token: refresh_token,
            })
            .send()
            .await?;

        let response = ensure_success(response, "token refresh")
            .await
            .map_err(|e| match e {
                Error::AuthorizationFailure { operation, detail } => Error::Http {
                    operation,
                    status: 401,
                    detail,
                },
                other => other,
            })?;

        let body: TokenResponse = response.json().await.map_err(|e| Error::InvalidResponse {
            operation: "token refresh",
            detail: e.to_string(),
        })?;

        self.store_tokens(body, "token refresh", Some(epoch))
    }

    /// Empty the slot for the next cycle. Returns whether `epoch` still owned it.
    fn settle_refresh(&self, epoch: u64) -> bool {
        let mut slot = self.inner.refresh_slot();
        if slot.epoch == epoch {
            slot.reset();
            true
        } else {
            false
        }
    }
}
