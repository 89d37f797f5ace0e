//! Typed access to the `/interventions` endpoints.
//!
//! Every call goes through [`AuthorizedClient`], so an expired access token
//! is refreshed and the call retried transparently.

use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::pipeline::{AuthorizedClient, ensure_success};
use crate::session::SessionManager;
use crate::stats::{self, InterventionRecord, InterventionStats};

const SUMMARY_PATH: &str = "/interventions/summary";
const FILTERS_PATH: &str = "/interventions/filters";
const IMPORT_PATH: &str = "/interventions/import";

/// Filters for the intervention summary. Unset fields are omitted from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl SummaryQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_period(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_date = Some(from.into());
        self.to_date = Some(to.into());
        self
    }

    #[must_use]
    pub fn with_technician(mut self, technician: impl Into<String>) -> Self {
        self.technician = Some(technician.into());
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: u32, limit: u32) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    /// Same filters, no pagination.
    #[must_use]
    pub fn unpaginated(&self) -> Self {
        Self {
            page: None,
            limit: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self, operation: &'static str) -> Result<T, Error> {
        if !self.success {
            return Err(Error::Api {
                operation,
                message: self.message.unwrap_or_default(),
            });
        }
        self.data.ok_or_else(|| Error::InvalidResponse {
            operation,
            detail: "missing `data`".into(),
        })
    }
}

/// One page of the summary listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SummaryPage {
    #[serde(default)]
    pub items: Vec<InterventionRecord>,
    #[serde(default)]
    pub totals: SummaryTotals,
}

/// Backend aggregates for the filtered set; `total` counts every matching row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SummaryTotals {
    #[serde(default)]
    pub total: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// Values offered by the dashboard filter dropdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FilterOptions {
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub technicians: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

/// Result of a spreadsheet import.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct ImportOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Intervention data service.
#[derive(Clone)]
pub struct InterventionsClient {
    api: AuthorizedClient,
}

impl InterventionsClient {
    #[must_use]
    pub fn new(session: SessionManager) -> Self {
        Self {
            api: AuthorizedClient::new(session),
        }
    }

    #[must_use]
    pub fn from_authorized(api: AuthorizedClient) -> Self {
        Self { api }
    }

    #[must_use]
    pub fn authorized(&self) -> &AuthorizedClient {
        &self.api
    }

    /// Fetch the summary listing for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] when the backend reports `success: false`,
    /// [`Error::Http`] / [`Error::AuthorizationFailure`] on a failure status,
    /// or the refresh error when the session could not be renewed.
    pub async fn summary(&self, query: &SummaryQuery) -> Result<SummaryPage, Error> {
        let url = self.api.session().config().endpoint(SUMMARY_PATH)?;
        let response = self.api.send(|http| http.get(url.clone()).query(query)).await?;
        read_envelope(response, "intervention summary").await
    }

    /// Fetch the filter dropdown values.
    ///
    /// # Errors
    ///
    /// Same as [`summary`](Self::summary).
    pub async fn filters(&self) -> Result<FilterOptions, Error> {
        let url = self.api.session().config().endpoint(FILTERS_PATH)?;
        let response = self.api.send(|http| http.get(url.clone())).await?;
        read_envelope(response, "intervention filters").await
    }

    /// Upload a spreadsheet of interventions as multipart field `file`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] when the backend rejects the file, otherwise as
    /// [`summary`](Self::summary).
    pub async fn import(&self, file_name: &str, bytes: Vec<u8>) -> Result<ImportOutcome, Error> {
        let url = self.api.session().config().endpoint(IMPORT_PATH)?;
        let file_name = file_name.to_owned();
        let response = self
            .api
            .send(|http| {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                http.post(url.clone()).multipart(Form::new().part("file", part))
            })
            .await?;

        let response = ensure_success(response, "intervention import").await?;
        let outcome: ImportOutcome = response.json().await.map_err(|e| Error::InvalidResponse {
            operation: "intervention import",
            detail: e.to_string(),
        })?;
        if !outcome.success {
            return Err(Error::Api {
                operation: "intervention import",
                message: outcome.message.unwrap_or_default(),
            });
        }
        tracing::info!(file = %file_name, "Interventions imported");
        Ok(outcome)
    }

    /// Dashboard statistics for the filtered set.
    ///
    /// Reads the first page; when the backend reports more rows than a page
    /// holds, refetches the whole filtered set once so the figures cover
    /// every matching intervention.
    ///
    /// # Errors
    ///
    /// Same as [`summary`](Self::summary).
    pub async fn dashboard_stats(&self, query: &SummaryQuery) -> Result<InterventionStats, Error> {
        let page_size = self.api.session().config().page_size();
        let first = self.summary(&query.unpaginated().with_page(1, page_size)).await?;

        let page = if first.totals.total > u64::from(page_size) {
            tracing::debug!(
                total = first.totals.total,
                page_size,
                "Filtered set exceeds one page; fetching all rows for statistics"
            );
            self.summary(&query.unpaginated()).await?
        } else {
            first
        };

        Ok(stats::compute_stats(&page.items, Some(page.totals.total)))
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: Response,
    operation: &'static str,
) -> Result<T, Error> {
    let response = ensure_success(response, operation).await?;
    let envelope: ApiEnvelope<T> = response.json().await.map_err(|e| Error::InvalidResponse {
        operation,
        detail: e.to_string(),
    })?;
    envelope.into_data(operation)
}
