use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Intervention row as returned by `/interventions/summary`.
///
/// Only the fields the statistics read are typed; the rest of the row is kept
/// in `extra`. Scalars of the wrong JSON type are read as text rather than
/// failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InterventionRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub statut: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub articles_raw: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub debut: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub debut_intervention: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cloture_hotline: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cloture_tech: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub tech_first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub tech_last_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Some(s),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

impl InterventionRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.statut = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn with_articles(mut self, articles: impl Into<String>) -> Self {
        self.articles_raw = Some(articles.into());
        self
    }

    /// Sets `debut` (the fallback start timestamp).
    #[must_use]
    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.debut = Some(start.into());
        self
    }

    /// Sets `clotureTech` (the fallback end timestamp).
    #[must_use]
    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.cloture_tech = Some(end.into());
        self
    }

    #[must_use]
    pub fn with_technician(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.tech_first_name = Some(first.into());
        self.tech_last_name = Some(last.into());
        self
    }

    /// `debutIntervention`, falling back to `debut`.
    #[must_use]
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        first_timestamp(&[&self.debut_intervention, &self.debut])
    }

    /// `clotureHotline`, falling back to `clotureTech`.
    #[must_use]
    pub fn ended_at(&self) -> Option<OffsetDateTime> {
        first_timestamp(&[&self.cloture_hotline, &self.cloture_tech])
    }

    /// `first last`, or `None` when both names are blank.
    #[must_use]
    pub fn technician(&self) -> Option<String> {
        let name = [&self.tech_first_name, &self.tech_last_name]
            .into_iter()
            .filter_map(|part| part.as_deref().map(str::trim))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }

    /// Duration in whole minutes (rounded), if both ends parse.
    #[must_use]
    pub fn duration_minutes(&self) -> Option<i64> {
        let elapsed = self.ended_at()? - self.started_at()?;
        let minutes = (elapsed.as_seconds_f64() / 60.0).round();
        minutes.is_finite().then_some(minutes as i64)
    }
}

// A blank primary field falls through to the fallback, like an absent one.
fn first_timestamp(candidates: &[&Option<String>]) -> Option<OffsetDateTime> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref().map(str::trim))
        .find(|c| !c.is_empty())
        .and_then(parse_timestamp)
}

/// RFC 3339, or a naive `YYYY-MM-DD[T ]HH:MM[:SS[.fff]]` / `DD/MM/YYYY HH:MM[:SS]` read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }

    let naive = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!("[day]/[month]/[year] [hour]:[minute]:[second]"),
        format_description!("[day]/[month]/[year] [hour]:[minute]"),
    ];
    naive
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(raw, format).ok())
        .map(PrimitiveDateTime::assume_utc)
}
