//! Dashboard statistics over intervention records.
//!
//! [`compute_stats`] is a pure function: it re-derives everything from the
//! records it is given and never fails. Missing or malformed fields count as
//! zero, empty or `Other`.
//!
//! The statistics are only meaningful over the complete filtered set. When a
//! listing is paginated and the backend reports more rows than one page
//! holds, fetch the unpaginated set first
//! (see `InterventionsClient::dashboard_stats`).

mod record;
pub mod rules;

use std::collections::HashMap;

use serde::{Serialize, Serializer};

pub use record::InterventionRecord;
use rules::{HIDDEN_TOP_TYPES, Outcome, PINNED_TOP_TYPE};

const TOP_N: usize = 3;

/// Aggregated figures for one filtered set of interventions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionStats {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    /// Mean duration of finished interventions, in minutes.
    pub avg_duration: u64,
    /// `round(success / (success + failure) * 100)`, 0 when nothing finished.
    pub success_rate: u8,
    pub top_technicians: Vec<TechnicianRank>,
    pub top_types: Vec<LabelCount>,
    pub top_statuses: Vec<LabelCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianRank {
    pub name: String,
    pub success: u64,
    pub failure: u64,
    /// Success:failure ratio; infinite when a technician has successes and no failure.
    /// Serialized as the string `"Infinity"` in that case, since JSON has no infinite number.
    #[serde(serialize_with = "serialize_ratio")]
    pub ratio: f64,
}

fn serialize_ratio<S: Serializer>(ratio: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if ratio.is_finite() {
        serializer.serialize_f64(*ratio)
    } else {
        serializer.serialize_str("Infinity")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// Counters keyed by label, remembering first-encounter order.
struct Tally<T> {
    entries: Vec<(String, T)>,
    index: HashMap<String, usize>,
}

impl<T: Default> Tally<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn entry(&mut self, key: &str) -> &mut T {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.entries.push((key.to_owned(), T::default()));
                self.index.insert(key.to_owned(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[slot].1
    }
}

impl Tally<u64> {
    /// Highest counts first; equal counts keep encounter order.
    fn ranked(mut self) -> Vec<LabelCount> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries
            .into_iter()
            .map(|(label, count)| LabelCount { label, count })
            .collect()
    }
}

#[derive(Default)]
struct Outcomes {
    success: u64,
    failure: u64,
}

impl Outcomes {
    fn ratio(&self) -> f64 {
        match (self.success, self.failure) {
            (0, 0) => 0.0,
            (_, 0) => f64::INFINITY,
            (s, f) => s as f64 / f as f64,
        }
    }
}

/// Derive dashboard statistics from `records`.
///
/// `known_total` is the backend's count for the filtered set; `total` is the
/// larger of it and `records.len()`.
#[must_use]
pub fn compute_stats(
    records: &[InterventionRecord],
    known_total: Option<u64>,
) -> InterventionStats {
    let mut success = 0u64;
    let mut failure = 0u64;
    let mut durations: Vec<i64> = Vec::new();
    let mut technicians: Tally<Outcomes> = Tally::new();
    let mut types: Tally<u64> = Tally::new();
    let mut statuses: Tally<u64> = Tally::new();

    for record in records {
        let status = record.statut.as_deref().unwrap_or_default();
        let outcome = rules::classify_status(status);

        let tech = record.technician();
        let tech_counts = match tech.as_deref() {
            Some(name) => Some(technicians.entry(name)),
            None => None,
        };
        match outcome {
            Outcome::Success => {
                success += 1;
                if let Some(counts) = tech_counts {
                    counts.success += 1;
                }
            }
            Outcome::Failure => {
                failure += 1;
                if let Some(counts) = tech_counts {
                    counts.failure += 1;
                }
            }
            Outcome::Undetermined => {}
        }

        if rules::counts_for_duration(status) {
            if let Some(minutes) = record.duration_minutes().filter(|m| *m > 0) {
                durations.push(minutes);
            }
        }

        let kind = rules::canonical_type(
            record.kind.as_deref(),
            record.statut.as_deref(),
            record.articles_raw.as_deref(),
        );
        *types.entry(&kind) += 1;

        let status = status.trim();
        if !status.is_empty() {
            *statuses.entry(status) += 1;
        }
    }

    let record_count = records.len() as u64;

    InterventionStats {
        total: known_total.map_or(record_count, |t| t.max(record_count)),
        success,
        failure,
        avg_duration: average_minutes(&durations),
        success_rate: success_rate(success, failure),
        top_technicians: top_technicians(technicians),
        top_types: top_types(types),
        top_statuses: statuses.ranked().into_iter().take(TOP_N).collect(),
    }
}

/// `round(success / (success + failure) * 100)`, 0 when the denominator is 0.
#[must_use]
pub fn success_rate(success: u64, failure: u64) -> u8 {
    let finished = success + failure;
    if finished == 0 {
        return 0;
    }
    ((success as f64 / finished as f64) * 100.0).round() as u8
}

fn average_minutes(durations: &[i64]) -> u64 {
    if durations.is_empty() {
        return 0;
    }
    let sum: i64 = durations.iter().sum();
    (sum as f64 / durations.len() as f64).round() as u64
}

fn top_technicians(tally: Tally<Outcomes>) -> Vec<TechnicianRank> {
    let mut ranks: Vec<TechnicianRank> = tally
        .entries
        .into_iter()
        .map(|(name, counts)| TechnicianRank {
            ratio: counts.ratio(),
            name,
            success: counts.success,
            failure: counts.failure,
        })
        .collect();
    ranks.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
    ranks.truncate(TOP_N);
    ranks
}

fn top_types(tally: Tally<u64>) -> Vec<LabelCount> {
    let ranked = tally.ranked();
    let pinned_count = ranked
        .iter()
        .find(|entry| entry.label == PINNED_TOP_TYPE)
        .map_or(0, |entry| entry.count);

    let mut top: Vec<LabelCount> = ranked
        .into_iter()
        .filter(|entry| !HIDDEN_TOP_TYPES.contains(&entry.label.as_str()))
        .take(TOP_N)
        .collect();

    if !top.iter().any(|entry| entry.label == PINNED_TOP_TYPE) {
        top.push(LabelCount {
            label: PINNED_TOP_TYPE.to_owned(),
            count: pinned_count,
        });
    }
    top
}
