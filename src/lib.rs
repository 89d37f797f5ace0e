#![doc = include_str!("../README.md")]

pub mod claims;
pub mod error;
#[cfg(feature = "client")]
pub mod interventions;
#[cfg(feature = "client")]
pub mod pipeline;
#[cfg(feature = "client")]
pub mod session;
pub mod stats;
pub mod types;

// Re-exports for convenient access
pub use claims::{Claims, decode_claims, is_token_expired, is_token_expired_at};
pub use error::Error;
#[cfg(feature = "client")]
pub use interventions::{
    FilterOptions, ImportOutcome, InterventionsClient, SummaryPage, SummaryQuery, SummaryTotals,
};
#[cfg(feature = "client")]
pub use pipeline::{AuthorizedClient, ensure_success};
#[cfg(feature = "client")]
pub use session::{
    ClientConfig, FileStore, KeyValueStore, LoginRedirect, MemoryStore, Navigator, NoopNavigator,
    SessionBuilder, SessionManager,
};
pub use stats::{InterventionRecord, InterventionStats, LabelCount, TechnicianRank, compute_stats};
pub use types::{Credentials, Identity, Role, TokenResponse, UserId, UserProfile};
