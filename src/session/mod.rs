//! Client-side session lifecycle for the field-service ERP backend.
//!
//! [`SessionManager`] owns the access and refresh tokens, persists them in a
//! [`KeyValueStore`], derives the signed-in identity from the token claims
//! and coordinates token refresh so that at most one refresh call is ever in
//! flight.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use fieldops_client::session::{ClientConfig, FileStore, SessionManager};
//! use fieldops_client::Credentials;
//!
//! let config = ClientConfig::from_env()?;
//! let session = SessionManager::builder(config, FileStore::new("session.json"))
//!     .with_navigator(MyRouter::default())
//!     .build()?;
//!
//! let identity = session.login(&Credentials::new("ops@example.com", "secret")).await?;
//! assert!(session.is_authenticated());
//! ```

mod config;
mod manager;
mod refresh;
mod state;
mod store;
mod traits;

pub use config::ClientConfig;
pub use manager::{SessionBuilder, SessionManager};
pub use store::{FileStore, MemoryStore};
pub use traits::{KeyValueStore, LoginRedirect, Navigator, NoopNavigator};
