// contribs library root.
// Aggregates a user's pull requests into cached, projected per-repository rollups.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod github;
pub mod projection;
pub mod rollup;

pub use config::{Pacing, Settings};
pub use engine::{CacheStatus, Engine, RepositoriesResponse};
pub use error::{ContribError, Result};
pub use projection::{QueryConfiguration, Scope, SortBy};
pub use rollup::RepositoryRollup;
