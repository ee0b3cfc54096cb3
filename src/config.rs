// Process-level settings.
// Cache windows, request pacing, and environment overrides for the binary.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::cache::paths;
use crate::error::{ContribError, Result};
use crate::github::client::GITHUB_API_BASE;

/// Courtesy delays between remote calls. Not a rate limiter, just spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Between consecutive search result pages of one year.
    pub page_delay: Duration,
    /// Between year iterations.
    pub year_delay: Duration,
    /// Between consecutive hot-set metadata fetches.
    pub metadata_delay: Duration,
}

impl Pacing {
    /// No delays at all (tests).
    pub const fn none() -> Self {
        Self {
            page_delay: Duration::ZERO,
            year_delay: Duration::ZERO,
            metadata_delay: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(250),
            year_delay: Duration::from_millis(500),
            metadata_delay: Duration::from_millis(100),
        }
    }
}

/// Engine settings shared by every request.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Identity used when a request names none. `None` falls back to the viewer.
    pub default_identity: Option<String>,
    /// Durable snapshot file. `None` disables the durable tier.
    pub cache_file: Option<PathBuf>,
    pub api_base: String,
    /// Memory entries younger than this are served as fresh.
    pub fresh_for: Duration,
    /// Memory entries older than this are not served at all.
    pub stale_for: Duration,
    /// Durable snapshots older than this are only a metadata fallback.
    pub durable_ttl: Duration,
    pub pacing: Pacing,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_identity: None,
            cache_file: paths::snapshot_path(),
            api_base: GITHUB_API_BASE.to_string(),
            fresh_for: Duration::from_secs(60),
            stale_for: Duration::from_secs(24 * 60 * 60),
            durable_ttl: Duration::from_secs(24 * 60 * 60),
            pacing: Pacing::default(),
        }
    }
}

/// The `CONTRIBS_*` environment layer. Unset or blank fields keep the defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Overrides {
    user: Option<String>,
    cache_file: Option<PathBuf>,
    api_base: Option<String>,
}

impl Settings {
    /// Defaults overridden by `CONTRIBS_USER`, `CONTRIBS_CACHE_FILE` and
    /// `CONTRIBS_API_BASE`.
    pub fn from_env() -> Result<Self> {
        let overrides: Overrides = Figment::new()
            .merge(Serialized::defaults(Overrides::default()))
            .merge(Env::prefixed("CONTRIBS_").only(&["user", "cache_file", "api_base"]))
            .extract()
            .map_err(|e| ContribError::Config(e.to_string()))?;

        Ok(Self::default().with_overrides(overrides))
    }

    fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(user) = overrides.user.filter(|v| !v.trim().is_empty()) {
            self.default_identity = Some(user);
        }
        if let Some(file) = overrides.cache_file.filter(|p| !p.as_os_str().is_empty()) {
            self.cache_file = Some(file);
        }
        if let Some(base) = overrides.api_base.filter(|v| !v.trim().is_empty()) {
            self.api_base = base;
        }
        self
    }
}

/// Sleep for `delay`, skipping the timer entirely when it is zero.
pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
