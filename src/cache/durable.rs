// Durable snapshot tier.
// One JSON file holding the last full aggregation, surviving process restarts.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rollup::RepositoryRollup;

use super::store::{read_json, write_json};

/// Last full aggregation for one identity.
///
/// An empty `fetched_at` marks a snapshot that was never populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableSnapshot {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub rollups: BTreeMap<String, RepositoryRollup>,
    #[serde(default)]
    pub fetched_at: String,
}

impl DurableSnapshot {
    pub fn new(identity: &str, rollups: &[RepositoryRollup]) -> Self {
        Self {
            identity: identity.to_string(),
            rollups: rollups
                .iter()
                .map(|r| (r.full_name.clone(), r.clone()))
                .collect(),
            fetched_at: String::new(),
        }
    }

    pub fn is_for(&self, identity: &str) -> bool {
        !self.identity.is_empty() && self.identity == identity
    }

    /// Time since `fetched_at`; `None` when empty or unparseable.
    pub fn age(&self) -> Option<Duration> {
        let fetched_at = DateTime::parse_from_rfc3339(&self.fetched_at).ok()?;
        Some(
            Utc::now()
                .signed_duration_since(fetched_at)
                .to_std()
                .unwrap_or(Duration::MAX),
        )
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age().is_none_or(|age| age > ttl)
    }

    pub fn get(&self, full_name: &str) -> Option<&RepositoryRollup> {
        self.rollups.get(full_name)
    }

    pub fn to_rollups(&self) -> Vec<RepositoryRollup> {
        self.rollups.values().cloned().collect()
    }

    /// Stamp the snapshot with the current time.
    pub fn touch(&mut self) {
        self.fetched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    }
}

/// Best-effort file-backed store for a [`DurableSnapshot`].
///
/// Reads never fail and writes never report errors; both degrade to a log line.
#[derive(Debug, Clone)]
pub struct DurableCache {
    path: Option<PathBuf>,
}

impl DurableCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// A cache that never persists and always loads empty.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Load the snapshot, or an empty one on any read or parse failure.
    pub async fn load(&self) -> DurableSnapshot {
        let Some(path) = self.path.clone() else {
            return DurableSnapshot::default();
        };

        let result = tokio::task::spawn_blocking(move || read_json::<DurableSnapshot>(&path)).await;
        match result {
            Ok(Ok(Some(snapshot))) => {
                debug!(identity = %snapshot.identity, repos = snapshot.rollups.len(), "durable snapshot loaded");
                snapshot
            }
            Ok(Ok(None)) => DurableSnapshot::default(),
            Ok(Err(e)) => {
                warn!(error = %e, "durable snapshot unreadable, starting empty");
                DurableSnapshot::default()
            }
            Err(e) => {
                warn!(error = %e, "durable snapshot load task failed");
                DurableSnapshot::default()
            }
        }
    }

    /// Stamp `fetched_at` and persist. Failures are logged and dropped.
    pub async fn save(&self, snapshot: &mut DurableSnapshot) {
        snapshot.touch();

        let Some(path) = self.path.clone() else {
            return;
        };
        let data = snapshot.clone();

        let result = tokio::task::spawn_blocking(move || write_json(&path, &data)).await;
        match result {
            Ok(Ok(())) => {
                debug!(identity = %snapshot.identity, repos = snapshot.rollups.len(), "durable snapshot saved");
            }
            Ok(Err(e)) => warn!(error = %e, "failed to persist durable snapshot"),
            Err(e) => warn!(error = %e, "durable snapshot save task failed"),
        }
    }
}
