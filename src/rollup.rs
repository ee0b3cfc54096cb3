// Per-repository rollup of pull-request activity.
// Parses repository references and folds PR records into deduplicated rows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ContribError, Result};
use crate::github::{RepoMetadata, SearchItem};

/// One row per repository the queried identity has opened pull requests against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRollup {
    /// `owner/name`, unique within a rollup set.
    pub full_name: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub star_count: u64,
    pub pull_request_count: u64,
    pub is_owned_by_queried_user: bool,
    #[serde(default)]
    pub is_private: bool,
    /// ISO-8601; compared as a string, which matches chronological order.
    pub last_contribution_timestamp: String,
}

impl RepositoryRollup {
    /// Start a rollup from the first PR record seen for `full_name`.
    pub fn new(full_name: &str, identity: &str, created_at: &str) -> Self {
        let name = full_name
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(full_name);

        Self {
            full_name: full_name.to_string(),
            name: name.to_string(),
            url: format!("https://github.com/{}", full_name),
            star_count: 0,
            pull_request_count: 1,
            is_owned_by_queried_user: is_owned_by(full_name, identity),
            is_private: false,
            last_contribution_timestamp: created_at.to_string(),
        }
    }

    /// Count one more PR record against this repository.
    pub fn record(&mut self, created_at: &str) {
        self.pull_request_count += 1;
        if created_at > self.last_contribution_timestamp.as_str() {
            self.last_contribution_timestamp = created_at.to_string();
        }
    }

    pub fn apply_metadata(&mut self, metadata: RepoMetadata) {
        self.star_count = metadata.stargazers_count;
        self.is_private = metadata.private;
    }

    /// Copy previously known star count and visibility from another rollup.
    pub fn copy_metadata_from(&mut self, known: &RepositoryRollup) {
        self.star_count = known.star_count;
        self.is_private = known.is_private;
    }

    pub fn clear_metadata(&mut self) {
        self.star_count = 0;
        self.is_private = false;
    }
}

/// Prefix match against `{identity}/`. Case-sensitive, and an organization
/// repository whose owner equals the login also counts as owned.
pub fn is_owned_by(full_name: &str, identity: &str) -> bool {
    !identity.is_empty()
        && full_name.len() > identity.len()
        && full_name.starts_with(identity)
        && full_name.as_bytes()[identity.len()] == b'/'
}

/// Extract `owner/name` from a repository API URL.
///
/// The last two `/`-delimited segments are taken as owner and name; they must
/// both be non-empty and follow a `repos` segment.
pub fn parse_repository_url(url: &str) -> Result<String> {
    let segments: Vec<&str> = url.split('/').collect();
    match segments.as_slice() {
        [.., "repos", owner, name] if !owner.is_empty() && !name.is_empty() => {
            Ok(format!("{}/{}", owner, name))
        }
        _ => Err(ContribError::MalformedReference(url.to_string())),
    }
}

/// Deduplicating accumulator keyed by `full_name`, preserving first-seen order.
#[derive(Debug, Default)]
pub struct RollupSet {
    identity: String,
    rollups: Vec<RepositoryRollup>,
    index: HashMap<String, usize>,
}

impl RollupSet {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            ..Self::default()
        }
    }

    /// Fold a search hit in. Malformed references are rejected and leave the
    /// set untouched.
    pub fn fold(&mut self, item: &SearchItem) -> Result<()> {
        let full_name = parse_repository_url(item.repository_url.as_deref().unwrap_or_default())?;
        let created_at = item.created_at.as_deref().unwrap_or_default();

        match self.index.get(&full_name) {
            Some(&i) => self.rollups[i].record(created_at),
            None => {
                let rollup = RepositoryRollup::new(&full_name, &self.identity, created_at);
                self.index.insert(full_name, self.rollups.len());
                self.rollups.push(rollup);
            }
        }
        Ok(())
    }

    pub fn get(&self, full_name: &str) -> Option<&RepositoryRollup> {
        self.index.get(full_name).map(|&i| &self.rollups[i])
    }

    pub fn into_vec(self) -> Vec<RepositoryRollup> {
        self.rollups
    }
}
