// Read-side projection.
// Filters, sorts and truncates rollups according to a per-request query.

use std::cmp::Reverse;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::enrich::DEFAULT_ENRICHMENT_BUDGET;
use crate::rollup::RepositoryRollup;

/// Which repositories to keep by ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Own,
    External,
    #[default]
    All,
}

/// Ordering applied after filtering. Every order is descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Stars,
    Contributions,
    /// `stars × pull_requests²`
    #[default]
    All,
    Recent,
}

/// Per-request view configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryConfiguration {
    pub scope: Scope,
    pub sort_by: SortBy,
    pub include_private: bool,
    /// 0 means unbounded.
    pub limit: usize,
    pub include: HashSet<String>,
    pub exclude: HashSet<String>,
    /// Overrides the configured identity.
    pub identity: Option<String>,
    pub enrichment_budget: usize,
}

impl Default for QueryConfiguration {
    fn default() -> Self {
        Self {
            scope: Scope::default(),
            sort_by: SortBy::default(),
            include_private: false,
            limit: 0,
            include: HashSet::new(),
            exclude: HashSet::new(),
            identity: None,
            enrichment_budget: DEFAULT_ENRICHMENT_BUDGET,
        }
    }
}

impl QueryConfiguration {
    /// Whether `rollup` survives filtering. Exclusion beats inclusion, and
    /// inclusion beats the scope and visibility rules.
    pub fn keeps(&self, rollup: &RepositoryRollup) -> bool {
        if self.exclude.contains(&rollup.full_name) {
            return false;
        }
        if self.include.contains(&rollup.full_name) {
            return true;
        }

        let in_scope = match self.scope {
            Scope::Own => rollup.is_owned_by_queried_user,
            Scope::External => !rollup.is_owned_by_queried_user,
            Scope::All => true,
        };
        in_scope && (self.include_private || !rollup.is_private)
    }
}

/// Combined ranking score; repeated contribution outweighs popularity.
pub fn combined_score(rollup: &RepositoryRollup) -> u128 {
    let prs = u128::from(rollup.pull_request_count);
    u128::from(rollup.star_count).saturating_mul(prs * prs)
}

/// Filter, then sort, then truncate. Pure.
///
/// Filtering runs over the full rollup set, so an included repository is
/// always present unless it is also excluded or was never aggregated.
pub fn project(rollups: &[RepositoryRollup], config: &QueryConfiguration) -> Vec<RepositoryRollup> {
    let mut kept: Vec<RepositoryRollup> = rollups
        .iter()
        .filter(|r| config.keeps(r))
        .cloned()
        .collect();

    sort(&mut kept, config.sort_by);

    if config.limit > 0 {
        kept.truncate(config.limit);
    }
    kept
}

fn sort(rollups: &mut [RepositoryRollup], sort_by: SortBy) {
    match sort_by {
        SortBy::Stars => rollups.sort_by_key(|r| Reverse(r.star_count)),
        SortBy::Contributions => rollups.sort_by_key(|r| Reverse(r.pull_request_count)),
        SortBy::All => rollups.sort_by_key(|r| Reverse(combined_score(r))),
        SortBy::Recent => rollups.sort_by(|a, b| {
            b.last_contribution_timestamp
                .cmp(&a.last_contribution_timestamp)
        }),
    }
}
