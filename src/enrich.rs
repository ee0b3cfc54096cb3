// Repository metadata enrichment.
// Live-fetches stars and visibility for the busiest repositories only.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::cache::DurableSnapshot;
use crate::config::pause;
use crate::github::RemoteSource;
use crate::rollup::RepositoryRollup;

/// Repositories live-fetched per aggregation unless a request says otherwise.
pub const DEFAULT_ENRICHMENT_BUDGET: usize = 20;

/// Fills in star count and visibility on freshly aggregated rollups.
pub struct Enricher<'a> {
    source: &'a dyn RemoteSource,
    delay: Duration,
}

impl<'a> Enricher<'a> {
    pub fn new(source: &'a dyn RemoteSource, delay: Duration) -> Self {
        Self { source, delay }
    }

    /// Enrich `rollups` in place.
    ///
    /// The `budget` rollups with the most pull requests (first-seen order on
    /// ties) are always fetched live. A failed fetch, and every rollup outside
    /// that hot set, takes its values from `known` if the repository is there,
    /// else zero stars and public. Nothing here fails the caller.
    #[instrument(skip_all, fields(repos = rollups.len(), budget = budget))]
    pub async fn enrich(
        &self,
        rollups: &mut [RepositoryRollup],
        known: Option<&DurableSnapshot>,
        budget: usize,
    ) {
        let mut ranked: Vec<usize> = (0..rollups.len()).collect();
        ranked.sort_by(|&a, &b| {
            rollups[b]
                .pull_request_count
                .cmp(&rollups[a].pull_request_count)
        });
        let (hot, cold) = ranked.split_at(budget.min(ranked.len()));

        let mut fetched = 0usize;
        let mut failed = 0usize;
        let mut rate_limited = false;

        for (n, &i) in hot.iter().enumerate() {
            if rate_limited {
                apply_known(&mut rollups[i], known);
                continue;
            }
            if n > 0 {
                pause(self.delay).await;
            }

            match self.source.repo_metadata(&rollups[i].full_name).await {
                Ok(metadata) => {
                    rollups[i].apply_metadata(metadata);
                    fetched += 1;
                }
                Err(e) => {
                    warn!(repo = %rollups[i].full_name, error = %e, "metadata fetch failed, using cached values");
                    failed += 1;
                    rate_limited = e.is_rate_limited();
                    apply_known(&mut rollups[i], known);
                }
            }
        }

        for &i in cold {
            apply_known(&mut rollups[i], known);
        }

        info!(fetched, failed, rate_limited, backfilled = cold.len(), "enriched repositories");
    }
}

fn apply_known(rollup: &mut RepositoryRollup, known: Option<&DurableSnapshot>) {
    match known.and_then(|snapshot| snapshot.get(&rollup.full_name)) {
        Some(previous) => rollup.copy_metadata_from(previous),
        None => rollup.clear_metadata(),
    }
}
