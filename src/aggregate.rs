// Pull-request aggregation.
// Walks search results year by year and folds them into per-repository rollups.

use tracing::{debug, info, instrument, warn};

use crate::config::{Pacing, pause};
use crate::error::Result;
use crate::github::RemoteSource;
use crate::rollup::{RepositoryRollup, RollupSet};

/// Oldest year searched.
pub const START_YEAR: i32 = 2015;

/// Search results requested per page.
pub const PAGE_SIZE: u32 = 100;

/// The search API serves at most this many results for one query.
pub const MAX_SEARCH_RESULTS: u32 = 1000;

/// Collects every pull request an identity authored into rollups.
pub struct Aggregator<'a> {
    source: &'a dyn RemoteSource,
    pacing: Pacing,
}

impl<'a> Aggregator<'a> {
    pub fn new(source: &'a dyn RemoteSource, pacing: Pacing) -> Self {
        Self { source, pacing }
    }

    /// Search from `current_year` back to the start year, inclusive.
    ///
    /// Any failed page aborts the whole run; no partial result is returned.
    #[instrument(skip(self))]
    pub async fn aggregate(
        &self,
        identity: &str,
        current_year: i32,
    ) -> Result<Vec<RepositoryRollup>> {
        let mut set = RollupSet::new(identity);
        let mut records = 0usize;
        let mut skipped = 0usize;

        for year in (START_YEAR..=current_year).rev() {
            if year != current_year {
                pause(self.pacing.year_delay).await;
            }

            let mut page = 1;
            loop {
                let items = self
                    .source
                    .search_pull_requests(identity, year, page, PAGE_SIZE)
                    .await
                    .inspect_err(|e| warn!(year, page, error = %e, "PR search failed, aborting"))?;

                for item in &items {
                    match set.fold(item) {
                        Ok(()) => records += 1,
                        Err(e) => {
                            skipped += 1;
                            debug!(error = %e, "skipping PR record");
                        }
                    }
                }

                let exhausted = items.len() < PAGE_SIZE as usize;
                if exhausted || page * PAGE_SIZE >= MAX_SEARCH_RESULTS {
                    break;
                }
                page += 1;
                pause(self.pacing.page_delay).await;
            }
        }

        let rollups = set.into_vec();
        info!(
            repos = rollups.len(),
            records, skipped, "aggregated pull requests"
        );
        Ok(rollups)
    }
}
