// Aggregation engine.
// Serves projected rollups from the cache tiers and refreshes them on demand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Datelike, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::cache::{CacheRead, CachedRollups, DurableCache, DurableSnapshot, MemoryCache};
use crate::config::Settings;
use crate::enrich::Enricher;
use crate::error::Result;
use crate::github::RemoteSource;
use crate::projection::{QueryConfiguration, project};
use crate::rollup::RepositoryRollup;

/// Where the served rollups came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub from_cache: bool,
    pub is_stale: bool,
    pub age_ms: u64,
}

impl CacheStatus {
    fn live() -> Self {
        Self {
            from_cache: false,
            is_stale: false,
            age_ms: 0,
        }
    }
}

impl From<&CachedRollups> for CacheStatus {
    fn from(cached: &CachedRollups) -> Self {
        Self {
            from_cache: true,
            is_stale: cached.is_stale,
            age_ms: cached.age_ms(),
        }
    }
}

/// Result of one read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoriesResponse {
    pub repositories: Vec<RepositoryRollup>,
    pub cache_status: CacheStatus,
    pub identity: String,
}

enum Served {
    Refreshed(Arc<[RepositoryRollup]>),
    Cached(CachedRollups),
}

/// Entry point for reads. Cheap to clone; clones share every cache.
#[derive(Clone)]
pub struct Engine {
    source: Arc<dyn RemoteSource>,
    settings: Arc<Settings>,
    durable: DurableCache,
    memory: Arc<MemoryCache>,
    refresh_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    viewer: Arc<OnceCell<String>>,
}

impl Engine {
    pub fn new(source: Arc<dyn RemoteSource>, settings: Settings) -> Self {
        let durable = settings
            .cache_file
            .clone()
            .map(DurableCache::new)
            .unwrap_or_else(DurableCache::disabled);
        let memory = Arc::new(MemoryCache::new(settings.fresh_for, settings.stale_for));

        Self {
            source,
            settings: Arc::new(settings),
            durable,
            memory,
            refresh_locks: Arc::new(Mutex::new(HashMap::new())),
            viewer: Arc::new(OnceCell::new()),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryCache> {
        &self.memory
    }

    /// Resolve the identity, serve from cache when possible, and project.
    ///
    /// Fresh and stale hits return immediately; a stale hit also starts a
    /// background revalidation unless one is already running for the identity.
    /// A miss refreshes synchronously and its errors reach the caller.
    pub async fn get_repositories(
        &self,
        config: &QueryConfiguration,
    ) -> Result<RepositoriesResponse> {
        let identity = self.resolve_identity(config).await?;

        let served = match self.memory.read(&identity) {
            CacheRead::Hit(cached) => Served::Cached(cached),
            CacheRead::Miss => self.load(&identity, config.enrichment_budget).await?,
        };

        let (rollups, cache_status) = match served {
            Served::Refreshed(data) => (data, CacheStatus::live()),
            Served::Cached(cached) => {
                if cached.is_stale {
                    self.schedule_revalidation(&identity, config.enrichment_budget);
                }
                let status = CacheStatus::from(&cached);
                (cached.data, status)
            }
        };

        debug!(
            identity = %identity,
            from_cache = cache_status.from_cache,
            is_stale = cache_status.is_stale,
            "serving repositories"
        );
        Ok(RepositoriesResponse {
            repositories: project(&rollups, config),
            cache_status,
            identity,
        })
    }

    /// Request override, then configured default, then the token's own login.
    async fn resolve_identity(&self, config: &QueryConfiguration) -> Result<String> {
        let requested = [
            config.identity.as_deref(),
            self.settings.default_identity.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|id| !id.is_empty());
        if let Some(identity) = requested {
            return Ok(identity.to_string());
        }

        let login = self
            .viewer
            .get_or_try_init(|| self.source.viewer_login())
            .await?;
        Ok(login.clone())
    }

    /// Memory miss: reuse a valid durable snapshot, otherwise aggregate.
    async fn load(&self, identity: &str, budget: usize) -> Result<Served> {
        let lock = self.refresh_lock(identity);
        let _held = lock.lock().await;

        // Another request may have refreshed while this one waited
        if let CacheRead::Hit(cached) = self.memory.read(identity) {
            return Ok(Served::Cached(cached));
        }

        let snapshot = self.durable.load().await;
        if snapshot.is_for(identity) && !snapshot.is_stale(self.settings.durable_ttl) {
            let age = snapshot.age().unwrap_or(Duration::ZERO);
            info!(identity, ?age, "serving durable snapshot");
            self.memory
                .store_with_age(identity, snapshot.to_rollups(), age);
            if let CacheRead::Hit(cached) = self.memory.read(identity) {
                return Ok(Served::Cached(cached));
            }
        }

        let rollups = self.refresh(identity, budget, snapshot).await?;
        Ok(Served::Refreshed(rollups))
    }

    /// Aggregate, enrich, and write both tiers. Callers hold the refresh lock.
    async fn refresh(
        &self,
        identity: &str,
        budget: usize,
        previous: DurableSnapshot,
    ) -> Result<Arc<[RepositoryRollup]>> {
        let pacing = self.settings.pacing;
        let source = self.source.as_ref();

        let mut rollups = Aggregator::new(source, pacing)
            .aggregate(identity, Utc::now().year())
            .await?;

        let known = previous.is_for(identity).then_some(&previous);
        Enricher::new(source, pacing.metadata_delay)
            .enrich(&mut rollups, known, budget)
            .await;

        let mut snapshot = DurableSnapshot::new(identity, &rollups);
        self.durable.save(&mut snapshot).await;

        Ok(self.memory.store(identity, rollups))
    }

    fn schedule_revalidation(&self, identity: &str, budget: usize) {
        let Some(guard) = self.memory.try_begin_revalidation(identity) else {
            return;
        };

        debug!(identity, "scheduling background revalidation");
        let engine = self.clone();
        tokio::spawn(async move {
            let identity = guard.identity().to_string();
            match engine.revalidate(&identity, budget).await {
                Ok(()) => debug!(identity = %identity, "background revalidation finished"),
                Err(e) => {
                    warn!(identity = %identity, error = %e, "background revalidation failed, keeping stale data")
                }
            }
            drop(guard);
        });
    }

    async fn revalidate(&self, identity: &str, budget: usize) -> Result<()> {
        let lock = self.refresh_lock(identity);
        let _held = lock.lock().await;

        if let CacheRead::Hit(cached) = self.memory.read(identity) {
            if cached.is_fresh {
                return Ok(());
            }
        }

        let previous = self.durable.load().await;
        self.refresh(identity, budget, previous).await?;
        Ok(())
    }

    fn refresh_lock(&self, identity: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(identity.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::write_json;
    use crate::config::Pacing;
    use crate::github::mock::{MockSource, item};
    use crate::projection::SortBy;
    use tempfile::TempDir;

    fn settings(cache_file: Option<std::path::PathBuf>) -> Settings {
        Settings {
            default_identity: None,
            cache_file,
            pacing: Pacing::none(),
            ..Settings::default()
        }
    }

    /// alice: two PRs to alice/x, one to bob/y, all in 2024.
    fn alice_source() -> Arc<MockSource> {
        let source = MockSource::new("alice");
        source
            .page(2024, 1, vec![
                item("alice/x", "2024-02-01T00:00:00Z"),
                item("bob/y", "2024-03-01T00:00:00Z"),
                item("alice/x", "2024-04-01T00:00:00Z"),
            ])
            .repo("alice/x", 5, false)
            .repo("bob/y", 50, false);
        Arc::new(source)
    }

    fn by_stars() -> QueryConfiguration {
        QueryConfiguration {
            sort_by: SortBy::Stars,
            ..Default::default()
        }
    }

    fn summary(response: &RepositoriesResponse) -> Vec<(&str, u64, u64)> {
        response
            .repositories
            .iter()
            .map(|r| (r.full_name.as_str(), r.star_count, r.pull_request_count))
            .collect()
    }

    async fn settle(engine: &Engine, identity: &str) {
        while engine.memory().is_revalidating(identity) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_miss_aggregates_enriches_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");
        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(Some(path.clone())));

        let response = engine.get_repositories(&by_stars()).await.unwrap();

        assert_eq!(response.identity, "alice");
        assert_eq!(summary(&response), [("bob/y", 50, 1), ("alice/x", 5, 2)]);
        assert_eq!(response.cache_status, CacheStatus::live());

        let persisted = DurableCache::new(path).load().await;
        assert!(persisted.is_for("alice"));
        assert_eq!(persisted.rollups.len(), 2);
        assert_eq!(persisted.get("bob/y").unwrap().star_count, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_read_does_not_refetch() {
        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(None));

        engine.get_repositories(&by_stars()).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let response = engine.get_repositories(&by_stars()).await.unwrap();

        assert!(response.cache_status.from_cache);
        assert!(!response.cache_status.is_stale);
        assert_eq!(response.cache_status.age_ms, 30_000);
        assert!(!engine.memory().is_revalidating("alice"));
        assert_eq!(source.search_calls_for(2015), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reads_schedule_one_revalidation() {
        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(None));

        engine.get_repositories(&by_stars()).await.unwrap();
        tokio::time::advance(Duration::from_secs(10 * 60)).await;

        let config = by_stars();
        let responses = tokio::join!(
            engine.get_repositories(&config),
            engine.get_repositories(&config),
            engine.get_repositories(&config),
            engine.get_repositories(&config),
            engine.get_repositories(&config),
        );
        for response in [responses.0, responses.1, responses.2, responses.3, responses.4] {
            let response = response.unwrap();
            assert!(response.cache_status.is_stale);
            assert_eq!(summary(&response), [("bob/y", 50, 1), ("alice/x", 5, 2)]);
        }

        settle(&engine, "alice").await;
        assert_eq!(source.search_calls_for(2015), 2);

        let after = engine.get_repositories(&config).await.unwrap();
        assert!(after.cache_status.from_cache);
        assert!(!after.cache_status.is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_revalidation_keeps_stale_entry() {
        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(None));

        engine.get_repositories(&by_stars()).await.unwrap();
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        source.fail_all_searches(true);
        let baseline = source.search_calls().len();

        let stale = engine.get_repositories(&by_stars()).await.unwrap();
        assert!(stale.cache_status.is_stale);
        settle(&engine, "alice").await;

        // Marker cleared, data untouched, next stale read retries
        let again = engine.get_repositories(&by_stars()).await.unwrap();
        assert!(again.cache_status.is_stale);
        assert_eq!(summary(&again), summary(&stale));
        settle(&engine, "alice").await;
        // Each failed revalidation stops at its first page
        assert_eq!(source.search_calls().len(), baseline + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refreshes_synchronously() {
        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(None));

        engine.get_repositories(&by_stars()).await.unwrap();
        tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
        source.repo("bob/y", 60, false);

        let response = engine.get_repositories(&by_stars()).await.unwrap();
        assert_eq!(response.cache_status, CacheStatus::live());
        assert_eq!(response.repositories[0].star_count, 60);
        assert_eq!(source.search_calls_for(2015), 2);
    }

    #[tokio::test]
    async fn test_miss_failure_surfaces_and_caches_nothing() {
        let source = alice_source();
        source.fail_all_searches(true);
        let engine = Engine::new(source.clone(), settings(None));

        let err = engine.get_repositories(&by_stars()).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 500: mock failure");
        assert!(matches!(engine.memory().read("alice"), CacheRead::Miss));
    }

    #[tokio::test]
    async fn test_concurrent_misses_aggregate_once() {
        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(None));

        let config = by_stars();
        let (a, b) = tokio::join!(
            engine.get_repositories(&config),
            engine.get_repositories(&config)
        );

        assert_eq!(summary(&a.unwrap()), summary(&b.unwrap()));
        assert_eq!(source.search_calls_for(2015), 1);
    }

    #[tokio::test]
    async fn test_valid_durable_snapshot_skips_remote() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");

        let mut cached = RepositoryRollup::new("alice/old", "alice", "2020-01-01T00:00:00Z");
        cached.star_count = 9;
        let mut snapshot = DurableSnapshot::new("alice", &[cached]);
        DurableCache::new(path.clone()).save(&mut snapshot).await;

        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(Some(path)));
        let response = engine.get_repositories(&by_stars()).await.unwrap();

        assert!(response.cache_status.from_cache);
        assert_eq!(summary(&response), [("alice/old", 9, 1)]);
        assert!(source.search_calls().is_empty());
        assert!(source.metadata_calls().is_empty());
    }

    #[tokio::test]
    async fn test_stale_durable_snapshot_backfills_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");

        let mut bob = RepositoryRollup::new("bob/y", "alice", "2020-01-01T00:00:00Z");
        bob.star_count = 77;
        bob.is_private = true;
        let mut snapshot = DurableSnapshot::new("alice", &[bob]);
        snapshot.fetched_at = (Utc::now() - chrono::Duration::days(2)).to_rfc3339();
        write_json(&path, &snapshot).unwrap();

        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(Some(path)));
        let config = QueryConfiguration {
            enrichment_budget: 1,
            include_private: true,
            ..by_stars()
        };
        let response = engine.get_repositories(&config).await.unwrap();

        assert_eq!(response.cache_status, CacheStatus::live());
        assert_eq!(source.metadata_calls(), ["alice/x"]);
        assert_eq!(summary(&response), [("bob/y", 77, 1), ("alice/x", 5, 2)]);
        assert!(response.repositories[0].is_private);
    }

    #[tokio::test]
    async fn test_snapshot_for_other_identity_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");

        let mut bob = RepositoryRollup::new("bob/y", "carol", "2020-01-01T00:00:00Z");
        bob.star_count = 77;
        let mut snapshot = DurableSnapshot::new("carol", &[bob]);
        DurableCache::new(path.clone()).save(&mut snapshot).await;

        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(Some(path)));
        let config = QueryConfiguration {
            enrichment_budget: 1,
            ..by_stars()
        };
        let response = engine.get_repositories(&config).await.unwrap();

        assert_eq!(summary(&response), [("alice/x", 5, 2), ("bob/y", 0, 1)]);
    }

    #[tokio::test]
    async fn test_identity_resolution_order() {
        let source = alice_source();
        let engine = Engine::new(
            source.clone(),
            Settings {
                default_identity: Some("dave".to_string()),
                ..settings(None)
            },
        );

        let configured = engine.get_repositories(&by_stars()).await.unwrap();
        assert_eq!(configured.identity, "dave");

        let overridden = QueryConfiguration {
            identity: Some("bob".to_string()),
            ..by_stars()
        };
        assert_eq!(
            engine.get_repositories(&overridden).await.unwrap().identity,
            "bob"
        );

        let viewer = Engine::new(source.clone(), settings(None));
        let blank = QueryConfiguration {
            identity: Some("  ".to_string()),
            ..by_stars()
        };
        assert_eq!(viewer.get_repositories(&blank).await.unwrap().identity, "alice");
    }

    #[tokio::test]
    async fn test_projection_applies_to_cached_reads() {
        let source = alice_source();
        let engine = Engine::new(source.clone(), settings(None));
        engine.get_repositories(&by_stars()).await.unwrap();

        let own = QueryConfiguration {
            scope: crate::projection::Scope::Own,
            ..by_stars()
        };
        let response = engine.get_repositories(&own).await.unwrap();

        assert!(response.cache_status.from_cache);
        assert_eq!(summary(&response), [("alice/x", 5, 2)]);
    }
}
