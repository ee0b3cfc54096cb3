// In-memory cache tier.
// Per-identity rollup snapshots with freshness windows and single-flight markers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::rollup::RepositoryRollup;

/// Last successful aggregation for one identity. Replaced wholesale, never patched.
#[derive(Debug, Clone)]
pub struct MemoryCacheEntry {
    pub snapshot: Arc<[RepositoryRollup]>,
    pub fetched_at: Instant,
}

/// Result of a memory cache lookup.
#[derive(Debug, Clone)]
pub enum CacheRead {
    /// Absent, or older than the staleness window.
    Miss,
    Hit(CachedRollups),
}

#[derive(Debug, Clone)]
pub struct CachedRollups {
    pub data: Arc<[RepositoryRollup]>,
    pub is_fresh: bool,
    pub is_stale: bool,
    pub age: Duration,
}

impl CachedRollups {
    pub fn age_ms(&self) -> u64 {
        self.age.as_millis().try_into().unwrap_or(u64::MAX)
    }
}

/// Process-scoped memory tier, shared by every request through an `Arc`.
#[derive(Debug)]
pub struct MemoryCache {
    fresh_for: Duration,
    stale_for: Duration,
    entries: Mutex<HashMap<String, MemoryCacheEntry>>,
    in_flight: Mutex<HashSet<String>>,
}

impl MemoryCache {
    pub fn new(fresh_for: Duration, stale_for: Duration) -> Self {
        Self {
            fresh_for,
            stale_for,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn read(&self, identity: &str) -> CacheRead {
        let entries = lock(&self.entries);
        let Some(entry) = entries.get(identity) else {
            return CacheRead::Miss;
        };

        let age = entry.fetched_at.elapsed();
        if age >= self.stale_for {
            return CacheRead::Miss;
        }

        CacheRead::Hit(CachedRollups {
            data: Arc::clone(&entry.snapshot),
            is_fresh: age < self.fresh_for,
            is_stale: age >= self.fresh_for,
            age,
        })
    }

    /// Replace the entry for `identity` with a freshly aggregated snapshot.
    pub fn store(&self, identity: &str, rollups: Vec<RepositoryRollup>) -> Arc<[RepositoryRollup]> {
        self.store_with_age(identity, rollups, Duration::ZERO)
    }

    /// Replace the entry with data that was already `age` old when it arrived
    /// (e.g. loaded from the durable tier).
    pub fn store_with_age(
        &self,
        identity: &str,
        rollups: Vec<RepositoryRollup>,
        age: Duration,
    ) -> Arc<[RepositoryRollup]> {
        let now = Instant::now();
        let entry = MemoryCacheEntry {
            snapshot: rollups.into(),
            fetched_at: now.checked_sub(age).unwrap_or(now),
        };
        let snapshot = Arc::clone(&entry.snapshot);
        debug!(identity, repos = snapshot.len(), ?age, "memory cache updated");
        lock(&self.entries).insert(identity.to_string(), entry);
        snapshot
    }

    /// Claim the revalidation slot for `identity`.
    ///
    /// Returns `None` when a revalidation is already outstanding. The slot is
    /// released when the returned guard drops, however the revalidation ends.
    pub fn try_begin_revalidation(self: &Arc<Self>, identity: &str) -> Option<RevalidationGuard> {
        if !lock(&self.in_flight).insert(identity.to_string()) {
            debug!(identity, "revalidation already in flight");
            return None;
        }
        Some(RevalidationGuard {
            cache: Arc::clone(self),
            identity: identity.to_string(),
        })
    }

    pub fn is_revalidating(&self, identity: &str) -> bool {
        lock(&self.in_flight).contains(identity)
    }
}

/// Held by the background task for the lifetime of one revalidation.
#[derive(Debug)]
pub struct RevalidationGuard {
    cache: Arc<MemoryCache>,
    identity: String,
}

impl RevalidationGuard {
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        lock(&self.cache.in_flight).remove(&self.identity);
    }
}

// A poisoned lock still holds consistent data: every critical section is a
// single insert, remove or lookup.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
