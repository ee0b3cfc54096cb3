// In-memory remote source for tests.
// Serves canned search pages and metadata, records every call it receives.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::{ContribError, Result};

use super::RemoteSource;
use super::types::{RepoMetadata, SearchItem};

/// Failure a mock call should produce.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    RateLimited,
    Status(u16),
}

impl Failure {
    fn to_error(self) -> ContribError {
        match self {
            Failure::RateLimited => ContribError::RateLimited {
                reset_at: "2024-01-01T00:00:00+00:00".to_string(),
            },
            Failure::Status(status) => ContribError::Http {
                status,
                body: "mock failure".to_string(),
            },
        }
    }
}

#[derive(Default)]
pub struct MockSource {
    viewer: String,
    pages: Mutex<HashMap<(i32, u32), Vec<SearchItem>>>,
    failing_pages: Mutex<HashSet<(i32, u32)>>,
    fail_all_searches: AtomicBool,
    metadata: Mutex<HashMap<String, RepoMetadata>>,
    failing_metadata: Mutex<HashMap<String, Failure>>,
    search_calls: Mutex<Vec<(i32, u32)>>,
    metadata_calls: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new(viewer: &str) -> Self {
        Self {
            viewer: viewer.to_string(),
            ..Self::default()
        }
    }

    /// Serve `items` for the given year and page.
    pub fn page(&self, year: i32, page: u32, items: Vec<SearchItem>) -> &Self {
        self.pages.lock().unwrap().insert((year, page), items);
        self
    }

    pub fn fail_page(&self, year: i32, page: u32) -> &Self {
        self.failing_pages.lock().unwrap().insert((year, page));
        self
    }

    pub fn fail_all_searches(&self, fail: bool) {
        self.fail_all_searches.store(fail, Ordering::SeqCst);
    }

    pub fn repo(&self, full_name: &str, stars: u64, private: bool) -> &Self {
        self.metadata.lock().unwrap().insert(
            full_name.to_string(),
            RepoMetadata {
                stargazers_count: stars,
                private,
            },
        );
        self
    }

    pub fn fail_repo(&self, full_name: &str, failure: Failure) -> &Self {
        self.failing_metadata
            .lock()
            .unwrap()
            .insert(full_name.to_string(), failure);
        self
    }

    pub fn search_calls(&self) -> Vec<(i32, u32)> {
        self.search_calls.lock().unwrap().clone()
    }

    /// Number of search calls made for one year, across all pages.
    pub fn search_calls_for(&self, year: i32) -> usize {
        self.search_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(y, _)| *y == year)
            .count()
    }

    pub fn metadata_calls(&self) -> Vec<String> {
        self.metadata_calls.lock().unwrap().clone()
    }
}

/// A search hit for `owner/name` created at `created_at`.
pub fn item(full_name: &str, created_at: &str) -> SearchItem {
    SearchItem {
        repository_url: Some(format!("https://api.github.com/repos/{}", full_name)),
        created_at: Some(created_at.to_string()),
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    async fn viewer_login(&self) -> Result<String> {
        Ok(self.viewer.clone())
    }

    async fn repo_metadata(&self, full_name: &str) -> Result<RepoMetadata> {
        self.metadata_calls
            .lock()
            .unwrap()
            .push(full_name.to_string());

        if let Some(failure) = self.failing_metadata.lock().unwrap().get(full_name) {
            return Err(failure.to_error());
        }
        self.metadata
            .lock()
            .unwrap()
            .get(full_name)
            .copied()
            .ok_or_else(|| ContribError::NotFound(full_name.to_string()))
    }

    async fn search_pull_requests(
        &self,
        _author: &str,
        year: i32,
        page: u32,
        _per_page: u32,
    ) -> Result<Vec<SearchItem>> {
        self.search_calls.lock().unwrap().push((year, page));

        if self.fail_all_searches.load(Ordering::SeqCst)
            || self.failing_pages.lock().unwrap().contains(&(year, page))
        {
            return Err(Failure::Status(500).to_error());
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&(year, page))
            .cloned()
            .unwrap_or_default())
    }
}
