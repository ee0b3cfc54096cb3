// GitHub API module.
// Provides the remote data source seam, its reqwest client and response types.

pub mod client;
pub mod endpoints;
#[cfg(test)]
pub mod mock;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::GitHubClient;
pub use types::*;

/// The remote calls the aggregation engine depends on.
///
/// Every method is a suspension point; implementations surface non-success
/// responses as errors, with rate limiting as its own variant.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Login of the authenticated viewer.
    async fn viewer_login(&self) -> Result<String>;

    /// Star count and visibility for `owner/name`.
    async fn repo_metadata(&self, full_name: &str) -> Result<RepoMetadata>;

    /// One page of pull requests authored by `author` and created in `year`.
    async fn search_pull_requests(
        &self,
        author: &str,
        year: i32,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<SearchItem>>;
}
