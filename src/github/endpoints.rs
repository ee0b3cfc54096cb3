// GitHub API endpoint functions.
// Provides typed methods for the user, repository and PR search endpoints.

use async_trait::async_trait;

use crate::error::Result;

use super::client::GitHubClient;
use super::types::{Owner, RepoMetadata, SearchItem, SearchResponse};
use super::RemoteSource;

/// Search query for one author's pull requests created within a calendar year.
pub fn pr_search_query(author: &str, year: i32) -> String {
    format!(
        "author:{} type:pr created:{}-01-01..{}-12-31",
        author, year, year
    )
}

impl GitHubClient {
    /// Get the authenticated user.
    pub async fn get_current_user(&self) -> Result<Owner> {
        let response = self.get("/user").await?;
        let user: Owner = response.json().await?;
        Ok(user)
    }

    /// Get star count and visibility for `owner/name`.
    pub async fn get_repo_metadata(&self, full_name: &str) -> Result<RepoMetadata> {
        let response = self.get(&format!("/repos/{}", full_name)).await?;
        let metadata: RepoMetadata = response.json().await?;
        Ok(metadata)
    }

    /// Search one page of an author's pull requests for a given year.
    pub async fn search_issues(
        &self,
        author: &str,
        year: i32,
        page: u32,
        per_page: u32,
    ) -> Result<SearchResponse> {
        let params = [
            ("q", pr_search_query(author, year)),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        let response = self.get_with_params("/search/issues", &params).await?;
        let wrapper: SearchResponse = response.json().await?;
        Ok(wrapper)
    }
}

#[async_trait]
impl RemoteSource for GitHubClient {
    async fn viewer_login(&self) -> Result<String> {
        Ok(self.get_current_user().await?.login)
    }

    async fn repo_metadata(&self, full_name: &str) -> Result<RepoMetadata> {
        self.get_repo_metadata(full_name).await
    }

    async fn search_pull_requests(
        &self,
        author: &str,
        year: i32,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<SearchItem>> {
        let response = self.search_issues(author, year, page, per_page).await?;
        Ok(response.items)
    }
}
