// GitHub API response types.
// Defines structs for deserializing the search, repository and user endpoints.

use serde::{Deserialize, Serialize};

/// GitHub user (only the login is needed to resolve the viewer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

/// Repository metadata used for enrichment.
///
/// Missing fields fall back to zero stars and public visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub private: bool,
}

/// A single issue/PR hit from the search API.
///
/// Both fields may be null or absent in a hit; such a record is rejected
/// when folded rather than failing the whole page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchItem {
    /// API URL of the repository, e.g. `https://api.github.com/repos/owner/name`.
    #[serde(default)]
    pub repository_url: Option<String>,
    /// ISO-8601 creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Search API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

/// Rate limit information from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}
