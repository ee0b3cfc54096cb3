// GitHub API HTTP client.
// Handles authentication, rate limit tracking, and response status mapping.

use std::sync::Mutex;

use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::{debug, warn};

use crate::error::{ContribError, Result};

use super::types::RateLimit;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub API client with authentication and rate limit tracking.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    rate_limit: Mutex<RateLimit>,
}

impl GitHubClient {
    /// Create a client for `base_url` (github.com, GitHub Enterprise, tests).
    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ContribError::Other(e.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("contribs"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ContribError::Api)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Snapshot of the most recently observed rate limit headers.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
            .lock()
            .map(|rl| rl.clone())
            .unwrap_or_default()
    }

    /// Make a GET request to the GitHub API.
    pub async fn get(&self, endpoint: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.get(&url).send().await.map_err(ContribError::Api)?;

        self.update_rate_limit(&response);
        check_response(response).await
    }

    /// Make a GET request with query parameters.
    pub async fn get_with_params<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(ContribError::Api)?;

        self.update_rate_limit(&response);
        check_response(response).await
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let headers = response.headers();
        let Ok(mut rate_limit) = self.rate_limit.lock() else {
            return;
        };

        if let Some(limit) = header_u64(headers, "x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header_u64(headers, "x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header_u64(headers, "x-ratelimit-reset") {
            rate_limit.reset = reset;
        }

        debug!(
            remaining = rate_limit.remaining,
            limit = rate_limit.limit,
            "rate limit updated"
        );
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Format a unix reset timestamp for display, "unknown" if absent.
fn format_reset(reset: Option<u64>) -> String {
    reset
        .and_then(|r| chrono::DateTime::from_timestamp(r as i64, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check response status and convert errors.
///
/// A 403 only counts as rate limiting when the response itself reports zero
/// remaining quota; any other 403 is a plain permission failure.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let remaining = header_u64(response.headers(), "x-ratelimit-remaining");
    let reset = header_u64(response.headers(), "x-ratelimit-reset");

    match status {
        StatusCode::UNAUTHORIZED => Err(ContribError::Unauthorized),
        StatusCode::NOT_FOUND => Err(ContribError::NotFound(response.url().to_string())),
        StatusCode::FORBIDDEN if remaining == Some(0) => {
            let reset_at = format_reset(reset);
            warn!(%reset_at, "GitHub rate limit exhausted");
            Err(ContribError::RateLimited { reset_at })
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let reset_at = format_reset(reset);
            warn!(%reset_at, "GitHub secondary rate limit hit");
            Err(ContribError::RateLimited { reset_at })
        }
        StatusCode::FORBIDDEN => Err(ContribError::Forbidden(
            response.text().await.unwrap_or_default(),
        )),
        status => Err(ContribError::Http {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }),
    }
}
