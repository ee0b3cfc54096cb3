// Error types for contribs.
// Covers remote fetch failures, rate limiting, persistence and reference parsing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContribError {
    #[error("GitHub API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed repository reference: {0}")]
    MalformedReference(String),

    #[error("Missing GITHUB_TOKEN environment variable")]
    MissingToken,

    #[error("Failed to load config: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ContribError {
    /// Whether this is the distinguished rate-limit condition.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ContribError::RateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, ContribError>;
