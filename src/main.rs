// contribs binary.
// Reads settings and an optional JSON query from the environment, prints JSON.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use contribs::github::GitHubClient;
use contribs::{ContribError, Engine, QueryConfiguration, Result, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env()?;
    let token = std::env::var("GITHUB_TOKEN").map_err(|_| ContribError::MissingToken)?;
    let client = GitHubClient::with_base_url(&settings.api_base, &token)?;

    let query = match std::env::var("CONTRIBS_QUERY") {
        Ok(json) if !json.trim().is_empty() => serde_json::from_str(&json)?,
        _ => QueryConfiguration::default(),
    };

    tracing::info!(cache_file = ?settings.cache_file, "starting contribs");
    let engine = Engine::new(Arc::new(client), settings);
    let response = engine.get_repositories(&query).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
