use boxkeeper_core::update::StatusSnapshot;
use boxkeeper_core::Config;
use miette::{miette, IntoDiagnostic, Result};
use std::time::Duration;

/// Fetch `/updates/status` from a running server.
pub fn run(config: &Config, url: Option<&str>, json: bool) -> Result<()> {
    let base = url.map_or_else(
        || format!("http://{}:{}", config.host, config.port),
        |u| u.trim_end_matches('/').to_string(),
    );
    let endpoint = format!("{base}/updates/status");

    let runtime = super::runtime()?;
    let snapshot = runtime.block_on(fetch(&endpoint, config.api_token.as_deref()))?;

    if json {
        return super::print_json(&snapshot);
    }

    let state = &snapshot.state;
    println!(
        "{} ({}%) {}",
        state.status.as_str(),
        state.progress,
        snapshot.message
    );
    if let Some(version) = &state.version {
        println!("version: {version}");
    }
    if let Some(error) = &state.error {
        println!("error: {error}");
    }
    Ok(())
}

async fn fetch(endpoint: &str, token: Option<&str>) -> Result<StatusSnapshot> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .into_diagnostic()?;

    let mut request = client.get(endpoint);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| miette!("failed to reach {endpoint}: {e}"))?;
    if !response.status().is_success() {
        return Err(miette!("{endpoint} returned {}", response.status()));
    }
    response.json().await.into_diagnostic()
}
