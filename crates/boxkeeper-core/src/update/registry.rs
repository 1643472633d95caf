//! Release registry client (GitHub releases API).

use super::error::UpdateError;
use super::version::normalize_tag;
use super::{CHECK_TIMEOUT, CONNECT_TIMEOUT};
use crate::version::USER_AGENT;
use crate::Config;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub name: String,
    pub download_url: String,
    pub size_bytes: u64,
}

/// A published release, with the tag's leading `v` stripped into `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub version: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub assets: Vec<AssetInfo>,
    pub prerelease: bool,
    pub draft: bool,
}

/// Wire shape of a GitHub release.
#[derive(Debug, Deserialize)]
struct RawRelease {
    tag_name: String,
    name: Option<String>,
    body: Option<String>,
    published_at: Option<String>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

impl From<RawRelease> for ReleaseInfo {
    fn from(raw: RawRelease) -> Self {
        Self {
            version: normalize_tag(&raw.tag_name).to_string(),
            name: raw.name,
            description: raw.body,
            published_at: raw.published_at,
            assets: raw
                .assets
                .into_iter()
                .map(|a| AssetInfo {
                    name: a.name,
                    download_url: a.browser_download_url,
                    size_bytes: a.size,
                })
                .collect(),
            prerelease: raw.prerelease,
            draft: raw.draft,
        }
    }
}

/// Client for looking up the latest release of one repository.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    base_url: Url,
    repository: String,
    http: Client,
}

impl ReleaseClient {
    /// Create a client for `repository` (`owner/name`) against `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str, repository: &str) -> Result<Self, UpdateError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| UpdateError::remote(format!("Invalid API URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CHECK_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdateError::remote(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            repository: repository.to_string(),
            http,
        })
    }

    /// Create a client from the configured API URL and repository.
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, UpdateError> {
        Self::new(&config.api_base_url, &config.repository)
    }

    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Get the HTTP client (reused for asset downloads).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fetch the latest published release.
    ///
    /// # Errors
    /// `RELEASE_NOT_FOUND` on 404, `NETWORK_ERROR` on connect/timeout failures,
    /// `REMOTE_ERROR` for any other non-2xx status or a malformed body.
    pub async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError> {
        let url = self
            .base_url
            .join(&format!("repos/{}/releases/latest", self.repository))
            .map_err(|e| {
                UpdateError::remote(format!(
                    "Failed to build release URL for '{}': {e}",
                    self.repository
                ))
            })?;

        let response = self
            .http
            .get(url.as_str())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(UpdateError::release_not_found(&self.repository));
        }

        if !response.status().is_success() {
            return Err(UpdateError::remote(format!(
                "Release registry returned status {} for '{}'",
                response.status(),
                self.repository
            )));
        }

        let body = response.bytes().await?;
        let raw: RawRelease = serde_json::from_slice(&body)?;
        Ok(raw.into())
    }
}
