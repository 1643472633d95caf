//! Update availability check.

use super::registry::{ReleaseClient, ReleaseInfo};
use super::version::{compare_versions, read_current_version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of comparing the installed version against the latest release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub current_version: String,
    pub latest_version: Option<String>,
    pub has_update: bool,
    /// The newer release, present only when `has_update` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_info: Option<ReleaseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Check whether a newer release than the installed one exists.
///
/// Never fails. Registry problems come back as `has_update: false` with
/// `error` set and `latest_version` empty.
pub async fn check_for_updates(client: &ReleaseClient, version_file: &Path) -> UpdateCheck {
    let current_version = read_current_version(version_file);

    match client.latest_release().await {
        Ok(release) => {
            let has_update = compare_versions(&current_version, &release.version).is_lt();
            UpdateCheck {
                current_version,
                latest_version: Some(release.version.clone()),
                has_update,
                update_info: has_update.then_some(release),
                error: None,
                checked_at: Utc::now(),
            }
        }
        Err(e) => UpdateCheck {
            current_version,
            latest_version: None,
            has_update: false,
            update_info: None,
            error: Some(e.to_string()),
            checked_at: Utc::now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Json, Router};
    use tempfile::tempdir;

    async fn registry_with_latest(tag: &'static str) -> String {
        let app = Router::new().route(
            "/repos/acme/box/releases/latest",
            get(move || async move {
                Json(serde_json::json!({
                    "tag_name": tag,
                    "assets": [{
                        "name": "update-files.zip",
                        "browser_download_url": "http://example.invalid/u.zip",
                        "size": 10
                    }]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn root_at(version: &str) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            format!(r#"{{"name":"box","version":"{version}"}}"#),
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_newer_release_is_an_update() {
        let base = registry_with_latest("v1.2.0").await;
        let root = root_at("1.0.0");
        let client = ReleaseClient::new(&base, "acme/box").unwrap();

        let check = check_for_updates(&client, &root.path().join("package.json")).await;
        assert!(check.has_update);
        assert_eq!(check.current_version, "1.0.0");
        assert_eq!(check.latest_version.as_deref(), Some("1.2.0"));
        assert_eq!(check.update_info.unwrap().assets.len(), 1);
        assert!(check.error.is_none());
    }

    #[tokio::test]
    async fn test_same_release_is_not_an_update() {
        let base = registry_with_latest("1.0.0").await;
        let root = root_at("1.0.0");
        let client = ReleaseClient::new(&base, "acme/box").unwrap();

        let check = check_for_updates(&client, &root.path().join("package.json")).await;
        assert!(!check.has_update);
        assert!(check.update_info.is_none());
    }

    #[tokio::test]
    async fn test_repeated_checks_agree() {
        let base = registry_with_latest("1.2.0").await;
        let root = root_at("1.0.0");
        let client = ReleaseClient::new(&base, "acme/box").unwrap();
        let version_file = root.path().join("package.json");

        let first = check_for_updates(&client, &version_file).await;
        let second = check_for_updates(&client, &version_file).await;
        assert_eq!(first.has_update, second.has_update);
        assert_eq!(first.latest_version, second.latest_version);
    }

    #[tokio::test]
    async fn test_unreachable_registry_degrades() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let root = root_at("1.0.0");
        let client = ReleaseClient::new(&format!("http://{addr}"), "acme/box").unwrap();

        let check = check_for_updates(&client, &root.path().join("package.json")).await;
        assert!(!check.has_update);
        assert!(check.latest_version.is_none());
        assert!(check.error.unwrap().starts_with("NETWORK_ERROR"));
    }
}
