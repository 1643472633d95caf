//! HTTP API tests: the router is bound to an ephemeral port and called with
//! a real HTTP client.

mod common;

use axum::Router;
use boxkeeper_daemon::{router, Installer};
use common::*;
use reqwest::StatusCode;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const TOKEN: &str = "s3cret";

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn api(root: &Path, tag: &str, token: Option<&str>) -> String {
    api_with(root, MockRelease::new(tag, release_package(&[])), token).await
}

async fn api_with(root: &Path, release: MockRelease, token: Option<&str>) -> String {
    seed_install(root);
    let registry = spawn_registry(release).await;
    let installer =
        Installer::new(&config(root, &registry), Arc::new(RecordingSupervisor::default()))
            .unwrap();
    serve(router(installer, token.map(str::to_string))).await
}

async fn get_json(url: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .get(url)
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn post_json(url: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(url)
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.2.0", Some(TOKEN)).await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], boxkeeper_core::VERSION);
}

#[tokio::test]
async fn test_updates_require_bearer_token() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.2.0", Some(TOKEN)).await;

    let response = reqwest::get(format!("{base}/updates/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = reqwest::Client::new()
        .get(format!("{base}/updates/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = get_json(&format!("{base}/updates/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(body["progress"], 0);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_open_access_without_token() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.2.0", None).await;

    let response = reqwest::get(format!("{base}/updates/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["currentVersion"], "1.0.0");
    assert_eq!(body["repository"], REPOSITORY);
}

#[tokio::test]
async fn test_check_reports_newer_release() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.2.0", Some(TOKEN)).await;

    let (status, body) = get_json(&format!("{base}/updates/check")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentVersion"], "1.0.0");
    assert_eq!(body["latestVersion"], "1.2.0");
    assert_eq!(body["hasUpdate"], true);
    assert_eq!(body["updateInfo"]["assets"][0]["name"], ASSET_NAME);
}

#[tokio::test]
async fn test_requirements_report() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.2.0", Some(TOKEN)).await;

    let (status, body) = get_json(&format!("{base}/updates/requirements")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["canUpdate"], true, "{body}");
    assert_eq!(body["hasInternet"], true);
}

#[tokio::test]
async fn test_install_without_update_is_bad_request() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.0.0", Some(TOKEN)).await;

    let (status, body) = post_json(&format!("{base}/updates/install")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_UPDATE_AVAILABLE");
}

#[tokio::test]
async fn test_rollback_without_backup_fails() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.2.0", Some(TOKEN)).await;

    let (status, body) = post_json(&format!("{base}/updates/rollback")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "BACKUP_MISSING");
}

#[tokio::test]
async fn test_unknown_route() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.2.0", Some(TOKEN)).await;

    let response = reqwest::get(format!("{base}/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["path"], "/nope");
}

#[tokio::test]
async fn test_install_then_poll_until_success() {
    let dir = tempdir().unwrap();
    let base = api(dir.path(), "v1.2.0", Some(TOKEN)).await;

    let (status, body) = post_json(&format!("{base}/updates/install")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["accepted"], true);
    assert_eq!(body["status"]["status"], "running");

    let mut last = Value::Null;
    for _ in 0..100 {
        let (_, body) = get_json(&format!("{base}/updates/status")).await;
        if body["status"] != "running" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(last["status"], "success", "{last}");
    assert_eq!(last["progress"], 100);
    assert_eq!(read(dir.path(), "server/app.js"), "new app");
}

#[tokio::test]
async fn test_mutations_conflict_while_running() {
    let dir = tempdir().unwrap();
    let mut release = MockRelease::new("v1.2.0", release_package(&[]));
    release.asset_delay = Duration::from_millis(800);
    let base = api_with(dir.path(), release, Some(TOKEN)).await;

    let (status, body) = post_json(&format!("{base}/updates/install")).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = post_json(&format!("{base}/updates/install")).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], "ALREADY_RUNNING");

    let (status, body) = post_json(&format!("{base}/updates/rollback")).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], "CONFLICT");

    let mut last = Value::Null;
    for _ in 0..100 {
        let (_, body) = get_json(&format!("{base}/updates/status")).await;
        if body["status"] != "running" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(last["status"], "success", "{last}");
}
