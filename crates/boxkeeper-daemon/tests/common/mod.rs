//! Shared fixtures: a mock release registry, package archives and a
//! recording supervisor.

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use boxkeeper_core::Config;
use boxkeeper_daemon::Supervisor;
use serde_json::json;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const REPOSITORY: &str = "acme/box";
pub const ASSET_NAME: &str = "update-files.zip";

/// What the mock registry serves.
#[derive(Debug, Clone)]
pub struct MockRelease {
    pub tag: String,
    pub package: Vec<u8>,
    /// Overrides the asset download URL (e.g. a closed port).
    pub asset_url: Option<String>,
    pub asset_delay: Duration,
    /// Number of asset downloads served.
    pub downloads: Arc<AtomicUsize>,
}

impl MockRelease {
    pub fn new(tag: &str, package: Vec<u8>) -> Self {
        Self {
            tag: tag.to_string(),
            package,
            asset_url: None,
            asset_delay: Duration::ZERO,
            downloads: Arc::default(),
        }
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct MockState {
    base_url: String,
    release: Arc<MockRelease>,
}

async fn latest(State(state): State<MockState>) -> Response {
    let url = state
        .release
        .asset_url
        .clone()
        .unwrap_or_else(|| format!("{}/assets/{ASSET_NAME}", state.base_url));
    Json(json!({
        "tag_name": state.release.tag,
        "name": format!("Release {}", state.release.tag),
        "body": "Bug fixes",
        "published_at": "2024-05-01T10:00:00Z",
        "prerelease": false,
        "draft": false,
        "assets": [{
            "name": ASSET_NAME,
            "browser_download_url": url,
            "size": state.release.package.len(),
        }],
    }))
    .into_response()
}

async fn asset(State(state): State<MockState>) -> Response {
    state.release.downloads.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.release.asset_delay).await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/zip")],
        Body::from(state.release.package.clone()),
    )
        .into_response()
}

/// Serve `release` on an ephemeral port and return the base URL. The root
/// path answers 200 so it can double as the connectivity endpoint.
pub async fn spawn_registry(release: MockRelease) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let state = MockState {
        base_url: base_url.clone(),
        release: Arc::new(release),
    };
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route(&format!("/repos/{REPOSITORY}/releases/latest"), get(latest))
        .route(&format!("/assets/{ASSET_NAME}"), get(asset))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base_url
}

/// A URL on which nothing is listening.
pub fn closed_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/")
}

/// Zip archive of `files` (path, contents).
pub fn zip_package(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// The package every install test ships, wrapped in a top-level folder.
pub fn release_package(extra: &[(&str, &str)]) -> Vec<u8> {
    let mut files = vec![
        ("box-1.2.0/package.json", r#"{"name":"box","version":"1.2.0"}"#),
        ("box-1.2.0/server/app.js", "new app"),
        ("box-1.2.0/server/routes/updates.js", "new routes"),
        ("box-1.2.0/config.json", "remote config"),
    ];
    files.extend_from_slice(extra);
    zip_package(&files)
}

/// An installation at version 1.0.0.
pub fn seed_install(root: &Path) {
    fs::write(root.join("package.json"), r#"{"name":"box","version":"1.0.0"}"#).unwrap();
    fs::write(root.join("config.json"), "local config").unwrap();
    fs::create_dir_all(root.join("server")).unwrap();
    fs::write(root.join("server/app.js"), "old app").unwrap();
}

pub fn config(root: &Path, registry: &str) -> Config {
    Config::new(root.to_path_buf())
        .with_repository(REPOSITORY)
        .with_api_base_url(registry)
        .with_connectivity_url(registry)
        .with_required_tool(env!("CARGO"))
}

pub fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

/// Supervisor that records calls instead of touching processes.
#[derive(Debug, Default)]
pub struct RecordingSupervisor {
    pub fail: bool,
    pub restarts: Mutex<Vec<String>>,
    pub exit_scheduled: AtomicBool,
}

impl RecordingSupervisor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn restarts(&self) -> Vec<String> {
        self.restarts.lock().unwrap().clone()
    }

    pub fn exit_scheduled(&self) -> bool {
        self.exit_scheduled.load(Ordering::SeqCst)
    }
}

impl Supervisor for RecordingSupervisor {
    fn restart(&self, service: &str) -> io::Result<()> {
        self.restarts.lock().unwrap().push(service.to_string());
        if self.fail {
            Err(io::Error::other("process or namespace not found"))
        } else {
            Ok(())
        }
    }

    fn schedule_exit(&self, _delay: Duration) {
        self.exit_scheduled.store(true, Ordering::SeqCst);
    }
}
