//! HTTP API.
//!
//! | Method & path              | Auth | Response                                  |
//! |----------------------------|------|-------------------------------------------|
//! | `GET /updates/check`       | yes  | update check, errors degrade to 200       |
//! | `GET /updates/requirements`| yes  | requirements report                       |
//! | `POST /updates/install`    | yes  | `{accepted, status}`, 409 / 400 on reject |
//! | `GET /updates/status`      | yes  | status snapshot                           |
//! | `POST /updates/rollback`   | yes  | `{success, backup}`, 409 while running    |
//! | `GET /updates/version`     | yes  | `{currentVersion, repository, checkedAt}` |
//! | `GET /health`              | no   | liveness                                  |
//!
//! Auth is a Bearer token compared against the configured one; with no token
//! configured every caller is let through.

use crate::installer::Installer;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use boxkeeper_core::update::{codes, RequirementsReport, StatusSnapshot, UpdateCheck, UpdateError};
use boxkeeper_core::{Config, VERSION};
use chrono::Utc;
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    installer: Installer,
    token: Option<Arc<str>>,
    started: Instant,
}

/// Error response: `{ "error", "code", "details"? }`.
struct ApiError(UpdateError);

impl From<UpdateError> for ApiError {
    fn from(e: UpdateError) -> Self {
        Self(e)
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        codes::ALREADY_RUNNING | codes::CONFLICT => StatusCode::CONFLICT,
        codes::NO_UPDATE_AVAILABLE | codes::REQUIREMENTS_NOT_MET => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code());
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0.message(), "request failed");
        }

        let mut body = json!({
            "error": self.0.message(),
            "code": self.0.code(),
        });
        if let Some(report) = self.0.report() {
            body["details"] = serde_json::to_value(report).unwrap_or(Value::Null);
        }
        (status, Json(body)).into_response()
    }
}

/// Build the API router around `installer`.
pub fn router(installer: Installer, api_token: Option<String>) -> Router {
    let state = AppState {
        installer,
        token: api_token.filter(|t| !t.is_empty()).map(Arc::from),
        started: Instant::now(),
    };

    let updates = Router::new()
        .route("/check", get(check))
        .route("/requirements", get(requirements))
        .route("/install", post(install))
        .route("/status", get(status))
        .route("/rollback", post(rollback))
        .route("/version", get(version))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .nest("/updates", updates)
        .route("/health", get(health))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided.is_some_and(|token| token_matches(token, expected)) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Authentication required",
                "code": "UNAUTHORIZED",
            })),
        )
            .into_response()
    }
}

/// Compare tokens without short-circuiting on the first differing byte.
fn token_matches(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

async fn check(State(state): State<AppState>) -> Json<UpdateCheck> {
    Json(state.installer.check().await)
}

async fn requirements(State(state): State<AppState>) -> Json<RequirementsReport> {
    Json(state.installer.requirements().await)
}

async fn install(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let handle = state.installer.start().await?;
    Ok(Json(json!({
        "accepted": true,
        "status": handle.snapshot(),
    })))
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.installer.status())
}

async fn rollback(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let archive = state.installer.rollback().await?;
    Ok(Json(json!({
        "success": true,
        "backup": archive.display().to_string(),
    })))
}

async fn version(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "currentVersion": state.installer.current_version(),
        "repository": state.installer.repository(),
        "checkedAt": Utc::now().to_rfc3339(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": VERSION,
        "uptimeSecs": state.started.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn not_found(uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "code": "NOT_FOUND",
            "path": uri.path(),
        })),
    )
}

/// Run the HTTP API until SIGINT/SIGTERM.
///
/// # Errors
/// Returns an error if the installer cannot be created or the address cannot
/// be bound.
pub async fn run_server(config: &Config) -> io::Result<()> {
    let installer = Installer::from_config(config).map_err(io::Error::other)?;
    let app = router(installer, config.api_token.clone());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(
        addr = %listener.local_addr()?,
        root = %config.root.display(),
        auth = config.api_token.is_some(),
        "update service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("update service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown requested");
}
