//! Health and stats handlers, plus the JSON fallbacks.

use std::net::SocketAddr;

use axum::{
    extract::{rejection::ExtensionRejection, ConnectInfo, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::http::response::{json_error, ApiResponse};
use crate::http::server::AppState;
use crate::platform::SystemStats;

pub async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::ok())
}

#[derive(Serialize)]
struct StatsBody {
    status: &'static str,
    #[serde(flatten)]
    stats: SystemStats,
}

pub async fn stats(State(state): State<AppState>) -> Response {
    match state.stats.snapshot() {
        Ok(stats) => Json(StatsBody {
            status: "ok",
            stats,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to collect system stats");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to get stats")
        }
    }
}

pub async fn not_found(
    method: Method,
    uri: Uri,
    remote: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
) -> Response {
    log_rejection(&method, &uri, remote.ok(), "not found");
    json_error(StatusCode::NOT_FOUND, "not found")
}

pub async fn method_not_allowed(
    method: Method,
    uri: Uri,
    remote: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
) -> Response {
    log_rejection(&method, &uri, remote.ok(), "method not allowed");
    json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

fn log_rejection(
    method: &Method,
    uri: &Uri,
    remote: Option<ConnectInfo<SocketAddr>>,
    reason: &str,
) {
    let remote = remote
        .map(|ci| ci.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    tracing::warn!(remote = %remote, method = %method, path = %uri.path(), "{reason}");
}
