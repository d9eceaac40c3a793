//! Request handlers for the published HLS surface (§6).

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::state::AppState;

/// `GET /health` — liveness probe, always 200, independent of gate state.
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// `GET /metrics` — Prometheus text exposition (ambient, grounded in
/// `hls-vod-server/src/metrics.rs`).
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let body = state.metrics.export_prometheus();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))],
        body,
    )
        .into_response()
}

/// Content-Type for a served path, by extension (§6).
fn content_type_for(path: &str) -> &'static str {
    if path.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if path.ends_with(".ts") {
        "video/mp2t"
    } else if path.ends_with(".vtt") {
        "text/vtt; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

fn not_found(body: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        body.to_string(),
    )
        .into_response()
}

async fn serve_file(path: std::path::PathBuf, content_type: &'static str) -> Option<Response> {
    let bytes = tokio::fs::read(&path).await.ok()?;
    Some(
        (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-cache, no-store, must-revalidate"),
                ),
            ],
            Body::from(bytes),
        )
            .into_response(),
    )
}

/// `GET /master.m3u8` — served from `serving/master.m3u8`; 404 before the
/// gate opens (§4.5).
pub async fn master_playlist(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.record_request("/master.m3u8");

    if !state.gate.is_open() {
        return not_found("media buffer initialization in progress");
    }

    match serve_file(state.serving_path("master.m3u8"), content_type_for("master.m3u8")).await {
        Some(response) => response,
        None => not_found("master.m3u8 not yet available"),
    }
}

/// `GET /<path>` — served from `serving/<path>`, falling back to the staging
/// tree for `.ts`/`.vtt` (diagnostics only, §4.5).
pub async fn serve_path(State(state): State<Arc<AppState>>, Path(path): Path<String>) -> Response {
    state.metrics.record_request(&path);
    let content_type = content_type_for(&path);

    if !state.gate.is_open() {
        let is_diagnostic = path.ends_with(".ts") || path.ends_with(".vtt");
        if !is_diagnostic {
            return not_found("media buffer initialization in progress");
        }
        return match serve_file(state.staging_path(&path), content_type).await {
            Some(response) => response,
            None => not_found("not found"),
        };
    }

    if let Some(response) = serve_file(state.serving_path(&path), content_type).await {
        return response;
    }

    if path.ends_with(".ts") || path.ends_with(".vtt") {
        if let Some(response) = serve_file(state.staging_path(&path), content_type).await {
            return response;
        }
    }

    not_found("not found")
}
