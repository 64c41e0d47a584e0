//! The generic-artifacts download surface served under `<downloads_prefix>`,
//! a secondary capability alongside the module protocol backed by the same
//! configured sources.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;

use modcache_core::version::Version;

use crate::state::AppState;

/// Dispatches a request under `<downloads_prefix>/...`.
///
/// `relative_path` is the request path with the configured prefix already
/// stripped (so it starts with `/`).
pub async fn serve(state: &AppState, relative_path: &str, query: &HashMap<String, String>) -> Response {
    if relative_path == "/versions.json" {
        return serve_versions(state, query.get("filter").map(String::as_str)).await;
    }

    let parts: Vec<&str> = relative_path.split('/').collect();
    let parts = match parts.len() {
        3 => vec![parts[0], parts[1], parts[2], ""],
        4 => parts,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    if !parts[0].is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let (name, version_str, arch) = (parts[1], parts[2], parts[3]);

    let Some(download) = state.downloads.get(name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let version = if version_str == "latest" {
        match download.latest_download_version().await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "invalid download version");
                return StatusCode::NOT_FOUND.into_response();
            },
        }
    } else {
        match Version::parse(version_str) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "invalid download version");
                return StatusCode::NOT_FOUND.into_response();
            },
        }
    };

    match download.fetch(&version, arch).await {
        Ok(bytes) => (StatusCode::OK, Body::from(bytes)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "download request failed");
            StatusCode::BAD_GATEWAY.into_response()
        },
    }
}

async fn serve_versions(state: &AppState, filter: Option<&str>) -> Response {
    let mut latest_versions = serde_json::Map::new();
    for (name, download) in &state.downloads {
        if let Some(filter) = filter {
            if name != filter {
                continue;
            }
        }
        match download.latest_download_version().await {
            Ok(v) => {
                latest_versions.insert(name.clone(), serde_json::Value::String(v.to_string()));
            },
            Err(e) => {
                tracing::debug!(name, error = %e, "invalid download version");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            },
        }
    }
    axum::Json(serde_json::json!({ "latest_versions": latest_versions })).into_response()
}
