//! The proxy's HTTP surface: reserved paths, the generic-downloads surface,
//! and the module protocol itself (`@v/list`, `.info`, `.mod`, `.zip`,
//! `@latest`).

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::io::Read;

use tower_http::trace::TraceLayer;

use modcache_core::router::{self, Action};
use modcache_core::Error;

use crate::content_type;
use crate::dashboard;
use crate::default_proxy;
use crate::downloads;
use crate::request_id;
use crate::state::SharedState;

/// Builds the axum router: specific routes for the reserved paths, and a
/// fallback that implements both the downloads surface and the module
/// protocol's free-form path grammar. Every request is wrapped in a tracing
/// span carrying a fresh [`request_id`], matching the per-request
/// annotation the original attaches to its request context.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/healthz", get(|| async { StatusCode::NO_CONTENT }))
        .route("/favicon.ico", get(|| async { StatusCode::NOT_FOUND }))
        .route("/versions.json", get(serve_versions_json))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            tracing::info_span!(
                "request",
                request_id = %request_id::generate(),
                method = %req.method(),
                path = %req.uri().path(),
            )
        }))
        .with_state(state)
}

async fn serve_dashboard(State(state): State<SharedState>) -> Response {
    axum::response::Html(dashboard::render(&state)).into_response()
}

async fn serve_versions_json(State(state): State<SharedState>) -> Response {
    let mut latest_versions = serde_json::Map::new();

    for (module, source) in &state.modules {
        let Some(source) = source else { continue };
        match latest_major_version(&state, module, source.as_ref()).await {
            Ok(Some((versioned_module, version))) => {
                latest_versions.insert(versioned_module, serde_json::Value::String(version));
            },
            Ok(None) => {},
            Err(e) => tracing::error!(module, error = %e, "unable to get module major version"),
        }
    }

    for module in &state.versions_modules {
        match default_proxy::latest_version(&state.http, &state.default_go_proxy_url, module).await {
            Ok(v) => {
                latest_versions.insert(module.clone(), serde_json::Value::String(v.render_tag()));
            },
            Err(e) => tracing::error!(module, error = %e, "unable to get module version"),
        }
    }

    axum::Json(serde_json::json!({
        "go_version": state.versions_go,
        "latest_versions": latest_versions,
    }))
    .into_response()
}

/// Probes successive majors (1, 2, 3, ...) until the first `v0.0.0`/error,
/// returning the highest-suffixed module name and its version.
async fn latest_major_version(
    state: &SharedState,
    module: &str,
    source: &dyn modcache_core::backend::Source,
) -> Result<Option<(String, String)>, Error> {
    let mut best_module = module.to_string();
    let mut best_version = latest_version(state, module, source).await?;
    if best_version == "v0.0.0" {
        return Ok(None);
    }
    let mut major = 2u64;
    loop {
        let candidate_module = router::set_version_suffix(module, major);
        match latest_version(state, &candidate_module, source).await {
            Ok(v) if v != "v0.0.0" => {
                best_module = candidate_module;
                best_version = v;
                major += 1;
            },
            _ => break,
        }
    }
    Ok(Some((best_module, best_version)))
}

async fn latest_version(
    state: &SharedState,
    module: &str,
    source: &dyn modcache_core::backend::Source,
) -> Result<String, Error> {
    let major = router::version_suffix(module);
    let version = source.latest_version(major).await?;
    match state.materializer.store().latest_version(module, major) {
        Ok(stored) if stored != "v0.0.0" => modcache_core::version::latest_tag_str(&version, &stored)
            .map(|v| v.render_tag()),
        _ => Ok(version),
    }
}

async fn fallback(State(state): State<SharedState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query().unwrap_or(""));

    if let Some(relative) = path.strip_prefix(state.downloads_path_prefix.as_str()) {
        return downloads::serve(&state, relative, &query).await;
    }

    let route = match router::parse(&path) {
        Ok(route) => route,
        Err(e) => {
            tracing::debug!(url = %path, error = %e, "unknown url");
            return redirect_to_default_proxy(&state, &path);
        },
    };

    let base_module = router::remove_version_suffix(&route.module);
    let Some(slot) = state.modules.get(&base_module) else {
        return redirect_to_default_proxy(&state, &path);
    };
    let Some(source) = slot else {
        tracing::debug!(url = %path, "fallthrough disabled");
        return StatusCode::NOT_FOUND.into_response();
    };

    if req.method() != axum::http::Method::GET {
        return StatusCode::BAD_REQUEST.into_response();
    }

    if route.action == Action::List {
        return serve_list(&state, &route.module, source.as_ref()).await;
    }

    let mut version = route.version.clone();
    if version == "latest" {
        match latest_version(&state, &route.module, source.as_ref()).await {
            Ok(v) => version = v,
            Err(e) => {
                tracing::debug!(module = %route.module, error = %e, "unable to get latest version");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            },
        }
    }

    match state.materializer.store().has_version(&route.module, &version) {
        Ok(true) => {},
        Ok(false) | Err(Error::Locked(..)) => {
            if let Err(e) = state
                .materializer
                .ensure(source.as_ref(), &route.module, &version)
                .await
            {
                tracing::debug!(module = %route.module, %version, error = %e, "unable to download module");
                return match e {
                    Error::VersionNotFound { .. } => StatusCode::NOT_FOUND.into_response(),
                    _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                };
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "unable to check module version");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        },
    }

    serve_stored_file(&state, &route.module, &version, route.action)
}

async fn serve_list(
    state: &SharedState,
    module: &str,
    source: &dyn modcache_core::backend::Source,
) -> Response {
    let major = router::version_suffix(module);
    let versions = match source.list_versions(major).await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(module, error = %e, "unable to list module versions");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        },
    };
    let stored = state
        .materializer
        .store()
        .list_versions(module, Some(major))
        .unwrap_or_default();
    let merged = router::merge_versions(&versions, &stored);

    let mut body = String::new();
    for v in merged {
        body.push_str(&v);
        body.push_str("\r\n");
    }
    (
        [(header::CONTENT_TYPE, content_type::for_key("text"))],
        body,
    )
        .into_response()
}

fn serve_stored_file(state: &SharedState, module: &str, version: &str, action: Action) -> Response {
    let suffix = match action {
        Action::Info => "info",
        Action::Mod => "mod",
        Action::Zip => "zip",
        Action::List => unreachable!("handled earlier"),
    };
    match state.materializer.store().open(module, version, suffix) {
        Ok(mut file) => {
            let mut buf = Vec::new();
            if let Err(e) = file.read_to_end(&mut buf) {
                tracing::debug!(module, version, error = %e, "unable to read stored file");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            (
                [(header::CONTENT_TYPE, content_type::for_key(suffix))],
                Body::from(buf),
            )
                .into_response()
        },
        Err(e) => {
            tracing::debug!(module, version, error = %e, "unable to open stored file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

fn redirect_to_default_proxy(state: &SharedState, path: &str) -> Response {
    let target = format!("{}{path}", state.default_go_proxy_url);
    tracing::debug!(url = %target, "redirect");
    Redirect::temporary(&target).into_response()
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let mut it = pair.splitn(2, '=');
            let key = it.next()?;
            let value = it.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
