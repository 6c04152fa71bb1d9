//! REST front end. Every route is translated into a dispatcher method plus params and
//! served by the same `ipc::handle_request` the stdio loop uses.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_TYPE, HeaderName};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ipc::{self, AppState};
use crate::resources::RESOURCES;
use crate::scope::{BRANCH_HEADER, TENANT_HEADER};

pub const API_PREFIX: &str = "/api/v1";

pub type SharedState = Arc<Mutex<AppState>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub method: String,
    pub id: Option<String>,
    /// Action routes merge body fields into params; CRUD routes nest the body under `data`.
    pub action: bool,
}

impl Resolved {
    fn crud(method: String, id: Option<&str>) -> Self {
        Resolved {
            method,
            id: id.map(str::to_string),
            action: false,
        }
    }

    fn action(method: &str, id: Option<&str>) -> Self {
        Resolved {
            method: method.to_string(),
            id: id.map(str::to_string),
            action: true,
        }
    }

    pub fn is_create(&self) -> bool {
        !self.action && self.method.ends_with(".create")
    }
}

fn resolve_action(method: &Method, segs: &[&str]) -> Option<Resolved> {
    let m = method.as_str();
    let r = match (m, segs) {
        ("GET", ["health"]) => Resolved::action("health", None),
        ("POST", ["timetable", "periods", "check-conflicts"]) => {
            Resolved::action("timetable.periods.checkConflicts", None)
        }
        ("POST", ["timetable", "generate"]) => Resolved::action("timetable.generate", None),
        ("GET", ["timetable", "audit"]) => Resolved::action("timetable.audit", None),
        ("GET", ["timetable", "subjects", "appropriate"]) => {
            Resolved::action("timetable.subjects.appropriate", None)
        }
        ("GET", ["timetable", "sections", id]) => {
            Resolved::action("timetable.sections.get", Some(id))
        }
        ("GET", ["timetable", "teachers", id]) => {
            Resolved::action("timetable.teachers.get", Some(id))
        }
        ("POST", ["timetable", "substitutions", id, "approve"]) => {
            Resolved::action("timetable.substitutions.approve", Some(id))
        }
        ("POST", ["timetable", "substitutions", id, "reject"]) => {
            Resolved::action("timetable.substitutions.reject", Some(id))
        }
        ("POST", ["fees", "invoices", id, "recompute"]) => {
            Resolved::action("fees.invoices.recompute", Some(id))
        }
        ("POST", ["attendance", "bulk"]) => Resolved::action("attendance.bulkMark", None),
        ("GET", ["attendance", "summary"]) => Resolved::action("attendance.summary", None),
        ("POST", ["comms", "templates", id, "render"]) => {
            Resolved::action("comms.templates.render", Some(id))
        }
        _ => return None,
    };
    Some(r)
}

/// Map an HTTP method and a path below `/api/v1` to a dispatcher method.
pub fn resolve(method: &Method, path: &str) -> Option<Resolved> {
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(r) = resolve_action(method, &segs) {
        return Some(r);
    }

    // Longest resource path first so `exams/results` is not read as `exams/{id}`.
    let mut candidates: Vec<(Vec<&str>, &str)> = RESOURCES
        .iter()
        .map(|r| (r.name.split('.').collect(), r.name))
        .collect();
    candidates.sort_by_key(|(parts, _)| std::cmp::Reverse(parts.len()));

    let (parts, name) = candidates
        .into_iter()
        .find(|(parts, _)| segs.len() >= parts.len() && segs[..parts.len()] == parts[..])?;
    let rest = &segs[parts.len()..];
    let op = match (method.as_str(), rest) {
        ("GET", []) => "list",
        ("POST", []) => "create",
        ("GET", [_]) => "get",
        ("PUT", [_]) => "update",
        ("PATCH", [_]) => "patch",
        ("DELETE", [_]) => "delete",
        _ => return None,
    };
    Some(Resolved::crud(format!("{name}.{op}"), rest.first().copied()))
}

fn build_params(
    resolved: &Resolved,
    query: BTreeMap<String, String>,
    body: Option<Value>,
) -> Result<Value, ApiError> {
    let mut params: Map<String, Value> = query
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    if let Some(id) = &resolved.id {
        params.insert("id".into(), Value::String(id.clone()));
    }
    match (body, resolved.action) {
        (None, _) => {}
        (Some(Value::Object(fields)), true) => {
            for (k, v) in fields {
                // The path id is authoritative.
                if k == "id" && resolved.id.is_some() {
                    continue;
                }
                params.insert(k, v);
            }
        }
        (Some(_), true) => {
            return Err(ApiError::bad_request("bad_json", "request body must be a JSON object"))
        }
        (Some(body), false) => {
            params.insert("data".into(), body);
        }
    }
    Ok(Value::Object(params))
}

fn problem_response(e: &ApiError, instance: &str) -> Response {
    let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut resp = (status, Json(ipc::problem(e, instance))).into_response();
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/problem+json"),
    );
    resp
}

fn branch_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    [BRANCH_HEADER, TENANT_HEADER]
        .into_iter()
        .filter_map(|name| {
            let v = headers.get(HeaderName::from_static(name))?.to_str().ok()?;
            Some((name.to_string(), v.to_string()))
        })
        .collect()
}

async fn dispatch(
    State(state): State<SharedState>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let instance = format!("{API_PREFIX}/{path}");
    let Some(resolved) = resolve(&method, &path) else {
        let e = ApiError::not_found(format!("route {method} {instance}"));
        return problem_response(&e, &instance);
    };

    let body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(v) => Some(v),
            Err(e) => {
                let e = ApiError::bad_request("bad_json", e.to_string());
                return problem_response(&e, &instance);
            }
        }
    };
    let params = match build_params(&resolved, query, body) {
        Ok(p) => p,
        Err(e) => return problem_response(&e, &instance),
    };

    let req = ipc::Request {
        id: Uuid::new_v4().to_string(),
        method: resolved.method.clone(),
        params,
        headers: branch_headers(&headers),
    };
    let joined = tokio::task::spawn_blocking(move || {
        let mut guard = match state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        ipc::handle_request(&mut guard, req)
    })
    .await;

    let mut envelope = match joined {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "dispatch task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "dispatch failed").into_response();
        }
    };

    if envelope["ok"] == true {
        let status = if resolved.is_create() {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        return (status, Json(envelope["result"].take())).into_response();
    }

    let mut problem = envelope["error"].take();
    problem["instance"] = Value::String(instance);
    let status = problem["status"]
        .as_u64()
        .and_then(|s| u16::try_from(s).ok())
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut resp = (status, Json(problem)).into_response();
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/problem+json"),
    );
    resp
}

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(BRANCH_HEADER),
            HeaderName::from_static(TENANT_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route(&format!("{API_PREFIX}/{{*path}}"), any(dispatch))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(Arc::new(Mutex::new(state)));

    let address = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
