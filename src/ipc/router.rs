use super::handlers;
use super::types::{AppState, Request};
use crate::error::ApiError;
use crate::ipc::error::err;
use crate::scope::BranchScope;
use tracing::info;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let scope = BranchScope::from_headers(&req.headers, state.default_branch.as_deref());
    info!(
        id = %req.id,
        method = %req.method,
        branch = scope.branch_id.as_deref().unwrap_or("*"),
        scoped = scope.is_scoped(),
        "dispatch"
    );

    if let Some(resp) = handlers::core::try_handle(state, &req, &scope) {
        return resp;
    }
    if let Some(resp) = handlers::timetable::try_handle(state, &req, &scope) {
        return resp;
    }
    if let Some(resp) = handlers::fees::try_handle(state, &req, &scope) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req, &scope) {
        return resp;
    }
    if let Some(resp) = handlers::comms::try_handle(state, &req, &scope) {
        return resp;
    }
    // Generic `<resource>.<op>` goes last so the named actions above win.
    if let Some(resp) = handlers::resources::try_handle(state, &req, &scope) {
        return resp;
    }

    err(
        &req.id,
        &ApiError::UnknownMethod(req.method.clone()),
        &req.method,
    )
}
