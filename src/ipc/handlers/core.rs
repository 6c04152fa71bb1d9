use crate::error::ApiError;
use crate::ipc::error::respond;
use crate::ipc::types::{AppState, Request};
use crate::resources::RESOURCES;
use crate::scope::BranchScope;
use serde_json::json;

fn handle_health(
    state: &mut AppState,
    scope: &BranchScope,
) -> Result<serde_json::Value, ApiError> {
    let sqlite: String = state
        .db
        .query_row("SELECT sqlite_version()", [], |r| r.get(0))?;
    Ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sqlite": sqlite,
        "branchId": scope.branch_id,
    }))
}

fn handle_resources_describe() -> serde_json::Value {
    let resources: Vec<_> = RESOURCES
        .iter()
        .map(|r| {
            json!({
                "name": r.name,
                "path": r.http_path(),
                "fields": r.columns.iter().map(|c| json!({
                    "name": c.field,
                    "required": c.required,
                    "writable": c.writable,
                    "references": c.references,
                })).collect::<Vec<_>>(),
                "search": r.search,
                "defaultSort": r.default_sort,
            })
        })
        .collect();
    json!({ "resources": resources })
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    scope: &BranchScope,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, scope),
        "meta.resources" => Ok(handle_resources_describe()),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
