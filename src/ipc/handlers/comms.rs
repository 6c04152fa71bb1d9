use crate::comms;
use crate::ipc::error::respond;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::scope::BranchScope;
use serde_json::Map;

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    scope: &BranchScope,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "comms.templates.render" => required_str(&req.params, "id").and_then(|id| {
            let vars = req
                .params
                .get("variables")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_else(Map::new);
            comms::render_template(&state.db, scope, id, &vars)
        }),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
