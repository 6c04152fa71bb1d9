use crate::attendance;
use crate::ipc::error::respond;
use crate::ipc::helpers::params_obj;
use crate::ipc::types::{AppState, Request};
use crate::scope::BranchScope;

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    scope: &BranchScope,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.bulkMark" => attendance::bulk_mark(&state.db, scope, &params_obj(&req.params)),
        "attendance.summary" => attendance::summary(&state.db, scope, &params_obj(&req.params)),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
