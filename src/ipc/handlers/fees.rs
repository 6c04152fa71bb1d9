use crate::fees;
use crate::ipc::error::respond;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::scope::BranchScope;

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    scope: &BranchScope,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "fees.invoices.recompute" => required_str(&req.params, "id")
            .and_then(|id| fees::recompute_invoice(&state.db, scope, id)),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
