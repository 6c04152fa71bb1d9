//! Generic `<resource>.<op>` dispatch. Resources with derived state or cross-row rules
//! route their writes through the owning service module instead of plain CRUD.

use crate::crud::{self, WriteMode};
use crate::error::ApiError;
use crate::fees;
use crate::ipc::error::respond;
use crate::ipc::helpers::{data_obj, required_str, write_mode};
use crate::ipc::types::{AppState, Request};
use crate::query::ListQuery;
use crate::resources::{self, Resource};
use crate::scope::BranchScope;
use crate::timetable::{self, substitutions};
use rusqlite::Connection;
use serde_json::{Map, Value};

const OPS: &[&str] = &["list", "get", "create", "update", "patch", "delete"];

fn write(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    id: Option<&str>,
    data: &Map<String, Value>,
    mode: WriteMode,
) -> Result<Value, ApiError> {
    match (resource.name, id) {
        ("timetable.periods", None) => timetable::create_period(conn, scope, data),
        ("timetable.periods", Some(id)) => timetable::update_period(conn, scope, id, data, mode),
        ("timetable.substitutions", None) => substitutions::create(conn, scope, data),
        ("timetable.substitutions", Some(id)) => substitutions::update(conn, scope, id, data, mode),
        ("fees.invoices", None) => fees::create_invoice(conn, scope, data),
        ("fees.invoices", Some(id)) => fees::update_invoice(conn, scope, id, data, mode),
        ("fees.payments", None) => fees::create_payment(conn, scope, data),
        ("fees.payments", Some(id)) => fees::update_payment(conn, scope, id, data, mode),
        (_, None) => crud::create(conn, resource, scope, data),
        (_, Some(id)) => crud::update(conn, resource, scope, id, data, mode),
    }
}

fn handle(
    conn: &Connection,
    resource: &Resource,
    op: &str,
    req: &Request,
    scope: &BranchScope,
) -> Result<Value, ApiError> {
    match op {
        "list" => {
            let query = ListQuery::from_params(&req.params);
            Ok(crud::list(conn, resource, scope, &query)?.to_json())
        }
        "get" => crud::get(conn, resource, scope, required_str(&req.params, "id")?),
        "create" => write(conn, resource, scope, None, data_obj(&req.params)?, WriteMode::Create),
        "delete" => {
            let id = required_str(&req.params, "id")?;
            if resource.name == "fees.payments" {
                fees::delete_payment(conn, scope, id)
            } else {
                crud::delete(conn, resource, scope, id)
            }
        }
        _ => {
            let id = required_str(&req.params, "id")?;
            write(conn, resource, scope, Some(id), data_obj(&req.params)?, write_mode(op))
        }
    }
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    scope: &BranchScope,
) -> Option<serde_json::Value> {
    let (name, op) = req.method.rsplit_once('.')?;
    if !OPS.contains(&op) {
        return None;
    }
    let resource = resources::find(name)?;
    let result = handle(&state.db, resource, op, req, scope);
    Some(respond(&req.id, &req.method, result))
}
