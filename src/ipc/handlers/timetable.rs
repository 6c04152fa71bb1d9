use crate::error::ApiError;
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, params_obj, required_str};
use crate::ipc::types::{AppState, Request};
use crate::scope::BranchScope;
use crate::timetable::substitutions::{self, Decision};
use crate::timetable::{self, ScheduleOwner};
use rusqlite::Connection;
use serde_json::Value;

fn handle_schedule(
    conn: &Connection,
    req: &Request,
    scope: &BranchScope,
    owner: ScheduleOwner,
) -> Result<Value, ApiError> {
    let id = required_str(&req.params, "id")?;
    let year = optional_str(&req.params, "academicYearId");
    timetable::schedule(conn, scope, owner, id, year)
}

fn handle_decision(
    conn: &Connection,
    req: &Request,
    scope: &BranchScope,
    decision: Decision,
) -> Result<Value, ApiError> {
    let id = required_str(&req.params, "id")?;
    let approved_by = optional_str(&req.params, "approvedBy");
    substitutions::decide(conn, scope, id, decision, approved_by)
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    scope: &BranchScope,
) -> Option<serde_json::Value> {
    let conn = &state.db;
    let result = match req.method.as_str() {
        "timetable.periods.checkConflicts" => {
            timetable::check_conflicts(conn, scope, &params_obj(&req.params))
        }
        "timetable.generate" => {
            let mut rng = rand::thread_rng();
            timetable::generate(conn, scope, &params_obj(&req.params), &mut rng)
        }
        "timetable.sections.get" => handle_schedule(conn, req, scope, ScheduleOwner::Section),
        "timetable.teachers.get" => handle_schedule(conn, req, scope, ScheduleOwner::Teacher),
        "timetable.audit" => {
            timetable::audit(conn, scope, optional_str(&req.params, "academicYearId"))
        }
        "timetable.subjects.appropriate" => {
            timetable::appropriate_subjects(&params_obj(&req.params))
        }
        "timetable.substitutions.approve" => handle_decision(conn, req, scope, Decision::Approve),
        "timetable.substitutions.reject" => handle_decision(conn, req, scope, Decision::Reject),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
