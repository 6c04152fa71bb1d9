//! Cover assignments for a single dated occurrence of a timetable period.

use crate::crud::{self, WriteMode};
use crate::error::{ApiError, FieldErrors};
use crate::resources::{PERIODS, SUBSTITUTIONS};
use crate::scope::BranchScope;
use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde_json::{Map, Value as JsonValue};
use tracing::info;

use super::{field_str, overlay};

fn check_against_period(
    conn: &Connection,
    scope: &BranchScope,
    merged: &Map<String, JsonValue>,
) -> Result<(), ApiError> {
    let (Some(period_id), Some(date)) = (field_str(merged, "periodId"), field_str(merged, "date"))
    else {
        return Ok(());
    };
    let period = crud::get(conn, &PERIODS, scope, &period_id)?;
    let mut errors = FieldErrors::new();

    if let (Ok(d), Some(dow)) = (
        NaiveDate::parse_from_str(&date, "%Y-%m-%d"),
        period["dayOfWeek"].as_i64(),
    ) {
        let weekday = i64::from(d.weekday().number_from_monday());
        if weekday != dow {
            errors
                .entry("date".into())
                .or_default()
                .push(format!("falls on day {weekday}, but the period is on day {dow}"));
        }
    }
    let substitute = field_str(merged, "substituteTeacherId");
    if substitute.is_some() && substitute.as_deref() == period["teacherId"].as_str() {
        errors
            .entry("substituteTeacherId".into())
            .or_default()
            .push("must differ from the period's teacher".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

pub fn create(
    conn: &Connection,
    scope: &BranchScope,
    data: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let mut values = crud::validate(conn, &SUBSTITUTIONS, scope, data, WriteMode::Create)?;
    check_against_period(conn, scope, &overlay(&SUBSTITUTIONS, None, &values))?;
    values.push(("status", Value::Text("pending".into())));
    let id = crud::insert(conn, &SUBSTITUTIONS, scope, &values)?;
    crud::get(conn, &SUBSTITUTIONS, scope, &id)
}

pub fn update(
    conn: &Connection,
    scope: &BranchScope,
    id: &str,
    data: &Map<String, JsonValue>,
    mode: WriteMode,
) -> Result<JsonValue, ApiError> {
    let existing = crud::get(conn, &SUBSTITUTIONS, scope, id)?;
    let values = crud::validate(conn, &SUBSTITUTIONS, scope, data, mode)?;
    if values.is_empty() {
        return Ok(existing);
    }
    check_against_period(conn, scope, &overlay(&SUBSTITUTIONS, Some(&existing), &values))?;
    crud::apply_update(conn, &SUBSTITUTIONS, scope, id, &values)?;
    crud::get(conn, &SUBSTITUTIONS, scope, id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn status(self) -> &'static str {
        match self {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
        }
    }
}

/// Move a pending substitution to approved or rejected.
pub fn decide(
    conn: &Connection,
    scope: &BranchScope,
    id: &str,
    decision: Decision,
    approved_by: Option<&str>,
) -> Result<JsonValue, ApiError> {
    let existing = crud::get(conn, &SUBSTITUTIONS, scope, id)?;
    let current = existing["status"].as_str().unwrap_or("pending");
    if current != "pending" {
        return Err(ApiError::conflict(
            "invalid_state",
            format!("substitution is already {current}"),
        ));
    }

    let mut values = vec![("status", Value::Text(decision.status().into()))];
    if decision == Decision::Approve {
        let by = approved_by
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::field("approvedBy", "is required"))?;
        values.push(("approved_by", Value::Text(by.to_string())));
        values.push(("approved_at", Value::Text(crud::now_ts())));
    }
    crud::apply_update(conn, &SUBSTITUTIONS, scope, id, &values)?;
    info!(substitution_id = %id, status = decision.status(), "substitution decided");
    crud::get(conn, &SUBSTITUTIONS, scope, id)
}
