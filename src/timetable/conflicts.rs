use crate::error::ApiError;
use crate::scope::BranchScope;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

pub const SECTION_BUSY: &str = "Section already has a period in this time slot.";
pub const TEACHER_BUSY: &str = "Teacher already has a period in this time slot.";
pub const ROOM_BUSY: &str = "Room is already booked in this time slot.";

/// The slot-relevant fields of a period that is about to be written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedPeriod {
    pub section_id: String,
    pub day_of_week: i64,
    pub period_number: i64,
    pub academic_year_id: String,
    pub teacher_id: Option<String>,
    pub room_id: Option<String>,
    pub is_break: bool,
}

enum Dimension {
    Section,
    Teacher,
    Room,
}

impl Dimension {
    fn column(&self) -> &'static str {
        match self {
            Dimension::Section => "section_id",
            Dimension::Teacher => "teacher_id",
            Dimension::Room => "room_id",
        }
    }
}

/// Point query: is there already a period for `value` on `dim` in the proposed slot?
///
/// The section dimension counts break periods too; teacher and room only count
/// teaching periods.
fn occupied(
    conn: &Connection,
    scope: &BranchScope,
    p: &ProposedPeriod,
    dim: Dimension,
    value: &str,
    exclude_id: Option<&str>,
) -> Result<bool, ApiError> {
    let mut sql = format!(
        "SELECT 1 FROM timetable_periods
         WHERE day_of_week = ? AND period_number = ? AND academic_year_id = ? AND {} = ?",
        dim.column()
    );
    let mut binds = vec![
        Value::Integer(p.day_of_week),
        Value::Integer(p.period_number),
        Value::Text(p.academic_year_id.clone()),
        Value::Text(value.to_string()),
    ];
    if !matches!(dim, Dimension::Section) {
        sql.push_str(" AND is_break = 0");
    }
    if let Some(id) = exclude_id {
        sql.push_str(" AND id != ?");
        binds.push(Value::Text(id.to_string()));
    }
    if let Some(branch) = &scope.branch_id {
        sql.push_str(" AND branch_id = ?");
        binds.push(Value::Text(branch.clone()));
    }
    sql.push_str(" LIMIT 1");

    let hit: Option<i64> = conn
        .query_row(&sql, params_from_iter(binds.iter()), |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

/// Human-readable conflicts for `p`, empty when the slot is free on every dimension.
///
/// This is an existence check only; two writers racing on the same slot can both pass.
pub fn find_conflicts(
    conn: &Connection,
    scope: &BranchScope,
    p: &ProposedPeriod,
    exclude_id: Option<&str>,
) -> Result<Vec<String>, ApiError> {
    let mut conflicts = Vec::new();
    if occupied(conn, scope, p, Dimension::Section, &p.section_id, exclude_id)? {
        conflicts.push(SECTION_BUSY.to_string());
    }
    if p.is_break {
        return Ok(conflicts);
    }
    if let Some(teacher) = p.teacher_id.as_deref().filter(|t| !t.is_empty()) {
        if occupied(conn, scope, p, Dimension::Teacher, teacher, exclude_id)? {
            conflicts.push(TEACHER_BUSY.to_string());
        }
    }
    if let Some(room) = p.room_id.as_deref().filter(|r| !r.is_empty()) {
        if occupied(conn, scope, p, Dimension::Room, room, exclude_id)? {
            conflicts.push(ROOM_BUSY.to_string());
        }
    }
    Ok(conflicts)
}
