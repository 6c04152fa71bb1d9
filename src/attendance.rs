use crate::crud;
use crate::error::{ApiError, FieldErrors};
use crate::resources::{ATTENDANCE_STATUS, SECTIONS, STUDENTS};
use crate::scope::BranchScope;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkRecord {
    student_id: String,
    status: String,
    #[serde(default)]
    remarks: Option<String>,
}

fn parse_date(params: &Map<String, JsonValue>, key: &str) -> Result<Option<NaiveDate>, ApiError> {
    match params.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(Some)
            .ok_or_else(|| ApiError::field(key, "must be a YYYY-MM-DD date")),
    }
}

/// Upsert one attendance row per student for a section and date.
pub fn bulk_mark(
    conn: &Connection,
    scope: &BranchScope,
    params: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let section_id = params
        .get("sectionId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::field("sectionId", "is required"))?;
    let date = parse_date(params, "date")?.ok_or_else(|| ApiError::field("date", "is required"))?;
    if !crud::exists(conn, &SECTIONS, scope, section_id)? {
        return Err(ApiError::not_found(SECTIONS.label));
    }
    let raw = params
        .get("records")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ApiError::field("records", "must be an array"))?;

    let mut errors = FieldErrors::new();
    let mut records = Vec::with_capacity(raw.len());
    for (i, item) in raw.iter().enumerate() {
        let key = format!("records[{i}]");
        match serde_json::from_value::<MarkRecord>(item.clone()) {
            Ok(r) if !ATTENDANCE_STATUS.contains(&r.status.as_str()) => {
                errors
                    .entry(format!("{key}.status"))
                    .or_default()
                    .push(format!("must be one of {}", ATTENDANCE_STATUS.join(", ")));
            }
            Ok(r) if !crud::exists(conn, &STUDENTS, scope, &r.student_id)? => {
                errors
                    .entry(format!("{key}.studentId"))
                    .or_default()
                    .push("not found".into());
            }
            Ok(r) => records.push(r),
            Err(e) => errors.entry(key).or_default().push(e.to_string()),
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let date = date.format("%Y-%m-%d").to_string();
    let now = crud::now_ts();
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO attendance_records(id, branch_id, student_id, section_id, date, status, remarks, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
               section_id = excluded.section_id,
               status = excluded.status,
               remarks = excluded.remarks,
               updated_at = excluded.updated_at",
        )?;
        for r in &records {
            stmt.execute(params_from_iter([
                Value::Text(Uuid::new_v4().to_string()),
                scope.branch_id.clone().map(Value::Text).unwrap_or(Value::Null),
                Value::Text(r.student_id.clone()),
                Value::Text(section_id.to_string()),
                Value::Text(date.clone()),
                Value::Text(r.status.clone()),
                r.remarks.clone().map(Value::Text).unwrap_or(Value::Null),
                Value::Text(now.clone()),
                Value::Text(now.clone()),
            ]))?;
        }
    }
    tx.commit()?;

    info!(section_id = %section_id, date = %date, marked = records.len(), "attendance marked");
    Ok(json!({ "sectionId": section_id, "date": date, "marked": records.len() }))
}

/// Per-status counts for one student; late counts as attended.
pub fn summary(
    conn: &Connection,
    scope: &BranchScope,
    params: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let student_id = params
        .get("studentId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::field("studentId", "is required"))?;
    if !crud::exists(conn, &STUDENTS, scope, student_id)? {
        return Err(ApiError::not_found(STUDENTS.label));
    }
    let from = parse_date(params, "from")?;
    let to = parse_date(params, "to")?;

    let mut sql =
        "SELECT status, COUNT(*) FROM attendance_records WHERE student_id = ?".to_string();
    let mut binds = vec![Value::Text(student_id.to_string())];
    if let Some(from) = from {
        sql.push_str(" AND date >= ?");
        binds.push(Value::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = to {
        sql.push_str(" AND date <= ?");
        binds.push(Value::Text(to.format("%Y-%m-%d").to_string()));
    }
    if let Some(branch) = &scope.branch_id {
        sql.push_str(" AND branch_id = ?");
        binds.push(Value::Text(branch.clone()));
    }
    sql.push_str(" GROUP BY status");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts = Map::new();
    for status in ATTENDANCE_STATUS {
        counts.insert(status.to_string(), json!(0));
    }
    let mut total = 0i64;
    let mut attended = 0i64;
    for (status, n) in rows {
        total += n;
        if status == "present" || status == "late" {
            attended += n;
        }
        counts.insert(status, json!(n));
    }
    let rate = (total > 0).then(|| (attended as f64 * 1000.0 / total as f64).round() / 10.0);

    Ok(json!({
        "studentId": student_id,
        "from": from.map(|d| d.format("%Y-%m-%d").to_string()),
        "to": to.map(|d| d.format("%Y-%m-%d").to_string()),
        "total": total,
        "counts": counts,
        "attendanceRate": rate,
    }))
}
