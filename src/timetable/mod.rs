pub mod conflicts;
pub mod generator;
pub mod grades;
pub mod substitutions;

use crate::crud::{self, WriteMode};
use crate::error::{ApiError, FieldErrors};
use crate::resources::{ACADEMIC_YEARS, PERIODS, ROOMS, SECTIONS, STAFF, SUBJECTS};
use crate::scope::BranchScope;
use chrono::NaiveTime;
use conflicts::ProposedPeriod;
use generator::{Allocation, GenerateError};
use rand::Rng;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Map, Value as JsonValue};
use tracing::info;

pub const MAX_DAY_OF_WEEK: i64 = 7;
pub const MAX_PERIOD_NUMBER: i64 = 12;

pub(crate) fn sql_to_json(v: &Value) -> JsonValue {
    match v {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => json!(i),
        Value::Real(f) => json!(f),
        Value::Text(s) => json!(s),
        Value::Blob(_) => JsonValue::Null,
    }
}

/// Existing row (if any) with validated values laid over it, keyed by api field.
pub(crate) fn overlay(
    resource: &crate::resources::Resource,
    existing: Option<&JsonValue>,
    values: &[(&'static str, Value)],
) -> Map<String, JsonValue> {
    let mut merged = existing
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    for (column, v) in values {
        if let Some(c) = resource.columns.iter().find(|c| c.column == *column) {
            merged.insert(c.field.to_string(), sql_to_json(v));
        }
    }
    merged
}

pub(crate) fn field_str(m: &Map<String, JsonValue>, key: &str) -> Option<String> {
    m.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

/// Integer field, accepting numeric strings the way the CRUD path does.
fn field_i64(m: &Map<String, JsonValue>, key: &str) -> Result<Option<i64>, String> {
    match m.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| "must be an integer".into()),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| "must be an integer".into()),
        Some(_) => Err("must be an integer".into()),
    }
}

fn field_bool(m: &Map<String, JsonValue>, key: &str) -> bool {
    m.get(key)
        .and_then(|v| v.as_bool().or_else(|| v.as_i64().map(|i| i != 0)))
        .unwrap_or(false)
}

fn proposed_from(m: &Map<String, JsonValue>) -> Result<ProposedPeriod, ApiError> {
    let mut errors = FieldErrors::new();
    let mut push =
        |field: &str, msg: String| errors.entry(field.to_string()).or_default().push(msg);

    let mut int = |field: &str| match field_i64(m, field) {
        Ok(Some(v)) => Some(v),
        Ok(None) => {
            push(field, "is required".into());
            None
        }
        Err(msg) => {
            push(field, msg);
            None
        }
    };
    let day = int("dayOfWeek");
    let period = int("periodNumber");
    let section_id = field_str(m, "sectionId");
    let year = field_str(m, "academicYearId");
    if section_id.is_none() {
        push("sectionId", "is required".into());
    }
    if year.is_none() {
        push("academicYearId", "is required".into());
    }

    if let Some(d) = day.filter(|d| !(1..=MAX_DAY_OF_WEEK).contains(d)) {
        errors
            .entry("dayOfWeek".into())
            .or_default()
            .push(format!("must be between 1 and {MAX_DAY_OF_WEEK} (got {d})"));
    }
    if let Some(p) = period.filter(|p| !(1..=MAX_PERIOD_NUMBER).contains(p)) {
        errors
            .entry("periodNumber".into())
            .or_default()
            .push(format!("must be between 1 and {MAX_PERIOD_NUMBER} (got {p})"));
    }
    let clock = |key: &str| {
        field_str(m, key).and_then(|s| {
            NaiveTime::parse_from_str(&s, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
                .ok()
        })
    };
    if let (Some(start), Some(end)) = (clock("startTime"), clock("endTime")) {
        if start >= end {
            errors
                .entry("endTime".into())
                .or_default()
                .push("must be after startTime".into());
        }
    }

    match (section_id, day, period, year) {
        (Some(section_id), Some(day_of_week), Some(period_number), Some(academic_year_id))
            if errors.is_empty() =>
        {
            Ok(ProposedPeriod {
                section_id,
                day_of_week,
                period_number,
                academic_year_id,
                teacher_id: field_str(m, "teacherId"),
                room_id: field_str(m, "roomId"),
                is_break: field_bool(m, "isBreak"),
            })
        }
        _ => Err(ApiError::Validation(errors)),
    }
}

/// Grade level of the class a section belongs to, if it can be determined.
pub fn section_grade_level(
    conn: &Connection,
    scope: &BranchScope,
    section_id: &str,
) -> Result<Option<u8>, ApiError> {
    let mut sql = "SELECT c.name, c.grade_level
         FROM sections s
         JOIN classes c ON c.id = s.class_id
         WHERE s.id = ?"
        .to_string();
    let mut binds = vec![Value::Text(section_id.to_string())];
    if let Some(branch) = &scope.branch_id {
        sql.push_str(" AND s.branch_id = ?");
        binds.push(Value::Text(branch.clone()));
    }
    let row: Option<(String, Option<i64>)> = conn
        .query_row(&sql, params_from_iter(binds.iter()), |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .optional()?;
    Ok(row.and_then(|(name, level)| grades::resolve_grade_level(level, &name)))
}

fn check_grade(
    conn: &Connection,
    scope: &BranchScope,
    m: &Map<String, JsonValue>,
    p: &ProposedPeriod,
) -> Result<(), ApiError> {
    if p.is_break {
        return Ok(());
    }
    let Some(subject_id) = field_str(m, "subjectId") else {
        return Ok(());
    };
    let subject = crud::get(conn, &SUBJECTS, scope, &subject_id)?;
    let subject_name = subject["name"].as_str().unwrap_or_default();
    let Some(level) = section_grade_level(conn, scope, &p.section_id)? else {
        return Ok(());
    };
    let check = grades::validate_subject_grade_assignment(subject_name, level);
    if check.is_valid {
        return Ok(());
    }
    Err(ApiError::bad_request_with(
        "inappropriate_subject",
        check.message.clone(),
        json!(check),
    ))
}

fn reject_conflicts(conflicts: Vec<String>) -> Result<(), ApiError> {
    if conflicts.is_empty() {
        return Ok(());
    }
    Err(ApiError::bad_request_with(
        "timetable_conflict",
        conflicts.join(" "),
        json!({ "conflicts": conflicts }),
    ))
}

pub fn create_period(
    conn: &Connection,
    scope: &BranchScope,
    data: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let values = crud::validate(conn, &PERIODS, scope, data, WriteMode::Create)?;
    let merged = overlay(&PERIODS, None, &values);
    let proposed = proposed_from(&merged)?;
    check_grade(conn, scope, &merged, &proposed)?;
    reject_conflicts(conflicts::find_conflicts(conn, scope, &proposed, None)?)?;

    let id = crud::insert(conn, &PERIODS, scope, &values)?;
    info!(period_id = %id, section_id = %proposed.section_id, "period created");
    crud::get(conn, &PERIODS, scope, &id)
}

pub fn update_period(
    conn: &Connection,
    scope: &BranchScope,
    id: &str,
    data: &Map<String, JsonValue>,
    mode: WriteMode,
) -> Result<JsonValue, ApiError> {
    let existing = crud::get(conn, &PERIODS, scope, id)?;
    let values = crud::validate(conn, &PERIODS, scope, data, mode)?;
    if values.is_empty() {
        return Ok(existing);
    }
    let merged = overlay(&PERIODS, Some(&existing), &values);
    let proposed = proposed_from(&merged)?;
    check_grade(conn, scope, &merged, &proposed)?;
    reject_conflicts(conflicts::find_conflicts(conn, scope, &proposed, Some(id))?)?;

    crud::apply_update(conn, &PERIODS, scope, id, &values)?;
    crud::get(conn, &PERIODS, scope, id)
}

/// Dry-run of the create-time conflict check.
pub fn check_conflicts(
    conn: &Connection,
    scope: &BranchScope,
    params: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let proposed = proposed_from(params)?;
    let exclude = field_str(params, "excludeId");
    let conflicts = conflicts::find_conflicts(conn, scope, &proposed, exclude.as_deref())?;
    Ok(json!({
        "hasConflicts": !conflicts.is_empty(),
        "conflicts": conflicts,
    }))
}

fn parse_allocations(raw: Option<&JsonValue>) -> Result<Vec<Allocation>, ApiError> {
    let Some(items) = raw.and_then(|v| v.as_array()).filter(|a| !a.is_empty()) else {
        return Err(ApiError::field("allocations", "must be a non-empty array"));
    };
    let mut errors = FieldErrors::new();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match serde_json::from_value::<Allocation>(item.clone()) {
            Ok(a) => out.push(a),
            Err(e) => errors
                .entry(format!("allocations[{i}]"))
                .or_default()
                .push(e.to_string()),
        }
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn check_allocation_refs(
    conn: &Connection,
    scope: &BranchScope,
    allocations: &[Allocation],
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    for (i, a) in allocations.iter().enumerate() {
        let refs = [
            ("subjectId", Some(&a.subject_id), &SUBJECTS),
            ("teacherId", a.teacher_id.as_ref(), &STAFF),
            ("roomId", a.room_id.as_ref(), &ROOMS),
        ];
        for (field, id, resource) in refs {
            let Some(id) = id else { continue };
            if !crud::exists(conn, resource, scope, id)? {
                errors
                    .entry(format!("allocations[{i}].{field}"))
                    .or_default()
                    .push("not found".into());
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Replace a section's timetable for one academic year with a freshly shuffled layout.
///
/// Other sections' bookings are not consulted, so the result can double-book a
/// teacher or room across sections.
pub fn generate<R: Rng + ?Sized>(
    conn: &Connection,
    scope: &BranchScope,
    params: &Map<String, JsonValue>,
    rng: &mut R,
) -> Result<JsonValue, ApiError> {
    let section_id =
        field_str(params, "sectionId").ok_or_else(|| ApiError::field("sectionId", "is required"))?;
    let year_id = field_str(params, "academicYearId")
        .ok_or_else(|| ApiError::field("academicYearId", "is required"))?;
    if !crud::exists(conn, &SECTIONS, scope, &section_id)? {
        return Err(ApiError::not_found(SECTIONS.label));
    }
    if !crud::exists(conn, &ACADEMIC_YEARS, scope, &year_id)? {
        return Err(ApiError::field("academicYearId", "not found"));
    }
    let allocations = parse_allocations(params.get("allocations"))?;
    check_allocation_refs(conn, scope, &allocations)?;

    let placements = generator::generate(&allocations, rng).map_err(|e| match e {
        GenerateError::NotEnoughSlots {
            requested,
            available,
        } => ApiError::bad_request_with(
            "not_enough_slots",
            e.to_string(),
            json!({ "requested": requested, "available": available }),
        ),
        GenerateError::EmptyAllocation { index } => ApiError::field(
            &format!("allocations[{index}].periodsPerWeek"),
            "must be at least 1",
        ),
    })?;

    let tx = conn.unchecked_transaction()?;
    let mut stmt = tx.prepare(
        "SELECT id FROM timetable_periods WHERE section_id = ? AND academic_year_id = ?",
    )?;
    let old_ids = stmt
        .query_map([&section_id, &year_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);
    for old in &old_ids {
        crud::delete_cascade(&tx, &PERIODS, old)?;
    }

    let mut created = Vec::with_capacity(placements.len());
    for p in &placements {
        let opt = |v: &Option<String>| v.clone().map(Value::Text).unwrap_or(Value::Null);
        let values = [
            ("section_id", Value::Text(section_id.clone())),
            ("day_of_week", Value::Integer(i64::from(p.day_of_week))),
            ("period_number", Value::Integer(i64::from(p.period_number))),
            ("start_time", Value::Text(p.start_time.clone())),
            ("end_time", Value::Text(p.end_time.clone())),
            ("subject_id", Value::Text(p.subject_id.clone())),
            ("teacher_id", opt(&p.teacher_id)),
            ("room_id", opt(&p.room_id)),
            ("academic_year_id", Value::Text(year_id.clone())),
            ("is_break", Value::Integer(0)),
        ];
        let id = crud::insert(&tx, &PERIODS, scope, &values)?;
        created.push(crud::get(&tx, &PERIODS, scope, &id)?);
    }
    tx.commit()?;

    info!(
        section_id = %section_id,
        replaced = old_ids.len(),
        created = created.len(),
        "timetable generated"
    );
    Ok(json!({
        "data": created,
        "replaced": old_ids.len(),
        "total": created.len(),
    }))
}

#[derive(Debug, Clone, Copy)]
pub enum ScheduleOwner {
    Section,
    Teacher,
}

/// Weekly grid for a section or a teacher, ordered by (day, period).
pub fn schedule(
    conn: &Connection,
    scope: &BranchScope,
    owner: ScheduleOwner,
    owner_id: &str,
    academic_year_id: Option<&str>,
) -> Result<JsonValue, ApiError> {
    let (resource, column, key) = match owner {
        ScheduleOwner::Section => (&SECTIONS, "p.section_id", "sectionId"),
        ScheduleOwner::Teacher => (&STAFF, "p.teacher_id", "teacherId"),
    };
    if !crud::exists(conn, resource, scope, owner_id)? {
        return Err(ApiError::not_found(resource.label));
    }

    let mut sql = format!(
        "SELECT p.id, p.section_id, sec.name, p.day_of_week, p.period_number,
                p.start_time, p.end_time, p.is_break,
                p.subject_id, sub.name, p.teacher_id,
                CASE WHEN st.id IS NULL THEN NULL ELSE st.first_name || ' ' || st.last_name END,
                p.room_id, r.name, p.academic_year_id
         FROM timetable_periods p
         LEFT JOIN sections sec ON sec.id = p.section_id
         LEFT JOIN subjects sub ON sub.id = p.subject_id
         LEFT JOIN staff st ON st.id = p.teacher_id
         LEFT JOIN rooms r ON r.id = p.room_id
         WHERE {column} = ?"
    );
    let mut binds = vec![Value::Text(owner_id.to_string())];
    if let Some(year) = academic_year_id {
        sql.push_str(" AND p.academic_year_id = ?");
        binds.push(Value::Text(year.to_string()));
    }
    if let Some(branch) = &scope.branch_id {
        sql.push_str(" AND p.branch_id = ?");
        binds.push(Value::Text(branch.clone()));
    }
    sql.push_str(" ORDER BY p.day_of_week, p.period_number");

    let mut stmt = conn.prepare(&sql)?;
    let periods = stmt
        .query_map(params_from_iter(binds.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "sectionId": r.get::<_, String>(1)?,
                "sectionName": r.get::<_, Option<String>>(2)?,
                "dayOfWeek": r.get::<_, i64>(3)?,
                "periodNumber": r.get::<_, i64>(4)?,
                "startTime": r.get::<_, String>(5)?,
                "endTime": r.get::<_, String>(6)?,
                "isBreak": r.get::<_, i64>(7)? != 0,
                "subjectId": r.get::<_, Option<String>>(8)?,
                "subjectName": r.get::<_, Option<String>>(9)?,
                "teacherId": r.get::<_, Option<String>>(10)?,
                "teacherName": r.get::<_, Option<String>>(11)?,
                "roomId": r.get::<_, Option<String>>(12)?,
                "roomName": r.get::<_, Option<String>>(13)?,
                "academicYearId": r.get::<_, String>(14)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let days: Vec<JsonValue> = (1..=MAX_DAY_OF_WEEK)
        .filter_map(|d| {
            let of_day: Vec<&JsonValue> = periods
                .iter()
                .filter(|p| p["dayOfWeek"].as_i64() == Some(d))
                .collect();
            (!of_day.is_empty()).then(|| json!({ "dayOfWeek": d, "periods": of_day }))
        })
        .collect();

    let mut out = json!({
        "academicYearId": academic_year_id,
        "total": periods.len(),
        "days": days,
        "periods": periods,
    });
    out[key] = json!(owner_id);
    Ok(out)
}

/// Existing teaching periods whose subject is outside the class's grade range.
pub fn audit(
    conn: &Connection,
    scope: &BranchScope,
    academic_year_id: Option<&str>,
) -> Result<JsonValue, ApiError> {
    let mut sql = "SELECT p.id, p.section_id, sec.name, c.name, c.grade_level, sub.name,
                p.day_of_week, p.period_number
         FROM timetable_periods p
         JOIN subjects sub ON sub.id = p.subject_id
         JOIN sections sec ON sec.id = p.section_id
         JOIN classes c ON c.id = sec.class_id
         WHERE p.is_break = 0"
        .to_string();
    let mut binds = Vec::new();
    if let Some(year) = academic_year_id {
        sql.push_str(" AND p.academic_year_id = ?");
        binds.push(Value::Text(year.to_string()));
    }
    if let Some(branch) = &scope.branch_id {
        sql.push_str(" AND p.branch_id = ?");
        binds.push(Value::Text(branch.clone()));
    }
    sql.push_str(" ORDER BY sec.name, p.day_of_week, p.period_number");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds.iter()), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<i64>>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, i64>(6)?,
                r.get::<_, i64>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let checked = rows.len();
    let issues: Vec<JsonValue> = rows
        .into_iter()
        .filter_map(|(period_id, section_id, section, class, level, subject, day, number)| {
            let level = grades::resolve_grade_level(level, &class)?;
            let check = grades::validate_subject_grade_assignment(&subject, level);
            (!check.is_valid).then(|| {
                json!({
                    "periodId": period_id,
                    "sectionId": section_id,
                    "sectionName": section,
                    "className": class,
                    "subject": check.subject,
                    "gradeLevel": level,
                    "dayOfWeek": day,
                    "periodNumber": number,
                    "message": check.message,
                    "suggestion": check.suggestion,
                })
            })
        })
        .collect();

    Ok(json!({
        "checked": checked,
        "total": issues.len(),
        "issues": issues,
    }))
}

/// Table subjects allowed for a grade level given directly or via a class name.
pub fn appropriate_subjects(params: &Map<String, JsonValue>) -> Result<JsonValue, ApiError> {
    let explicit = params.get("gradeLevel").and_then(|v| match v {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    });
    let class_name = field_str(params, "className").unwrap_or_default();
    let level = grades::resolve_grade_level(explicit, &class_name).ok_or_else(|| {
        ApiError::field(
            "gradeLevel",
            format!("must be between {} and {}", grades::MIN_GRADE, grades::MAX_GRADE),
        )
    })?;
    Ok(json!({
        "gradeLevel": level,
        "gradeName": grades::grade_name(level),
        "subjects": grades::appropriate_subjects(level),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::resources::CLASSES;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn obj(v: JsonValue) -> Map<String, JsonValue> {
        v.as_object().cloned().expect("object")
    }

    struct Fixture {
        conn: Connection,
        scope: BranchScope,
        year: String,
        section: String,
        teacher: String,
        physics: String,
    }

    fn fixture(class_name: &str) -> Fixture {
        let conn = db::open_in_memory().expect("db");
        let scope = BranchScope::branch("a");
        let id = |v: JsonValue| v["id"].as_str().expect("id").to_string();
        let year = id(crud::create(
            &conn,
            &ACADEMIC_YEARS,
            &scope,
            &obj(json!({ "name": "2025-26", "startDate": "2025-04-01", "endDate": "2026-03-31" })),
        )
        .expect("year"));
        let class = id(crud::create(&conn, &CLASSES, &scope, &obj(json!({ "name": class_name })))
            .expect("class"));
        let section = id(crud::create(
            &conn,
            &SECTIONS,
            &scope,
            &obj(json!({ "classId": class, "name": "A" })),
        )
        .expect("section"));
        let teacher = id(crud::create(
            &conn,
            &STAFF,
            &scope,
            &obj(json!({ "firstName": "Marie", "lastName": "Curie" })),
        )
        .expect("teacher"));
        let physics = id(crud::create(
            &conn,
            &SUBJECTS,
            &scope,
            &obj(json!({ "code": "PHY", "name": "Physics" })),
        )
        .expect("subject"));
        Fixture {
            conn,
            scope,
            year,
            section,
            teacher,
            physics,
        }
    }

    fn period(f: &Fixture, n: i64) -> Map<String, JsonValue> {
        obj(json!({
            "sectionId": f.section,
            "dayOfWeek": 2,
            "periodNumber": n,
            "startTime": "08:00",
            "endTime": "08:45",
            "subjectId": f.physics,
            "teacherId": f.teacher,
            "academicYearId": f.year,
        }))
    }

    #[test]
    fn physics_is_rejected_for_a_young_class() {
        let f = fixture("Class 3");
        let err = create_period(&f.conn, &f.scope, &period(&f, 1)).expect_err("grade gate");
        assert_eq!(err.code(), "inappropriate_subject");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn second_period_in_same_slot_is_a_conflict() {
        let f = fixture("Class 9");
        create_period(&f.conn, &f.scope, &period(&f, 1)).expect("first");
        let err = create_period(&f.conn, &f.scope, &period(&f, 1)).expect_err("conflict");
        assert_eq!(err.code(), "timetable_conflict");
        let details = err.details().expect("details");
        let conflicts = details["conflicts"].as_array().expect("conflicts");
        assert!(conflicts.contains(&json!(conflicts::TEACHER_BUSY)));
        assert!(conflicts.contains(&json!(conflicts::SECTION_BUSY)));
    }

    #[test]
    fn dry_run_accepts_numeric_strings_like_the_write_path() {
        let f = fixture("Class 9");
        create_period(&f.conn, &f.scope, &period(&f, 3)).expect("first");
        let mut slot = period(&f, 3);
        slot.insert("dayOfWeek".into(), json!("2"));
        slot.insert("periodNumber".into(), json!(" 3 "));
        let out = check_conflicts(&f.conn, &f.scope, &slot).expect("check");
        assert_eq!(out["hasConflicts"], true);

        slot.insert("dayOfWeek".into(), json!("Tuesday"));
        let err = check_conflicts(&f.conn, &f.scope, &slot).expect_err("not a number");
        assert_eq!(err.details().expect("details")["dayOfWeek"][0], "must be an integer");
    }

    #[test]
    fn updating_a_period_in_place_is_not_a_self_conflict() {
        let f = fixture("Class 10");
        let p = create_period(&f.conn, &f.scope, &period(&f, 1)).expect("create");
        let id = p["id"].as_str().expect("id");
        let moved = update_period(
            &f.conn,
            &f.scope,
            id,
            &obj(json!({ "endTime": "08:40" })),
            WriteMode::Merge,
        )
        .expect("update");
        assert_eq!(moved["endTime"], "08:40");

        let err = update_period(
            &f.conn,
            &f.scope,
            id,
            &obj(json!({ "startTime": "09:00" })),
            WriteMode::Merge,
        )
        .expect_err("start after end");
        assert_eq!(err.status(), 422);
    }

    #[test]
    fn generate_replaces_the_section_timetable() {
        let f = fixture("Class 11");
        create_period(&f.conn, &f.scope, &period(&f, 1)).expect("manual period");
        let mut rng = StdRng::seed_from_u64(3);
        let params = obj(json!({
            "sectionId": f.section,
            "academicYearId": f.year,
            "allocations": [{ "subjectId": f.physics, "teacherId": f.teacher, "periodsPerWeek": 5 }],
        }));
        let out = generate(&f.conn, &f.scope, &params, &mut rng).expect("generate");
        assert_eq!(out["total"], 5);
        assert_eq!(out["replaced"], 1);

        let grid = schedule(&f.conn, &f.scope, ScheduleOwner::Section, &f.section, None)
            .expect("schedule");
        assert_eq!(grid["total"], 5);
    }

    #[test]
    fn generate_rejects_overbooking() {
        let f = fixture("Class 11");
        let mut rng = StdRng::seed_from_u64(3);
        let params = obj(json!({
            "sectionId": f.section,
            "academicYearId": f.year,
            "allocations": [{ "subjectId": f.physics, "periodsPerWeek": 49 }],
        }));
        let err = generate(&f.conn, &f.scope, &params, &mut rng).expect_err("too many");
        assert_eq!(err.to_string(), "Not enough time slots available.");
    }

    #[test]
    fn audit_flags_rows_written_around_the_validator() {
        let f = fixture("Class 2");
        f.conn
            .execute(
                "INSERT INTO timetable_periods(id, branch_id, section_id, day_of_week, period_number,
                    start_time, end_time, subject_id, academic_year_id, is_break, created_at, updated_at)
                 VALUES('legacy', 'a', ?, 1, 1, '08:00', '08:45', ?, ?, 0, 'now', 'now')",
                (&f.section, &f.physics, &f.year),
            )
            .expect("insert");
        let report = audit(&f.conn, &f.scope, None).expect("audit");
        assert_eq!(report["total"], 1);
        assert_eq!(report["issues"][0]["periodId"], "legacy");
    }

    #[test]
    fn appropriate_subjects_by_class_name() {
        let out = appropriate_subjects(&obj(json!({ "className": "Class 12" }))).expect("list");
        assert_eq!(out["gradeLevel"], 14);
        assert!(out["subjects"]
            .as_array()
            .expect("subjects")
            .contains(&json!("Physics")));
        assert!(appropriate_subjects(&obj(json!({ "gradeLevel": 40 }))).is_err());
    }
}
