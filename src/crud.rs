//! Branch-scoped CRUD over the descriptors in `resources.rs`.
//!
//! Every read and write ANDs `branch_id = ?` when the scope carries a branch, so a
//! row from another branch is indistinguishable from a missing one.

use crate::error::{ApiError, FieldErrors};
use crate::query::ListQuery;
use crate::resources::{self, Column, Kind, OnDelete, Resource};
use crate::scope::BranchScope;
use chrono::{NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// PUT: required fields must be present.
    Replace,
    /// PATCH: only supplied fields change.
    Merge,
}

#[derive(Debug)]
pub struct Page {
    pub data: Vec<JsonValue>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "data": self.data,
            "total": self.total,
            "page": self.page,
            "perPage": self.per_page,
        })
    }
}

pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn select_columns(resource: &Resource) -> String {
    let mut cols = vec!["id", "branch_id"];
    cols.extend(resource.columns.iter().map(|c| c.column));
    cols.extend(["created_at", "updated_at"]);
    cols.join(", ")
}

fn row_to_json(resource: &Resource, row: &Row<'_>) -> rusqlite::Result<JsonValue> {
    let mut obj = Map::new();
    obj.insert("id".into(), json!(row.get::<_, String>(0)?));
    obj.insert("branchId".into(), json!(row.get::<_, Option<String>>(1)?));
    for (i, c) in resource.columns.iter().enumerate() {
        let idx = i + 2;
        let v = match c.kind {
            Kind::Integer | Kind::IntRange(..) => json!(row.get::<_, Option<i64>>(idx)?),
            Kind::Real => json!(row.get::<_, Option<f64>>(idx)?),
            Kind::Bool => json!(row.get::<_, Option<i64>>(idx)?.map(|v| v != 0)),
            Kind::Text | Kind::Date | Kind::Time | Kind::Enum(_) => {
                json!(row.get::<_, Option<String>>(idx)?)
            }
        };
        obj.insert(c.field.into(), v);
    }
    let base = resource.columns.len() + 2;
    obj.insert("createdAt".into(), json!(row.get::<_, String>(base)?));
    obj.insert("updatedAt".into(), json!(row.get::<_, String>(base + 1)?));
    Ok(JsonValue::Object(obj))
}

fn push_scope(scope: &BranchScope, clauses: &mut Vec<String>, binds: &mut Vec<Value>) {
    if let Some(branch) = &scope.branch_id {
        clauses.push("branch_id = ?".to_string());
        binds.push(Value::Text(branch.clone()));
    }
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

pub fn list(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    query: &ListQuery,
) -> Result<Page, ApiError> {
    let mut compiled = query.compile(resource);
    push_scope(scope, &mut compiled.clauses, &mut compiled.binds);
    let where_clause = where_sql(&compiled.clauses);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}{}", resource.table, where_clause),
        params_from_iter(compiled.binds.iter()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
        select_columns(resource),
        resource.table,
        where_clause,
        compiled.order_by
    );
    let mut binds = compiled.binds;
    binds.push(Value::Integer(i64::from(query.per_page)));
    binds.push(Value::Integer(query.offset() as i64));

    let mut stmt = conn.prepare(&sql)?;
    let data = stmt
        .query_map(params_from_iter(binds.iter()), |r| row_to_json(resource, r))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        data,
        total,
        page: query.page,
        per_page: query.per_page,
    })
}

pub fn find(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    id: &str,
) -> Result<Option<JsonValue>, ApiError> {
    let mut clauses = vec!["id = ?".to_string()];
    let mut binds = vec![Value::Text(id.to_string())];
    push_scope(scope, &mut clauses, &mut binds);
    let sql = format!(
        "SELECT {} FROM {}{}",
        select_columns(resource),
        resource.table,
        where_sql(&clauses)
    );
    let row = conn
        .query_row(&sql, params_from_iter(binds.iter()), |r| {
            row_to_json(resource, r)
        })
        .optional()?;
    Ok(row)
}

pub fn get(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    id: &str,
) -> Result<JsonValue, ApiError> {
    find(conn, resource, scope, id)?.ok_or_else(|| ApiError::not_found(resource.label))
}

pub fn exists(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    id: &str,
) -> Result<bool, ApiError> {
    let mut clauses = vec!["id = ?".to_string()];
    let mut binds = vec![Value::Text(id.to_string())];
    push_scope(scope, &mut clauses, &mut binds);
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {}{}", resource.table, where_sql(&clauses)),
            params_from_iter(binds.iter()),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn convert(kind: Kind, v: &JsonValue) -> Result<Value, String> {
    match kind {
        Kind::Text => v
            .as_str()
            .map(|s| Value::Text(s.trim().to_string()))
            .ok_or_else(|| "must be a string".to_string()),
        Kind::Integer => match v {
            JsonValue::Number(n) => n.as_i64().map(Value::Integer),
            JsonValue::String(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
            _ => None,
        }
        .ok_or_else(|| "must be an integer".to_string()),
        Kind::IntRange(min, max) => match convert(Kind::Integer, v)? {
            Value::Integer(i) if (min..=max).contains(&i) => Ok(Value::Integer(i)),
            _ => Err(format!("must be between {min} and {max}")),
        },
        Kind::Real => match v {
            JsonValue::Number(n) => n.as_f64().map(Value::Real),
            JsonValue::String(s) => s.trim().parse::<f64>().ok().map(Value::Real),
            _ => None,
        }
        .filter(|v| matches!(v, Value::Real(f) if f.is_finite()))
        .ok_or_else(|| "must be a number".to_string()),
        Kind::Bool => match v {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
        .map(|b| Value::Integer(i64::from(b)))
        .ok_or_else(|| "must be a boolean".to_string()),
        Kind::Date => v
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| "must be a YYYY-MM-DD date".to_string()),
        Kind::Time => v
            .as_str()
            .map(str::trim)
            .and_then(|s| {
                NaiveTime::parse_from_str(s, "%H:%M")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                    .ok()
            })
            .map(|t| Value::Text(t.format("%H:%M").to_string()))
            .ok_or_else(|| "must be an HH:MM time".to_string()),
        Kind::Enum(allowed) => v
            .as_str()
            .map(str::trim)
            .filter(|s| allowed.contains(s))
            .map(|s| Value::Text(s.to_string()))
            .ok_or_else(|| format!("must be one of {}", allowed.join(", "))),
    }
}

/// Validate a client body against the writable columns of `resource`.
///
/// Returns `(sql column, value)` pairs ready for insert/update; all field problems
/// are collected into a single `Validation` error.
pub fn validate(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    data: &Map<String, JsonValue>,
    mode: WriteMode,
) -> Result<Vec<(&'static str, Value)>, ApiError> {
    let mut errors = FieldErrors::new();
    let mut values = Vec::new();
    let mut push_err = |field: &str, msg: String| {
        errors.entry(field.to_string()).or_default().push(msg);
    };

    for col in resource.columns.iter().filter(|c| c.writable) {
        let needs_value = col.required && mode != WriteMode::Merge;
        let raw = match data.get(col.field) {
            None if needs_value => {
                push_err(col.field, "is required".into());
                continue;
            }
            None => continue,
            Some(JsonValue::Null) if col.required => {
                push_err(col.field, "is required".into());
                continue;
            }
            // Leave the column out so the schema default applies.
            Some(JsonValue::Null) if col.defaulted && mode == WriteMode::Create => continue,
            Some(JsonValue::Null) if col.defaulted => {
                push_err(col.field, "must not be null".into());
                continue;
            }
            Some(JsonValue::Null) => {
                values.push((col.column, Value::Null));
                continue;
            }
            Some(v) => v,
        };

        let value = match convert(col.kind, raw) {
            Ok(v) => v,
            Err(msg) => {
                push_err(col.field, msg);
                continue;
            }
        };
        if col.required && matches!(&value, Value::Text(s) if s.is_empty()) {
            push_err(col.field, "is required".into());
            continue;
        }
        if let Some(err) = check_reference(conn, col, scope, &value)? {
            push_err(col.field, err);
            continue;
        }
        values.push((col.column, value));
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn check_reference(
    conn: &Connection,
    col: &Column,
    scope: &BranchScope,
    value: &Value,
) -> Result<Option<String>, ApiError> {
    let (Some(target), Value::Text(id)) = (col.references, value) else {
        return Ok(None);
    };
    let Some(target) = resources::find(target) else {
        return Ok(None);
    };
    if id.is_empty() || !exists(conn, target, scope, id)? {
        return Ok(Some("not found".to_string()));
    }
    Ok(None)
}

/// Insert already-validated values, stamping id, branch and timestamps.
pub fn insert(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    values: &[(&'static str, Value)],
) -> Result<String, ApiError> {
    let id = Uuid::new_v4().to_string();
    let now = now_ts();

    let mut cols = vec!["id", "branch_id"];
    let mut binds = vec![
        Value::Text(id.clone()),
        scope
            .branch_id
            .clone()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    ];
    for (col, v) in values {
        cols.push(*col);
        binds.push(v.clone());
    }
    cols.extend(["created_at", "updated_at"]);
    binds.push(Value::Text(now.clone()));
    binds.push(Value::Text(now));

    let marks = vec!["?"; cols.len()].join(", ");
    conn.execute(
        &format!(
            "INSERT INTO {}({}) VALUES({})",
            resource.table,
            cols.join(", "),
            marks
        ),
        params_from_iter(binds.iter()),
    )?;
    Ok(id)
}

/// Update already-validated values on a row the caller has checked is in scope.
pub fn apply_update(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    id: &str,
    values: &[(&'static str, Value)],
) -> Result<usize, ApiError> {
    let mut set_parts: Vec<String> = values.iter().map(|(c, _)| format!("{c} = ?")).collect();
    let mut binds: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();
    set_parts.push("updated_at = ?".to_string());
    binds.push(Value::Text(now_ts()));

    let mut clauses = vec!["id = ?".to_string()];
    binds.push(Value::Text(id.to_string()));
    push_scope(scope, &mut clauses, &mut binds);

    let n = conn.execute(
        &format!(
            "UPDATE {} SET {}{}",
            resource.table,
            set_parts.join(", "),
            where_sql(&clauses)
        ),
        params_from_iter(binds.iter()),
    )?;
    Ok(n)
}

pub fn create(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    data: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let values = validate(conn, resource, scope, data, WriteMode::Create)?;
    let id = insert(conn, resource, scope, &values)?;
    get(conn, resource, scope, &id)
}

pub fn update(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    id: &str,
    data: &Map<String, JsonValue>,
    mode: WriteMode,
) -> Result<JsonValue, ApiError> {
    if !exists(conn, resource, scope, id)? {
        return Err(ApiError::not_found(resource.label));
    }
    let values = validate(conn, resource, scope, data, mode)?;
    if !values.is_empty() {
        apply_update(conn, resource, scope, id, &values)?;
    }
    get(conn, resource, scope, id)
}

pub fn delete(
    conn: &Connection,
    resource: &Resource,
    scope: &BranchScope,
    id: &str,
) -> Result<JsonValue, ApiError> {
    if !exists(conn, resource, scope, id)? {
        return Err(ApiError::not_found(resource.label));
    }
    let tx = conn.unchecked_transaction()?;
    delete_cascade(&tx, resource, id)?;
    tx.commit()?;
    Ok(json!({ "id": id }))
}

/// Remove `id` and everything that depends on it, children first.
pub fn delete_cascade(conn: &Connection, resource: &Resource, id: &str) -> Result<(), ApiError> {
    for child in resource.children {
        let Some(target) = resources::find(child.resource) else {
            continue;
        };
        match child.on_delete {
            OnDelete::Cascade => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id FROM {} WHERE {} = ?",
                    target.table, child.fk
                ))?;
                let child_ids = stmt
                    .query_map([id], |r| r.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                for cid in child_ids {
                    delete_cascade(conn, target, &cid)?;
                }
            }
            OnDelete::SetNull => {
                conn.execute(
                    &format!(
                        "UPDATE {} SET {} = NULL, updated_at = ? WHERE {} = ?",
                        target.table, child.fk, child.fk
                    ),
                    (now_ts(), id),
                )?;
            }
        }
    }
    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?", resource.table),
        [id],
    )?;
    Ok(())
}
