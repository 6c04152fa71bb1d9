//! List-query normalization: loosely typed `page`/`perPage`/`sort`/`filter`/`ids`/`q`
//! parameters in, whitelisted SQL fragments out.

use crate::resources::{Kind, Resource};
use rusqlite::types::Value;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

pub const DEFAULT_PER_PAGE: u32 = 25;
pub const MAX_PER_PAGE: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub sort: Option<Sort>,
    pub filter: Map<String, JsonValue>,
    pub ids: Vec<String>,
    pub q: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort: None,
            filter: Map::new(),
            ids: Vec::new(),
            q: None,
        }
    }
}

/// Where-clauses and binds for one list query. Clauses are ANDed by the caller.
#[derive(Debug, Default)]
pub struct Compiled {
    pub clauses: Vec<String>,
    pub binds: Vec<Value>,
    pub order_by: String,
}

fn parse_u32(v: Option<&JsonValue>) -> Option<u32> {
    match v? {
        JsonValue::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        JsonValue::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn parse_sort(params: &JsonValue) -> Option<Sort> {
    let raw = params.get("sort")?.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    // Admin clients send `["name","DESC"]`; everything else sends `name` or `-name`.
    let (field, mut descending) = if raw.starts_with('[') {
        let pair: Vec<String> = serde_json::from_str(raw).ok()?;
        let field = pair.first()?.clone();
        let desc = pair
            .get(1)
            .map(|o| o.eq_ignore_ascii_case("desc"))
            .unwrap_or(false);
        (field, desc)
    } else if let Some(f) = raw.strip_prefix('-') {
        (f.to_string(), true)
    } else {
        (raw.trim_start_matches('+').to_string(), false)
    };

    if let Some(order) = params.get("order").and_then(|v| v.as_str()) {
        match order.trim().to_ascii_lowercase().as_str() {
            "asc" => descending = false,
            "desc" => descending = true,
            _ => {}
        }
    }

    let field = field.trim().to_string();
    if field.is_empty() {
        return None;
    }
    Some(Sort { field, descending })
}

fn parse_filter(v: Option<&JsonValue>) -> Map<String, JsonValue> {
    match v {
        Some(JsonValue::Object(obj)) => obj.clone(),
        Some(JsonValue::String(s)) if !s.trim().is_empty() => {
            match serde_json::from_str::<JsonValue>(s) {
                Ok(JsonValue::Object(obj)) => obj,
                Ok(_) => {
                    debug!(filter = %s, "filter is not a JSON object, ignoring");
                    Map::new()
                }
                Err(e) => {
                    debug!(filter = %s, error = %e, "filter is not valid JSON, ignoring");
                    Map::new()
                }
            }
        }
        _ => Map::new(),
    }
}

fn parse_ids(v: Option<&JsonValue>) -> Vec<String> {
    match v {
        Some(JsonValue::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

impl ListQuery {
    pub fn from_params(params: &JsonValue) -> Self {
        let page = parse_u32(params.get("page"))
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let per_page = ["perPage", "pageSize", "limit"]
            .iter()
            .find_map(|k| parse_u32(params.get(*k)))
            .filter(|n| *n >= 1)
            .unwrap_or(DEFAULT_PER_PAGE)
            .min(MAX_PER_PAGE);

        let mut filter = parse_filter(params.get("filter"));
        let q = params
            .get("q")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                filter
                    .remove("q")
                    .and_then(|v| v.as_str().map(str::to_string))
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        ListQuery {
            page,
            per_page,
            sort: parse_sort(params),
            filter,
            ids: parse_ids(params.get("ids")),
            q,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    /// Whitelist fields against `resource` and turn the query into SQL fragments.
    pub fn compile(&self, resource: &Resource) -> Compiled {
        let mut out = Compiled::default();

        for (field, value) in &self.filter {
            let Some(column) = column_for(resource, field) else {
                warn!(resource = resource.name, field = %field, "dropping unknown filter field");
                continue;
            };
            match value {
                JsonValue::Null => out.clauses.push(format!("{column} IS NULL")),
                JsonValue::Array(items) => {
                    let binds: Vec<Value> = items.iter().filter_map(scalar_value).collect();
                    if binds.is_empty() {
                        out.clauses.push("0 = 1".to_string());
                        continue;
                    }
                    let marks = vec!["?"; binds.len()].join(", ");
                    out.clauses.push(format!("{column} IN ({marks})"));
                    out.binds.extend(binds);
                }
                other => match scalar_value(other) {
                    Some(v) => {
                        out.clauses.push(format!("{column} = ?"));
                        out.binds.push(v);
                    }
                    None => {
                        warn!(
                            resource = resource.name,
                            field = %field,
                            "dropping non-scalar filter value"
                        );
                    }
                },
            }
        }

        if !self.ids.is_empty() {
            let marks = vec!["?"; self.ids.len()].join(", ");
            out.clauses.push(format!("id IN ({marks})"));
            out.binds
                .extend(self.ids.iter().cloned().map(Value::Text));
        }

        if let Some(q) = &self.q {
            let columns: Vec<&str> = resource
                .search
                .iter()
                .filter_map(|f| resource.column(f))
                .map(|c| c.column)
                .collect();
            if !columns.is_empty() {
                let pattern = format!("%{}%", escape_like(&q.to_lowercase()));
                let ors: Vec<String> = columns
                    .iter()
                    .map(|c| format!("LOWER({c}) LIKE ? ESCAPE '\\'"))
                    .collect();
                out.clauses.push(format!("({})", ors.join(" OR ")));
                out.binds
                    .extend(columns.iter().map(|_| Value::Text(pattern.clone())));
            }
        }

        out.order_by = self.order_by(resource);
        out
    }

    fn order_by(&self, resource: &Resource) -> String {
        let requested = self.sort.as_ref().and_then(|s| {
            let col = column_for(resource, &s.field);
            if col.is_none() {
                warn!(
                    resource = resource.name,
                    field = %s.field,
                    fallback = resource.default_sort,
                    "unknown sort field, using default sort"
                );
            }
            col.map(|c| (s.field.as_str(), c, s.descending))
        });
        let (field, column, descending) = requested.unwrap_or_else(|| {
            let col = column_for(resource, resource.default_sort).unwrap_or("created_at");
            (resource.default_sort, col, false)
        });
        let collate = match resource.column(field).map(|c| c.kind) {
            Some(Kind::Text) => " COLLATE NOCASE",
            _ => "",
        };
        let dir = if descending { "DESC" } else { "ASC" };
        format!("{column}{collate} {dir}, id ASC")
    }
}

/// Map an api field to its SQL column; `id`, `createdAt` and `updatedAt` exist on every table.
pub fn column_for(resource: &Resource, field: &str) -> Option<&'static str> {
    match field {
        "id" => Some("id"),
        "createdAt" => Some("created_at"),
        "updatedAt" => Some("updated_at"),
        _ => resource.column(field).map(|c| c.column),
    }
}

fn scalar_value(v: &JsonValue) -> Option<Value> {
    match v {
        JsonValue::String(s) => Some(Value::Text(s.clone())),
        JsonValue::Bool(b) => Some(Value::Integer(i64::from(*b))),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Real)),
        _ => None,
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::STUDENTS;
    use serde_json::json;

    #[test]
    fn defaults_when_params_are_missing_or_garbage() {
        let q = ListQuery::from_params(&json!({ "page": "abc", "perPage": -3 }));
        assert_eq!(q.page, 1);
        assert_eq!(q.per_page, DEFAULT_PER_PAGE);
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn page_size_alias_and_clamp() {
        let q = ListQuery::from_params(&json!({ "page": "3", "pageSize": 10 }));
        assert_eq!((q.page, q.per_page), (3, 10));
        assert_eq!(q.offset(), 20);
        let big = ListQuery::from_params(&json!({ "perPage": 100000 }));
        assert_eq!(big.per_page, MAX_PER_PAGE);
    }

    #[test]
    fn sort_prefix_and_order_override() {
        let q = ListQuery::from_params(&json!({ "sort": "-lastName" }));
        assert_eq!(
            q.sort,
            Some(Sort {
                field: "lastName".into(),
                descending: true
            })
        );
        let q = ListQuery::from_params(&json!({ "sort": "lastName", "order": "DESC" }));
        assert!(q.sort.expect("sort").descending);
        let q = ListQuery::from_params(&json!({ "sort": "[\"firstName\",\"DESC\"]" }));
        assert_eq!(q.sort.expect("sort").field, "firstName");
    }

    #[test]
    fn unknown_sort_field_falls_back_to_default() {
        let q = ListQuery::from_params(&json!({ "sort": "-password" }));
        let compiled = q.compile(&STUDENTS);
        assert_eq!(compiled.order_by, "last_name COLLATE NOCASE ASC, id ASC");
    }

    #[test]
    fn invalid_filter_json_is_an_empty_filter() {
        let q = ListQuery::from_params(&json!({ "filter": "{not json" }));
        assert!(q.filter.is_empty());
        let q = ListQuery::from_params(&json!({ "filter": "[1,2]" }));
        assert!(q.filter.is_empty());
    }

    #[test]
    fn filter_keys_are_whitelisted() {
        let q = ListQuery::from_params(&json!({
            "filter": "{\"status\":\"active\",\"1=1; DROP TABLE students\":1,\"classId\":[\"a\",\"b\"],\"sectionId\":null}"
        }));
        let compiled = q.compile(&STUDENTS);
        assert_eq!(compiled.clauses.len(), 3);
        assert!(compiled.clauses.contains(&"status = ?".to_string()));
        assert!(compiled.clauses.contains(&"class_id IN (?, ?)".to_string()));
        assert!(compiled.clauses.contains(&"section_id IS NULL".to_string()));
        assert_eq!(compiled.binds.len(), 3);
    }

    #[test]
    fn ids_and_free_text_search() {
        let q = ListQuery::from_params(&json!({ "ids": "a, b,,c", "filter": { "q": "50%" } }));
        assert_eq!(q.ids, vec!["a", "b", "c"]);
        assert_eq!(q.q.as_deref(), Some("50%"));
        let compiled = q.compile(&STUDENTS);
        let search = compiled.clauses.last().expect("search clause");
        assert_eq!(search.matches(" OR ").count(), STUDENTS.search.len() - 1);
        assert_eq!(
            compiled.binds.last(),
            Some(&Value::Text("%50\\%%".to_string()))
        );
    }
}
