use crate::crud;
use crate::error::ApiError;
use crate::resources::TEMPLATES;
use crate::scope::BranchScope;
use rusqlite::Connection;
use serde_json::{json, Map, Value as JsonValue};

/// Substitute `{{name}}` placeholders. Unknown names are left in place and returned
/// (deduplicated, in order of first appearance).
pub fn render(text: &str, vars: &Map<String, JsonValue>) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut missing: Vec<String> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return (out, missing);
        };
        let name = after[..close].trim();
        let value = vars.get(name).and_then(|v| match v {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(b.to_string()),
            _ => None,
        });
        match value {
            Some(v) if !name.is_empty() => out.push_str(&v),
            _ => {
                out.push_str(&rest[open..open + 2 + close + 2]);
                if !name.is_empty() && !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
            }
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    (out, missing)
}

pub fn render_template(
    conn: &Connection,
    scope: &BranchScope,
    id: &str,
    vars: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let template = crud::get(conn, &TEMPLATES, scope, id)?;
    let (subject, mut missing) = match template["subject"].as_str() {
        Some(s) => {
            let (text, missing) = render(s, vars);
            (Some(text), missing)
        }
        None => (None, Vec::new()),
    };
    let (body, body_missing) = render(template["body"].as_str().unwrap_or_default(), vars);
    for m in body_missing {
        if !missing.contains(&m) {
            missing.push(m);
        }
    }
    Ok(json!({
        "id": id,
        "channel": template["channel"],
        "subject": subject,
        "body": body,
        "missing": missing,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(v: JsonValue) -> Map<String, JsonValue> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn fills_known_names_and_reports_the_rest() {
        let (text, missing) = render(
            "Dear {{ guardian }}, {{student}} owes {{amount}} by {{dueDate}}. {{student}}!",
            &vars(json!({ "guardian": "Mrs Rao", "student": "Anu", "amount": 1200 })),
        );
        assert_eq!(text, "Dear Mrs Rao, Anu owes 1200 by {{dueDate}}. Anu!");
        assert_eq!(missing, vec!["dueDate"]);
    }

    #[test]
    fn unterminated_and_empty_braces_pass_through() {
        let (text, missing) = render("a {{}} b {{open", &Map::new());
        assert_eq!(text, "a {{}} b {{open");
        assert!(missing.is_empty());
    }

    #[test]
    fn renders_a_stored_template() {
        let conn = crate::db::open_in_memory().expect("db");
        let scope = BranchScope::branch("a");
        let t = crud::create(
            &conn,
            &TEMPLATES,
            &scope,
            &vars(json!({
                "name": "fee reminder",
                "channel": "sms",
                "subject": "Fees for {{student}}",
                "body": "Pay {{amount}} for {{student}} ({{term}})",
            })),
        )
        .expect("template");
        let id = t["id"].as_str().expect("id");
        let values = vars(json!({ "student": "Anu", "amount": 5 }));
        let out = render_template(&conn, &scope, id, &values).expect("render");
        assert_eq!(out["subject"], "Fees for Anu");
        assert_eq!(out["body"], "Pay 5 for Anu ({{term}})");
        assert_eq!(out["missing"], json!(["term"]));
        assert!(render_template(&conn, &BranchScope::branch("b"), id, &Map::new()).is_err());
    }
}
