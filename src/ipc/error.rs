use crate::error::ApiError;
use serde_json::json;
use tracing::{debug, error};

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

/// Problem-details body shared by the stdio envelope and the HTTP front end.
pub fn problem(e: &ApiError, instance: &str) -> serde_json::Value {
    let mut body = json!({
        "type": format!("urn:schoold:problem:{}", e.code()),
        "title": e.title(),
        "status": e.status(),
        "detail": e.to_string(),
        "instance": instance,
        "code": e.code(),
    });
    if let Some(d) = e.details() {
        body["details"] = d;
    }
    body
}

pub fn err(id: &str, e: &ApiError, instance: &str) -> serde_json::Value {
    json!({
        "id": id,
        "ok": false,
        "error": problem(e, instance),
    })
}

pub fn respond(
    id: &str,
    instance: &str,
    result: Result<serde_json::Value, ApiError>,
) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => {
            if e.status() >= 500 {
                error!(instance, error = %e, "request failed");
            } else {
                debug!(instance, code = e.code(), "request rejected");
            }
            err(id, &e, instance)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_carries_problem_fields() {
        let v = err("7", &ApiError::not_found("student"), "students.get");
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["status"], 404);
        assert_eq!(v["error"]["code"], "not_found");
        assert_eq!(v["error"]["detail"], "student not found");
        assert_eq!(v["error"]["type"], "urn:schoold:problem:not_found");
        assert!(v["error"].get("details").is_none());
    }
}
