use std::collections::BTreeMap;

use rusqlite::ErrorCode;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

/// Per-field validation messages, keyed by the api field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest {
        code: &'static str,
        message: String,
        details: Option<JsonValue>,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("request validation failed")]
    Validation(FieldErrors),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request_with(
        code: &'static str,
        message: impl Into<String>,
        details: JsonValue,
    ) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(what.into())
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
        ApiError::Validation(errors)
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::NotFound(_) | ApiError::UnknownMethod(_) => 404,
            ApiError::Conflict { .. } => 409,
            ApiError::Validation(_) => 422,
            ApiError::Database(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } => code,
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict { code, .. } => code,
            ApiError::Validation(_) => "validation_error",
            ApiError::UnknownMethod(_) => "not_implemented",
            ApiError::Database(_) => "db_error",
        }
    }

    pub fn title(&self) -> &'static str {
        match self.status() {
            400 => "Bad Request",
            404 => "Not Found",
            409 => "Conflict",
            422 => "Unprocessable Entity",
            _ => "Internal Server Error",
        }
    }

    pub fn details(&self) -> Option<JsonValue> {
        match self {
            ApiError::BadRequest { details, .. } => details.clone(),
            ApiError::Validation(fields) => Some(json!(fields)),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::QueryReturnedNoRows => ApiError::NotFound("record".to_string()),
            rusqlite::Error::SqliteFailure(f, msg) if f.code == ErrorCode::ConstraintViolation => {
                let detail = msg.clone().unwrap_or_else(|| e.to_string());
                match f.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ApiError::conflict(
                        "duplicate",
                        format!("record already exists ({detail})"),
                    ),
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ApiError::bad_request(
                        "invalid_reference",
                        "referenced record does not exist",
                    ),
                    _ => ApiError::bad_request("constraint_violation", detail),
                }
            }
            _ => ApiError::Database(e),
        }
    }
}
