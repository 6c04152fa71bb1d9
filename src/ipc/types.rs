use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Transport headers; only the branch headers are read.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

pub struct AppState {
    pub db: Connection,
    pub default_branch: Option<String>,
}
