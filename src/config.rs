use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Stdio,
    Http,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Mode::Stdio),
            "http" => Ok(Mode::Http),
            other => Err(format!("unknown mode '{other}', expected stdio or http")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub mode: Mode,
    pub port: u16,
    /// Branch used when a request carries neither X-Branch-Id nor X-Tenant-Id.
    pub default_branch: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            db_path: PathBuf::from(try_load::<String>("SCHOOLD_DB_PATH", "schoold.sqlite3")?),
            mode: try_load("SCHOOLD_MODE", "stdio")?,
            port: try_load("SCHOOLD_PORT", "8080")?,
            default_branch: var("SCHOOLD_DEFAULT_BRANCH")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse::<T>()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow::anyhow!("{e}")
        })
        .with_context(|| format!("environment variable {key} is misconfigured"))
}
