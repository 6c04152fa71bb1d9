mod attendance;
mod comms;
mod config;
mod crud;
mod db;
mod error;
mod fees;
mod http;
mod ipc;
mod query;
mod resources;
mod scope;
mod timetable;

use std::io::{self, BufRead, Write};

use config::{Config, Mode};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // stdout carries the protocol in stdio mode, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = Config::load()?;
    let conn = db::open_db(&config.db_path)?;
    info!(db = %config.db_path.display(), mode = ?config.mode, "database ready");

    let state = ipc::AppState {
        db: conn,
        default_branch: config.default_branch.clone(),
    };

    match config.mode {
        Mode::Stdio => run_stdio(state),
        Mode::Http => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(http::serve(state, config.port)),
    }
}

fn run_stdio(mut state: ipc::AppState) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to echo back.
                let e = error::ApiError::bad_request("bad_json", e.to_string());
                serde_json::json!({ "id": null, "ok": false, "error": ipc::problem(&e, "stdin") })
            }
        };
        writeln!(stdout, "{resp}")?;
        stdout.flush()?;
    }
    Ok(())
}
