mod backend;
mod cache;
mod config;
mod db;
mod error;
mod ipc;
mod keys;
mod logging;
mod modal;
mod model;
mod mutation;
mod plans;
mod registration;
mod resources;
mod validation;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use tracing::{error, info, warn};

fn main() -> ExitCode {
    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            logging::init_logging("info", logging::LogFormat::Compact);
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    logging::init_logging(&config.log_level, config.log_format);
    info!(version = env!("CARGO_PKG_VERSION"), "schoold starting");

    let mut state = ipc::AppState::new(config);
    if let Some(url) = state.config.backend_url.clone() {
        match backend::HttpBackend::new(&url, state.config.request_timeout) {
            Ok(b) => {
                info!(base_url = %url, "backend connected");
                state.set_backend(Box::new(b));
            }
            Err(e) => warn!(base_url = %url, error = %e, "could not set up backend"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, shutting down");
    ExitCode::SUCCESS
}
