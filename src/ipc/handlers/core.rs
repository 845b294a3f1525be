use crate::backend::{HttpBackend, LocalBackend};
use crate::ipc::error::{bad_params, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": state.backend.as_ref().map(|b| b.kind()),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "institutionId": state.config.institution,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return bad_params(&req.id, "missing params.path");
    };

    match LocalBackend::open(&path, state.config.institution) {
        Ok(backend) => {
            info!(workspace = %path.display(), "workspace selected");
            state.workspace = Some(path.clone());
            state.set_backend(Box::new(backend));
            ok(
                &req.id,
                json!({ "workspacePath": path.to_string_lossy(), "backend": "local" }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_backend_connect(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(base_url) = req
        .params
        .get("baseUrl")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return bad_params(&req.id, "missing params.baseUrl");
    };
    let timeout = req
        .params
        .get("timeoutSecs")
        .and_then(|v| v.as_u64())
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(state.config.request_timeout);

    match HttpBackend::new(base_url, timeout) {
        Ok(backend) => {
            info!(base_url = %backend.base_url(), "backend connected");
            let url = backend.base_url().to_string();
            state.workspace = None;
            state.set_backend(Box::new(backend));
            ok(&req.id, json!({ "baseUrl": url, "backend": "http" }))
        }
        Err(e) => err(&req.id, "backend_connect_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "backend.connect" => Some(handle_backend_connect(state, req)),
        _ => None,
    }
}
