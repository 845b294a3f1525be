use std::time::Instant;

use crate::ipc::error::{bad_params, ok};
use crate::ipc::types::{AppState, Request};
use crate::modal::LockState;
use serde_json::json;

fn dialog_id(req: &Request) -> Result<&str, serde_json::Value> {
    req.params
        .get("dialogId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_params(&req.id, "missing params.dialogId"))
}

/// What the shell applies after every modal call. `scrollTo` is handed out
/// once; later calls return null until the next release.
fn modal_view(state: &mut AppState, changed: Option<bool>) -> serde_json::Value {
    let now = Instant::now();
    let modals = &mut state.modals;
    let scroll_to = modals.surface_mut().take_restore();
    let mut view = json!({
        "openCount": modals.open_count(),
        "locked": modals.state() == LockState::Locked,
        "settled": modals.is_settled(now),
        "settleRemainingMs": modals.settle_remaining(now).as_millis() as u64,
        "body": modals.surface().body(),
        "scrollTo": scroll_to,
        "mounted": modals.mounted().collect::<Vec<_>>(),
    });
    if let Some(changed) = changed {
        view["changed"] = json!(changed);
    }
    view
}

/// Records where the page is before a dialog captures it.
fn report_scroll(state: &mut AppState, req: &Request) {
    if let Some(y) = req.params.get("scrollY").and_then(|v| v.as_i64()) {
        state.modals.surface_mut().report_scroll(y);
    }
}

fn handle_modal_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match dialog_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    report_scroll(state, req);
    let changed = state.modals.mount(id);
    ok(&req.id, modal_view(state, Some(changed)))
}

fn handle_modal_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match dialog_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let changed = state.modals.unmount(id);
    ok(&req.id, modal_view(state, Some(changed)))
}

fn handle_modal_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    report_scroll(state, req);
    ok(&req.id, modal_view(state, None))
}

fn handle_modal_force_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.modals.force_reset();
    ok(&req.id, modal_view(state, None))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "modal.open" => Some(handle_modal_open(state, req)),
        "modal.close" => Some(handle_modal_close(state, req)),
        "modal.status" => Some(handle_modal_status(state, req)),
        "modal.forceReset" => Some(handle_modal_force_reset(state, req)),
        _ => None,
    }
}
