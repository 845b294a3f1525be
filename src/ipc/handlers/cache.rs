use crate::ipc::error::ok;
use crate::ipc::helpers::required_key;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_cache_inspect(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match required_key(req, "key") {
        Ok(k) => k,
        Err(e) => return e,
    };
    let Some(entry) = state.cache.entry(&key) else {
        return ok(&req.id, json!({ "key": key, "present": false }));
    };
    ok(
        &req.id,
        json!({
            "key": key,
            "present": true,
            "staleness": state.cache.staleness(&key),
            "fetchCount": entry.fetch_count(),
            "hasData": entry.data().is_some(),
        }),
    )
}

fn handle_cache_invalidate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let prefix = match required_key(req, "prefix") {
        Ok(k) => k,
        Err(e) => return e,
    };
    let hit = state.cache.invalidate(&prefix);
    ok(&req.id, json!({ "prefix": prefix, "invalidated": hit }))
}

fn handle_cache_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dropped = state.cache.len();
    state.cache.clear();
    ok(&req.id, json!({ "dropped": dropped }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "cache.inspect" => Some(handle_cache_inspect(state, req)),
        "cache.invalidate" => Some(handle_cache_invalidate(state, req)),
        "cache.clear" => Some(handle_cache_clear(state, req)),
        _ => None,
    }
}
