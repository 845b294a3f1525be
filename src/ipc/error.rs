use serde_json::json;

use crate::error::ErrorInfo;
use crate::validation::ValidationErrors;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn bad_params(id: &str, message: impl Into<String>) -> serde_json::Value {
    err(id, "bad_params", message, None)
}

pub fn no_backend(id: &str) -> serde_json::Value {
    err(
        id,
        "no_backend",
        "select a workspace or connect a backend first",
        None,
    )
}

pub fn validation_failed(id: &str, errors: &ValidationErrors) -> serde_json::Value {
    err(
        id,
        "validation_failed",
        "some fields need attention",
        Some(json!({ "fields": errors.to_json() })),
    )
}

/// A failed write: the toast to show, and proof that nothing was invalidated.
pub fn mutation_failed(id: &str, info: &ErrorInfo) -> serde_json::Value {
    err(
        id,
        "mutation_failed",
        info.message.clone(),
        Some(json!({
            "toast": info.toast_json(),
            "code": info.code,
            "invalidated": [],
        })),
    )
}

pub fn query_failed(id: &str, status: Option<u16>, info: &ErrorInfo) -> serde_json::Value {
    let code = if status == Some(404) {
        "not_found"
    } else {
        "query_failed"
    };
    err(
        id,
        code,
        info.message.clone(),
        Some(json!({
            "toast": info.toast_json(),
            "code": info.code,
            "status": status,
        })),
    )
}
