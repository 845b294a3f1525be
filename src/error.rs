use serde::Serialize;

use crate::backend::BackendError;

pub const NETWORK_MESSAGE: &str = "Could not reach the server. Check your connection and try again.";
pub const TOAST_DURATION_MS: u64 = 5000;

/// Message priority: envelope `error`, then `message`, then the network text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorInfo {
            message: message.into(),
            description: None,
            code: None,
        }
    }

    pub fn toast_json(&self) -> serde_json::Value {
        let mut toast = serde_json::json!({
            "message": self.message,
            "durationMs": TOAST_DURATION_MS,
        });
        if let Some(d) = &self.description {
            toast["description"] = serde_json::json!(d);
        }
        toast
    }
}

impl From<&BackendError> for ErrorInfo {
    fn from(e: &BackendError) -> Self {
        match e {
            BackendError::Status { body, .. } => from_body(body.as_ref()),
            BackendError::Rejected(envelope) => {
                let body = serde_json::to_value(envelope).ok();
                from_body(body.as_ref())
            }
            BackendError::Network(_) | BackendError::Decode(_) => ErrorInfo::new(NETWORK_MESSAGE),
        }
    }
}

fn from_body(body: Option<&serde_json::Value>) -> ErrorInfo {
    let text = |key: &str| {
        body.and_then(|b| b.get(key))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let message = text("error")
        .or_else(|| text("message"))
        .unwrap_or_else(|| NETWORK_MESSAGE.to_string());
    let code = text("code");
    let description = code.as_deref().and_then(describe_code).map(str::to_string);
    ErrorInfo {
        message,
        description,
        code,
    }
}

/// Corrective hint for server-signalled domain conflicts.
pub fn describe_code(code: &str) -> Option<&'static str> {
    match code {
        "RESOURCE_IN_USE" => {
            Some("The record is still referenced elsewhere. Remove its assignments first.")
        }
        "PERMISSION_DENIED" => Some("You do not have permission to perform this action."),
        "DUPLICATE_CEDULA" => Some("Another active teacher already uses this cedula."),
        "DUPLICATE_CODE" => Some("Another active subject already uses this code."),
        "DUPLICATE_DOCUMENT" => Some("Another active student already uses this document."),
        "CLASSROOM_HAS_TUTOR" => {
            Some("The classroom already has a tutor. Update or remove the current tutor first.")
        }
        "SUBJECT_ALREADY_ASSIGNED" => {
            Some("That subject is already taught in this classroom.")
        }
        "CLASSROOM_FULL" => Some("The classroom has reached its capacity."),
        "NOT_FOUND" => Some("The record no longer exists. Refresh the list and try again."),
        _ => None,
    }
}
