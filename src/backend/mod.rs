mod http;
mod local;

pub use http::HttpBackend;
pub use local::LocalBackend;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// One call against the REST contract. Queries keep this around so the cache
/// can replay it on refetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl BackendRequest {
    pub fn get(path: impl Into<String>) -> Self {
        BackendRequest {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_body(method: Method, path: impl Into<String>, body: serde_json::Value) -> Self {
        BackendRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        BackendRequest {
            method: Method::Delete,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// `{success, data, message, error, code}` response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Envelope {
    pub fn ok(data: serde_json::Value) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            ..Envelope::default()
        }
    }

    pub fn ok_with_message(data: Option<serde_json::Value>, message: impl Into<String>) -> Self {
        Envelope {
            success: true,
            data,
            message: Some(message.into()),
            ..Envelope::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response. `body` is the parsed error envelope when the server sent JSON.
    #[error("server responded with status {status}")]
    Status {
        status: u16,
        body: Option<serde_json::Value>,
    },

    #[error("could not decode response: {0}")]
    Decode(String),

    /// 2xx response whose envelope says `success: false`.
    #[error("request rejected by server")]
    Rejected(Envelope),
}

impl BackendError {
    pub fn status(status: u16, error: &str, code: &str) -> Self {
        BackendError::Status {
            status,
            body: Some(serde_json::json!({
                "success": false,
                "error": error,
                "code": code,
            })),
        }
    }

    pub fn not_found(what: &str) -> Self {
        BackendError::status(404, &format!("{} not found", what), "NOT_FOUND")
    }
}

pub trait Backend {
    fn kind(&self) -> &'static str;

    fn send(&self, request: &BackendRequest) -> Result<Envelope, BackendError>;
}
