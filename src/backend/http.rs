use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use tracing::debug;

use super::{Backend, BackendError, BackendRequest, Envelope, Method};

/// REST backend reached over HTTP.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(HttpBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

impl Backend for HttpBackend {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn send(&self, request: &BackendRequest) -> Result<Envelope, BackendError> {
        debug!(method = request.method.as_str(), path = %request.path, "backend request");

        let mut builder = self
            .client
            .request(to_reqwest(request.method), self.url(&request.path))
            .header(USER_AGENT, format!("schoold/{}", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            // Error bodies are best-effort; a proxy may answer with HTML.
            let body = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope =
            serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(BackendError::Rejected(envelope));
        }
        Ok(envelope)
    }
}
