//! The `http` capability injected into scripts
//!
//! Synchronous on purpose: scripts are synchronous and run on the
//! blocking pool. Transport failures never raise inside the script;
//! they come back as a response object with `error` set, so scripts
//! can degrade without try/except plumbing.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

static SHARED: LazyLock<HttpClient> = LazyLock::new(HttpClient::new);

/// The process-wide client shared by both engines.
pub(crate) fn shared() -> &'static HttpClient {
    &SHARED
}

/// Result of a script-initiated HTTP call.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
    pub error: String,
}

impl HttpResponse {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }

    /// The shape scripts see: `{status_code, body, headers, error}`.
    pub fn to_json(&self) -> Value {
        json!({
            "status_code": self.status_code,
            "body": self.body,
            "headers": self.headers,
            "error": self.error,
        })
    }
}

/// Blocking HTTP client with the script-facing timeout.
pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self { client }
    }

    /// Perform a GET request.
    pub fn get(&self, url: &str, headers: &HashMap<String, String>) -> HttpResponse {
        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        Self::finish(url, request.send())
    }

    /// Perform a POST request. `Content-Type` defaults to
    /// `application/json` unless the script set one.
    pub fn post(&self, url: &str, headers: &HashMap<String, String>, body: &str) -> HttpResponse {
        let mut request = self.client.post(url).body(body.to_string());
        for (key, value) in headers {
            request = request.header(key, value);
        }
        if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
            request = request.header("Content-Type", "application/json");
        }
        Self::finish(url, request.send())
    }

    fn finish(
        url: &str,
        result: std::result::Result<reqwest::blocking::Response, reqwest::Error>,
    ) -> HttpResponse {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "script", url, error = %e, "http request failed");
                return HttpResponse::failed(e.to_string());
            }
        };

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        match response.text() {
            Ok(body) => HttpResponse {
                status_code,
                body,
                headers,
                error: String::new(),
            },
            Err(e) => HttpResponse {
                status_code,
                headers,
                error: e.to_string(),
                ..HttpResponse::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_populates_error() {
        // Nothing listens on this port; the call must come back as a
        // response object, not a panic or an Err.
        let response = shared().get("http://127.0.0.1:1/unreachable", &HashMap::new());
        assert_eq!(response.status_code, 0);
        assert!(!response.error.is_empty());
    }

    #[test]
    fn test_response_json_shape() {
        let response = HttpResponse {
            status_code: 200,
            body: "ok".into(),
            headers: HashMap::from([("content-type".to_string(), "text/plain".to_string())]),
            error: String::new(),
        };

        let value = response.to_json();
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["body"], "ok");
        assert_eq!(value["headers"]["content-type"], "text/plain");
        assert_eq!(value["error"], "");
    }
}
