//! Timeout-bounded transport
//!
//! A single HTTP round trip to the backend, raced against a hard deadline.

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use serde_json::Value as JsonValue;

use crate::core::{ClientError, ClientResult, Transport};

/// Default deadline for backend calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Outbound request: a method, an absolute URL and an optional JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<JsonValue>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: JsonValue) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Raw response as received from the backend
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON
    pub fn json(&self) -> ClientResult<JsonValue> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Server-supplied error message, or `"Unknown error"` if the body has none
    pub fn error_message(&self) -> String {
        self.json()
            .ok()
            .and_then(|body| {
                body.get("message")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// Send a request, failing with [`ClientError::Timeout`] once `timeout` elapses.
///
/// On expiry the in-flight call is dropped, which aborts it. The timer lives
/// inside the returned future and is released on every exit path.
pub async fn send_with_timeout(
    transport: &dyn Transport,
    request: HttpRequest,
    timeout: Duration,
) -> ClientResult<HttpResponse> {
    match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("Request timeout after {}ms", timeout.as_millis());
            Err(ClientError::Timeout(timeout))
        }
    }
}

/// Production transport backed by `reqwest`
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let mut builder = self.client.request(request.method, &request.url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(HttpResponse { status, body })
    }
}
