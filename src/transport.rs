//! Transport Module
//!
//! The outbound HTTP seam. The dispatch pipeline drives a `Transport` trait
//! object, so tests can swap the real reqwest-backed client for a scripted
//! fake without touching the orchestration logic.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{FetchError, Result};
use crate::request::{Method, RequestDescriptor};

// == Transport Reply ==
/// Raw outcome of one network attempt, before status classification.
///
/// Any HTTP status counts as a reply here; turning 4xx/5xx into errors is
/// the dispatch pipeline's job.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

// == Transport ==
/// Executes a single attempt of a request.
///
/// Implementations surface only transport-level failures (DNS, connection
/// reset, protocol errors). Timeouts and cancellation are enforced around
/// this call, not inside it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &RequestDescriptor) -> Result<TransportReply>;
}

// == HTTP Transport ==
/// Production transport backed by a shared `reqwest::Client`.
///
/// The client carries no timeout of its own; per-attempt timeouts are applied
/// by the caller so retry accounting stays in one place.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    // == Constructor ==
    /// Builds the shared HTTP client.
    ///
    /// # Errors
    /// Returns `FetchError::Internal` when the TLS backend fails to
    /// initialize.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| FetchError::Internal(format!("failed to build http client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &RequestDescriptor) -> Result<TransportReply> {
        let timeout_ms = request.timeout.as_millis() as u64;
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(timeout_ms)
            } else {
                FetchError::Network(e.to_string())
            }
        };

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(map_err)?;

        let status = response.status().as_u16();
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
        let body = response.bytes().await.map_err(map_err)?;

        Ok(TransportReply {
            status,
            headers,
            body,
        })
    }
}

// == Method Mapping ==
fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_mapping() {
        assert_eq!(to_reqwest_method(Method::Get), reqwest::Method::GET);
        assert_eq!(to_reqwest_method(Method::Post), reqwest::Method::POST);
        assert_eq!(to_reqwest_method(Method::Put), reqwest::Method::PUT);
        assert_eq!(to_reqwest_method(Method::Delete), reqwest::Method::DELETE);
        assert_eq!(to_reqwest_method(Method::Patch), reqwest::Method::PATCH);
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new().is_ok());
    }
}
