//! The I/O seam: one `send` is exactly one network round trip.
//!
//! `UreqTransport` runs the blocking ureq agent on tokio's blocking pool so
//! the waiting call never parks a runtime worker. Non-2xx statuses come back
//! as data; only connection failures and timeouts are errors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;
use ureq::http::Response;
use ureq::{Body, RequestBuilder};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).send(request).await
    }
}

/// Production transport backed by `ureq`.
#[derive(Debug, Clone, Default)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        tokio::task::spawn_blocking(move || send_blocking(request))
            .await
            .map_err(|e| ApiError::Network(format!("transport task aborted: {e}")))?
    }
}

fn send_blocking(request: HttpRequest) -> Result<HttpResponse, ApiError> {
    // Status codes are the caller's to interpret.
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(request.timeout))
        .build()
        .new_agent();

    let url = request.url.as_str();
    let headers = &request.headers;
    let result = match request.method {
        HttpMethod::Get => without_body(with_headers(agent.get(url), headers), request.body),
        HttpMethod::Delete => without_body(with_headers(agent.delete(url), headers), request.body),
        HttpMethod::Post => send_body(with_headers(agent.post(url), headers), request.body),
        HttpMethod::Put => send_body(with_headers(agent.put(url), headers), request.body),
        HttpMethod::Patch => send_body(with_headers(agent.patch(url), headers), request.body),
    };

    let mut response = result.map_err(|e| ApiError::Network(format!("{url}: {e}")))?;
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
    // Async result sets routinely exceed ureq's default body limit.
    let body = response
        .body_mut()
        .with_config()
        .limit(u64::MAX)
        .read_to_vec()
        .map_err(|e| ApiError::Network(format!("{url}: reading body: {e}")))?;
    trace!(url, status, bytes = body.len(), "round trip complete");

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// GET and DELETE only carry a payload when the caller supplied one.
fn without_body(
    builder: RequestBuilder<ureq::typestate::WithoutBody>,
    body: Option<String>,
) -> Result<Response<Body>, ureq::Error> {
    match body {
        Some(body) => builder.force_send_body().send(body.as_bytes()),
        None => builder.call(),
    }
}

fn send_body(
    builder: RequestBuilder<ureq::typestate::WithBody>,
    body: Option<String>,
) -> Result<Response<Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}
