//! Single-round-trip request execution.
//!
//! # Design
//! `build_request` is pure: it turns a verb, URL and optional JSON payload
//! into an `HttpRequest` with JSON content negotiation, basic auth and the
//! request timeout. `execute` hands that request to the transport exactly
//! once. Status codes are returned as data and never retried here.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tracing::debug;

use crate::credential::Credential;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const JSON: &str = "application/json";

#[derive(Debug, Clone)]
pub struct Executor<T> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> Executor<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_request(
        &self,
        credential: &Credential,
        method: HttpMethod,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<HttpRequest, ApiError> {
        let body = payload
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers: vec![
                ("content-type".to_string(), JSON.to_string()),
                ("accept".to_string(), JSON.to_string()),
                ("authorization".to_string(), basic_auth(credential)),
            ],
            body,
            timeout: self.timeout,
        })
    }

    pub async fn execute(
        &self,
        credential: &Credential,
        method: HttpMethod,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<HttpResponse, ApiError> {
        let request = self.build_request(credential, method, url, payload)?;
        self.send(request).await
    }

    /// Send a prepared request; used by the poller for its submit leg.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = request.method.as_str();
        let url = request.url.clone();
        let response = self.transport.send(request).await?;
        debug!(method, url = %url, status = response.status, "request executed");
        Ok(response)
    }
}

fn basic_auth(credential: &Credential) -> String {
    let raw = format!("{}:{}", credential.identity(), credential.secret());
    format!("Basic {}", STANDARD.encode(raw))
}
