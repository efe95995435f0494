//! Chooses between a direct round trip and the async job protocol.
//!
//! # Design
//! GETs of collections with unknown size are probed first: one synchronous
//! GET with a page size of 1, read only for its `X-Total-Count` header. At or
//! above the threshold the poller takes over on the same resource; below it a
//! single synchronous call is made. Every other request goes straight to the
//! executor. Errors propagate unchanged; nothing is retried.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cancel::CancellationReceiver;
use crate::credential::Credential;
use crate::error::ApiError;
use crate::executor::{Executor, REQUEST_TIMEOUT};
use crate::http::{HttpMethod, HttpResponse};
use crate::poller::{Poller, DEFAULT_POLL_INTERVAL};
use crate::transport::Transport;

pub const DEFAULT_ASYNC_THRESHOLD: u64 = 500;
pub const PAGE_SIZE_PARAM: &str = "max_results";
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// What the caller knows about the size of a GET result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volume {
    /// Probe the collection size before choosing a path.
    Unknown,
    Small,
    Large,
}

/// One call to make. Built per call and consumed by it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: HttpMethod,
    pub resource: String,
    pub org_scoped: bool,
    pub payload: Option<Value>,
    pub volume: Volume,
}

impl Request {
    pub fn new(method: HttpMethod, resource: impl Into<String>) -> Self {
        Self {
            method,
            resource: resource.into(),
            org_scoped: false,
            payload: None,
            volume: Volume::Small,
        }
    }

    /// Org-scoped GET of a collection whose size is not known up front.
    pub fn list(resource: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, resource)
            .in_org()
            .with_volume(Volume::Unknown)
    }

    pub fn in_org(mut self) -> Self {
        self.org_scoped = true;
        self
    }

    pub fn org_scoped(mut self, org_scoped: bool) -> Self {
        self.org_scoped = org_scoped;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.volume = volume;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub async_threshold: u64,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            async_threshold: DEFAULT_ASYNC_THRESHOLD,
            request_timeout: REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

enum Route {
    Sync,
    Async,
    /// The probe came back non-2xx; it is the answer.
    Settled(HttpResponse),
}

#[derive(Debug, Clone)]
pub struct Dispatcher<T> {
    executor: Executor<T>,
    config: DispatchConfig,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DispatchConfig::default())
    }

    pub fn with_config(transport: T, config: DispatchConfig) -> Self {
        Self {
            executor: Executor::new(transport).with_timeout(config.request_timeout),
            config,
        }
    }

    pub fn executor(&self) -> &Executor<T> {
        &self.executor
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub async fn call(&self, credential: &Credential, request: Request) -> Result<HttpResponse, ApiError> {
        self.call_with_cancellation(credential, request, &CancellationReceiver::none())
            .await
    }

    pub async fn call_with_cancellation(
        &self,
        credential: &Credential,
        request: Request,
        cancel: &CancellationReceiver,
    ) -> Result<HttpResponse, ApiError> {
        let url = credential.resolve(&request.resource, request.org_scoped)?;
        match self.route(credential, &request, cancel).await? {
            Route::Settled(response) => Ok(response),
            Route::Sync => {
                cancel
                    .guard(self.executor.execute(
                        credential,
                        request.method,
                        &url,
                        request.payload.as_ref(),
                    ))
                    .await?
            }
            Route::Async => {
                Poller::new(&self.executor)
                    .with_poll_interval(self.config.poll_interval)
                    .run(credential, &url, cancel)
                    .await
            }
        }
    }

    async fn route(
        &self,
        credential: &Credential,
        request: &Request,
        cancel: &CancellationReceiver,
    ) -> Result<Route, ApiError> {
        if request.method != HttpMethod::Get {
            return Ok(Route::Sync);
        }
        match request.volume {
            Volume::Small => Ok(Route::Sync),
            Volume::Large => Ok(Route::Async),
            Volume::Unknown => {
                let probe = self
                    .probe(credential, &request.resource, request.org_scoped, cancel)
                    .await?;
                let count = match probe {
                    Ok(count) => count,
                    Err(response) => return Ok(Route::Settled(response)),
                };
                let threshold = self.config.async_threshold;
                debug!(resource = %request.resource, count, threshold, "probed collection size");
                if count >= threshold {
                    Ok(Route::Async)
                } else {
                    Ok(Route::Sync)
                }
            }
        }
    }

    /// Total size of a collection, read from a one-item page.
    ///
    /// The inner `Err` carries a non-2xx probe response back to the caller.
    pub async fn probe(
        &self,
        credential: &Credential,
        resource: &str,
        org_scoped: bool,
        cancel: &CancellationReceiver,
    ) -> Result<Result<u64, HttpResponse>, ApiError> {
        let url = credential.resolve(&with_page_size(resource, 1), org_scoped)?;
        let response = cancel
            .guard(self.executor.execute(credential, HttpMethod::Get, &url, None))
            .await??;
        if !response.is_success() {
            return Ok(Err(response));
        }
        let count = response
            .header(TOTAL_COUNT_HEADER)
            .ok_or_else(|| ApiError::Protocol(format!("probe of {resource} has no X-Total-Count header")))?;
        let count = count
            .trim()
            .parse::<u64>()
            .map_err(|_| ApiError::Protocol(format!("X-Total-Count is not a count: {count:?}")))?;
        Ok(Ok(count))
    }
}

fn with_page_size(resource: &str, size: u32) -> String {
    let separator = if resource.contains('?') { '&' } else { '?' };
    format!("{resource}{separator}{PAGE_SIZE_PARAM}={size}")
}
