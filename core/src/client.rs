//! Typed label and workload operations on top of the dispatcher.
//!
//! # Design
//! Each operation builds a `Request`, lets the dispatcher pick the sync or
//! async path, and hands the normalized response to a `parse_*` function.
//! The parse half is pure and interprets status codes; the call path never
//! does.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancellationReceiver;
use crate::credential::Credential;
use crate::dispatcher::{Dispatcher, Request};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse};
use crate::transport::Transport;
use crate::types::{CreateLabel, Label, LabelIndex, LabelRef, UnmanagedWorkload, UpdateLabel, Workload, WorkloadLabels};

/// Label and workload client. Credentials are passed to every call.
#[derive(Debug, Clone)]
pub struct PceClient<T> {
    dispatcher: Dispatcher<T>,
    cancel: CancellationReceiver,
    call_timeout: Option<Duration>,
}

impl<T: Transport> PceClient<T> {
    pub fn new(dispatcher: Dispatcher<T>) -> Self {
        Self {
            dispatcher,
            cancel: CancellationReceiver::none(),
            call_timeout: None,
        }
    }

    /// Shared by every call made through this client. A deadline carried by
    /// `cancel` is absolute and spans the client's lifetime.
    pub fn with_cancellation(mut self, cancel: CancellationReceiver) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bound each call separately, measured from the moment it starts.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    async fn call(&self, credential: &Credential, request: Request) -> Result<HttpResponse, ApiError> {
        let cancel = match self.call_timeout {
            Some(timeout) => self.cancel.clone().with_timeout(timeout),
            None => self.cancel.clone(),
        };
        self.dispatcher
            .call_with_cancellation(credential, request, &cancel)
            .await
    }

    pub async fn list_labels(&self, credential: &Credential) -> Result<Vec<Label>, ApiError> {
        let response = self.call(credential, Request::list("/labels")).await?;
        parse_json(response, 200)
    }

    pub async fn label_index(&self, credential: &Credential) -> Result<LabelIndex, ApiError> {
        Ok(LabelIndex::new(&self.list_labels(credential).await?))
    }

    pub async fn create_label(&self, credential: &Credential, key: &str, value: &str) -> Result<Label, ApiError> {
        let payload = to_payload(&CreateLabel {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        let request = Request::new(HttpMethod::Post, "/labels")
            .in_org()
            .with_payload(payload);
        parse_json(self.call(credential, request).await?, 201)
    }

    /// `href` is the label's own href, e.g. `/orgs/1/labels/7`.
    pub async fn update_label(&self, credential: &Credential, href: &str, value: &str) -> Result<(), ApiError> {
        let payload = to_payload(&UpdateLabel {
            value: value.to_string(),
        })?;
        let request = Request::new(HttpMethod::Put, href).with_payload(payload);
        parse_empty(self.call(credential, request).await?, 204)
    }

    pub async fn list_workloads(&self, credential: &Credential) -> Result<Vec<Workload>, ApiError> {
        let response = self.call(credential, Request::list("/workloads")).await?;
        parse_json(response, 200)
    }

    pub async fn update_workload(&self, credential: &Credential, href: &str, payload: Value) -> Result<(), ApiError> {
        let request = Request::new(HttpMethod::Put, href).with_payload(payload);
        parse_empty(self.call(credential, request).await?, 204)
    }

    /// Replace the labels of every workload that has address `ip`.
    ///
    /// `labels` are `(key, value)` pairs such as `("role", "web")`; pairs with
    /// an empty value are skipped and labels missing from the PCE are created.
    /// Returns the hrefs of the updated workloads, empty when none matched.
    pub async fn assign_labels(
        &self,
        credential: &Credential,
        ip: &str,
        labels: &[(&str, &str)],
    ) -> Result<Vec<String>, ApiError> {
        let targets: Vec<String> = self
            .list_workloads(credential)
            .await?
            .into_iter()
            .filter(|workload| workload.has_address(ip))
            .map(|workload| workload.href)
            .collect();
        if targets.is_empty() {
            return Ok(targets);
        }

        let mut index = self.label_index(credential).await?;
        let mut refs = Vec::new();
        for (key, value) in labels.iter().filter(|(_, value)| !value.is_empty()) {
            let href = match index.href(key, value) {
                Some(href) => href.to_string(),
                None => {
                    let created = self.create_label(credential, key, value).await?;
                    index.insert(&created);
                    created.href
                }
            };
            refs.push(LabelRef { href });
        }

        let payload = to_payload(&WorkloadLabels { labels: refs })?;
        for href in &targets {
            self.update_workload(credential, href, payload.clone()).await?;
        }
        Ok(targets)
    }

    pub async fn create_unmanaged_workload(
        &self,
        credential: &Credential,
        workload: &UnmanagedWorkload,
    ) -> Result<Workload, ApiError> {
        let request = Request::new(HttpMethod::Post, "/workloads")
            .in_org()
            .with_payload(to_payload(workload)?);
        parse_json(self.call(credential, request).await?, 201)
    }
}

fn to_payload<S: Serialize>(input: &S) -> Result<Value, ApiError> {
    serde_json::to_value(input).map_err(|e| ApiError::SerializationError(e.to_string()))
}

pub fn parse_json<D: DeserializeOwned>(response: HttpResponse, expected: u16) -> Result<D, ApiError> {
    check_status(&response, expected)?;
    serde_json::from_slice(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

pub fn parse_empty(response: HttpResponse, expected: u16) -> Result<(), ApiError> {
    check_status(&response, expected)
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body_text(),
    })
}
