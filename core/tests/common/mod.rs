//! Scripted in-memory transport shared by the dispatcher tests.
//!
//! Every request is recorded together with the tokio clock reading at the
//! moment it was sent, so tests running on a paused clock can assert exact
//! wait times between legs.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use pce_core::{ApiError, Credential, HttpMethod, HttpRequest, HttpResponse, Transport};
use tokio::time::Instant;

type Responder = Box<dyn Fn(&HttpRequest, usize) -> Result<HttpResponse, ApiError> + Send + Sync>;

pub struct ScriptedTransport {
    responder: Responder,
    log: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedTransport {
    /// `responder` receives the request and how many requests preceded it.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn timeline(&self) -> Vec<(Instant, String)> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(at, r)| (*at, r.url.clone()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn count_matching(&self, fragment: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let seen = {
            let mut log = self.log.lock().unwrap();
            log.push((Instant::now(), request.clone()));
            log.len() - 1
        };
        (self.responder)(&request, seen)
    }
}

pub fn credential() -> Credential {
    Credential::new("api_user", "api_secret", "pce.example.com").with_org_id(1)
}

pub fn reply(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: body.as_bytes().to_vec(),
    }
}

pub fn ok(body: &str) -> HttpResponse {
    reply(200, &[], body)
}

pub fn probe_reply(total: u64) -> HttpResponse {
    reply(200, &[("X-Total-Count", &total.to_string())], "[]")
}

pub fn submit_reply(retry_after: &str, location: &str) -> HttpResponse {
    reply(202, &[("Retry-After", retry_after), ("Location", location)], "")
}

pub fn is_probe(request: &HttpRequest) -> bool {
    request.url.contains("max_results=1")
}

pub fn is_submit(request: &HttpRequest) -> bool {
    request.header("prefer") == Some("respond-async")
}

pub fn is_get(request: &HttpRequest) -> bool {
    request.method == HttpMethod::Get
}
