//! The asynchronous job protocol: submit, poll the monitor, fetch the result.
//!
//! # Design
//! The three legs are strictly sequential and every wait is a tokio timer
//! raced against the caller's `CancellationReceiver`. There is no attempt
//! cap; the loop ends on a terminal status, a failed leg, or cancellation.
//! `Retry-After` is authoritative for the first poll, and a submit reply
//! missing it or `Location` is a protocol error rather than a guessed default.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cancel::CancellationReceiver;
use crate::credential::Credential;
use crate::error::ApiError;
use crate::executor::Executor;
use crate::http::{HttpMethod, HttpResponse};
use crate::transport::Transport;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const PREFER_ASYNC: (&str, &str) = ("prefer", "respond-async");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

impl JobStatus {
    /// Anything other than `done` or `failed` (`pending`, `running`, ...) is
    /// still in progress.
    pub fn parse(status: &str) -> Self {
        match status {
            "done" => JobStatus::Done,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != JobStatus::Pending
    }
}

/// State of one in-flight job. Discarded when the call returns.
#[derive(Debug, Clone)]
pub struct AsyncJobHandle {
    monitor_url: String,
    retry_after: Duration,
    status: JobStatus,
    result_url: Option<String>,
}

impl AsyncJobHandle {
    /// Read `Retry-After` and `Location` from a submit reply.
    pub fn from_submit(credential: &Credential, response: &HttpResponse) -> Result<Self, ApiError> {
        let retry_after = response
            .header("retry-after")
            .ok_or_else(|| ApiError::Protocol("async submit reply has no Retry-After header".into()))?;
        let retry_after = retry_after
            .trim()
            .parse::<u64>()
            .map_err(|_| ApiError::Protocol(format!("Retry-After is not whole seconds: {retry_after:?}")))?;
        let location = response
            .header("location")
            .ok_or_else(|| ApiError::Protocol("async submit reply has no Location header".into()))?;
        Ok(Self {
            monitor_url: credential.resolve_href(location)?,
            retry_after: Duration::from_secs(retry_after),
            status: JobStatus::Pending,
            result_url: None,
        })
    }

    pub fn monitor_url(&self) -> &str {
        &self.monitor_url
    }

    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    /// Record a monitor observation. Terminal states are final.
    pub fn observe(&mut self, status: JobStatus, result_url: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        if status == JobStatus::Done {
            self.result_url = result_url;
        }
    }
}

#[derive(Debug, Deserialize)]
struct MonitorBody {
    status: String,
    #[serde(default)]
    result: Option<ResultRef>,
}

#[derive(Debug, Deserialize)]
struct ResultRef {
    // Failed jobs carry an error object here instead of an href.
    #[serde(default)]
    href: Option<String>,
}

pub struct Poller<'a, T> {
    executor: &'a Executor<T>,
    poll_interval: Duration,
}

impl<'a, T: Transport> Poller<'a, T> {
    pub fn new(executor: &'a Executor<T>) -> Self {
        Self {
            executor,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the job protocol for a GET on `url`.
    ///
    /// A non-2xx submit reply is returned as-is, the same way a synchronous
    /// call would surface it.
    pub async fn run(
        &self,
        credential: &Credential,
        url: &str,
        cancel: &CancellationReceiver,
    ) -> Result<HttpResponse, ApiError> {
        let mut submit = self
            .executor
            .build_request(credential, HttpMethod::Get, url, None)?;
        submit
            .headers
            .push((PREFER_ASYNC.0.to_string(), PREFER_ASYNC.1.to_string()));
        let response = cancel.guard(self.executor.send(submit)).await??;
        if !response.is_success() {
            warn!(url, status = response.status, "async submit rejected");
            return Ok(response);
        }

        let mut job = AsyncJobHandle::from_submit(credential, &response)?;
        info!(
            url,
            monitor = %job.monitor_url(),
            retry_after_secs = job.retry_after().as_secs(),
            "async job submitted"
        );

        cancel.sleep(job.retry_after()).await?;
        let mut polls = 0u32;
        loop {
            let response = cancel
                .guard(self.executor.execute(credential, HttpMethod::Get, job.monitor_url(), None))
                .await??;
            polls += 1;
            let monitor: MonitorBody = response.json()?;
            let status = JobStatus::parse(&monitor.status);
            let href = monitor.result.and_then(|result| result.href);
            let result_url = match (status, href) {
                (JobStatus::Done, Some(href)) => Some(credential.resolve_href(&href)?),
                (JobStatus::Done, None) => {
                    return Err(ApiError::Protocol(
                        "job monitor reports done without result.href".into(),
                    ))
                }
                _ => None,
            };
            job.observe(status, result_url);

            match job.status() {
                JobStatus::Pending => {
                    debug!(monitor = %job.monitor_url(), polls, status = %monitor.status, "job still running");
                    cancel.sleep(self.poll_interval).await?;
                }
                JobStatus::Failed => {
                    warn!(monitor = %job.monitor_url(), polls, "async job failed");
                    return Err(ApiError::AsyncJobFailed {
                        monitor_url: job.monitor_url().to_string(),
                        diagnostics: response.body_text(),
                    });
                }
                JobStatus::Done => break,
            }
        }

        let result_url = job
            .result_url()
            .ok_or_else(|| ApiError::Protocol("job finished without a result location".into()))?;
        let result = cancel
            .guard(self.executor.execute(credential, HttpMethod::Get, result_url, None))
            .await??;
        info!(monitor = %job.monitor_url(), polls, status = result.status, "async job complete");
        Ok(result)
    }
}
