//! Client core for the PCE workload-segmentation REST API.
//!
//! # Overview
//! Every call goes through one path: the `Dispatcher` resolves the URL,
//! decides between a direct round trip and the API's async job protocol,
//! and returns a normalized `HttpResponse`. The network sits behind the
//! `Transport` trait so the whole path runs against scripted transports in
//! tests.
//!
//! # Design
//! - `Credential` is immutable and borrowed by every call.
//! - `Executor` makes exactly one round trip per request, no retries.
//! - `Poller` runs submit → poll → fetch with timer waits raced against the
//!   caller's `CancellationReceiver`.
//! - `PceClient` adds typed label/workload operations and interprets status
//!   codes; the call path itself never does.

pub mod cancel;
pub mod client;
pub mod config;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod http;
pub mod poller;
pub mod transport;
pub mod types;

pub use cancel::{CancellationReceiver, CancellationToken};
pub use client::PceClient;
pub use config::ClientConfig;
pub use credential::{resolve_url, Credential};
pub use dispatcher::{DispatchConfig, Dispatcher, Request, Volume};
pub use error::ApiError;
pub use executor::Executor;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use poller::{AsyncJobHandle, JobStatus, Poller};
pub use transport::{Transport, UreqTransport};
pub use types::{
    CreateLabel, Label, LabelIndex, LabelRef, UnmanagedWorkload, UpdateLabel, Workload, WorkloadInterface, WorkloadLabels,
};
