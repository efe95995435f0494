//! Error types for the PCE API client.
//!
//! # Design
//! The first four variants classify failures of the call path itself and are
//! what integrating tooling branches on. A transient `Network` failure is
//! never reported as `AsyncJobFailed` or the other way round. The remaining
//! variants are produced by the typed resource wrappers in `client`, which do
//! interpret status codes.

use thiserror::Error;

/// Errors returned by the dispatcher, executor, poller and resource wrappers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection failure or timeout on any HTTP leg.
    #[error("network error: {0}")]
    Network(String),

    /// Missing required header, unparseable body, or missing JSON field.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The upstream job monitor reported `failed`. `diagnostics` is the
    /// monitor body, verbatim.
    #[error("async job {monitor_url} failed: {diagnostics}")]
    AsyncJobFailed {
        monitor_url: String,
        diagnostics: String,
    },

    /// The caller cancelled the call or its deadline elapsed.
    #[error("call cancelled")]
    Cancelled,

    /// The resource path was empty.
    #[error("invalid resource: {0:?}")]
    InvalidResource(String),

    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned an unexpected non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),
}

impl ApiError {
    /// Stable name of the error kind, for tooling that reports it verbatim.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "NetworkError",
            ApiError::Protocol(_) => "ProtocolError",
            ApiError::AsyncJobFailed { .. } => "AsyncJobFailed",
            ApiError::Cancelled => "Cancelled",
            ApiError::InvalidResource(_) => "InvalidResource",
            ApiError::NotFound => "NotFound",
            ApiError::HttpError { .. } => "HttpError",
            ApiError::DeserializationError(_) => "DeserializationError",
            ApiError::SerializationError(_) => "SerializationError",
        }
    }
}
