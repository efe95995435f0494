use std::time::Duration;

use serde::Deserialize;

use crate::credential::{Credential, DEFAULT_PORT};
use crate::dispatcher::{DispatchConfig, DEFAULT_ASYNC_THRESHOLD};

pub const ENV_PREFIX: &str = "PCE_";

/// Client configuration loaded from `PCE_`-prefixed environment variables.
///
/// Example: `PCE_HOST`, `PCE_ORG_ID`, `PCE_USERNAME`, `PCE_SECRET`.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// PCE host name
    pub host: String,

    /// PCE port (default: 443)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Organization id; org-scoped resources live under `/orgs/<id>`
    #[serde(default)]
    pub org_id: Option<u64>,

    /// API key identity
    pub username: String,

    /// API key secret
    pub secret: String,

    /// URL scheme (default: https)
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Collection size at which GETs switch to the async job protocol (default: 500)
    #[serde(default = "default_async_threshold")]
    pub async_threshold: u64,

    /// Per-request timeout in seconds (default: 15)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Interval between job monitor polls in seconds (default: 1)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Overall bound on one call, in seconds (default: none)
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "json" or "pretty" (default: pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_async_threshold() -> u64 {
    DEFAULT_ASYNC_THRESHOLD
}

fn default_request_timeout() -> u64 {
    15
}

fn default_poll_interval() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env()
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }

    pub fn credential(&self) -> Credential {
        let credential = Credential::new(self.username.clone(), self.secret.clone(), &self.host)
            .with_port(self.port)
            .with_scheme(&self.scheme);
        match self.org_id {
            Some(org_id) => credential.with_org_id(org_id),
            None => credential,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            async_threshold: self.async_threshold,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
