//! Login details for one PCE and the endpoint resolver built on them.

use std::fmt;

use crate::error::ApiError;

pub const DEFAULT_PORT: u16 = 443;
pub const API_ROOT: &str = "/api/v2";

/// Identity, secret and address of a PCE.
///
/// Immutable once built; shared by reference across concurrent calls.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    identity: String,
    secret: String,
    host: String,
    org_scope: Option<String>,
    port: u16,
    scheme: String,
}

impl Credential {
    /// `host` may carry a scheme prefix or trailing slash, both are dropped.
    pub fn new(identity: impl Into<String>, secret: impl Into<String>, host: &str) -> Self {
        let host = host
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        Self {
            identity: identity.into(),
            secret: secret.into(),
            host: host.to_string(),
            org_scope: None,
            port: DEFAULT_PORT,
            scheme: "https".to_string(),
        }
    }

    /// Accepts `orgs/80`, `/orgs/80` or `/orgs/80/`.
    pub fn with_org_scope(mut self, scope: &str) -> Self {
        let scope = scope.trim().trim_matches('/');
        self.org_scope = if scope.is_empty() {
            None
        } else {
            Some(format!("/{scope}"))
        };
        self
    }

    pub fn with_org_id(self, org_id: u64) -> Self {
        self.with_org_scope(&format!("orgs/{org_id}"))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Plain `http` is only useful against a local mock PCE.
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn org_scope(&self) -> Option<&str> {
        self.org_scope.as_deref()
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Identity safe to put in logs.
    pub fn masked_identity(&self) -> String {
        let id = &self.identity;
        if id.chars().count() <= 8 {
            "*".repeat(id.chars().count())
        } else {
            let head: String = id.chars().take(4).collect();
            let tail: String = id.chars().skip(id.chars().count() - 4).collect();
            format!("{head}...{tail}")
        }
    }

    /// Absolute URL for `resource`, under the org scope when `org_scoped`.
    pub fn resolve(&self, resource: &str, org_scoped: bool) -> Result<String, ApiError> {
        let rest = resource.strip_prefix('/').unwrap_or(resource);
        if rest.is_empty() {
            return Err(ApiError::InvalidResource(resource.to_string()));
        }
        let scope = if org_scoped {
            self.org_scope.as_deref().unwrap_or("")
        } else {
            ""
        };
        Ok(format!(
            "{}://{}:{}{API_ROOT}{scope}/{rest}",
            self.scheme, self.host, self.port
        ))
    }

    /// Resolve an href returned by the server (`Location`, `result.href`).
    ///
    /// Server hrefs already carry the org segment, so they resolve without
    /// the scope. Absolute URLs pass through untouched.
    pub fn resolve_href(&self, href: &str) -> Result<String, ApiError> {
        if href.starts_with("https://") || href.starts_with("http://") {
            return Ok(href.to_string());
        }
        self.resolve(href, false)
    }
}

// The secret stays out of debug output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.masked_identity())
            .field("host", &self.host)
            .field("org_scope", &self.org_scope)
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Build the absolute URL for `resource`. See [`Credential::resolve`].
pub fn resolve_url(credential: &Credential, resource: &str, org_scoped: bool) -> Result<String, ApiError> {
    credential.resolve(resource, org_scoped)
}
