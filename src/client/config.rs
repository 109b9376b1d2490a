//! Transport configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything needed to build a [`super::MimirClient`].
///
/// Built once from the provider section of the manifest and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Default base URI.
    pub uri: String,
    /// Ruler base URI, falls back to `uri`.
    pub ruler_uri: Option<String>,
    /// Alertmanager base URI, falls back to `uri`.
    pub alertmanager_uri: Option<String>,
    /// Distributor base URI, falls back to `uri`.
    pub distributor_uri: Option<String>,
    /// Tenant sent as `X-Scope-OrgID`.
    pub org_id: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Proxy for every request.
    pub proxy_url: Option<String>,
    /// CA bundle, inline PEM or a file path.
    pub ca: Option<String>,
    /// Client certificate, inline PEM or a file path.
    pub cert: Option<String>,
    /// Client key, inline PEM or a file path.
    pub key: Option<String>,
    /// Skip server certificate verification.
    pub insecure: bool,
    /// Request timeout.
    pub timeout: Duration,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Dump requests and responses at debug level.
    pub debug: bool,
}

impl ClientConfig {
    /// Creates a configuration with only the required fields set.
    #[must_use]
    pub fn new(uri: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ruler_uri: None,
            alertmanager_uri: None,
            distributor_uri: None,
            org_id: org_id.into(),
            token: None,
            username: None,
            password: None,
            proxy_url: None,
            ca: None,
            cert: None,
            key: None,
            insecure: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            headers: BTreeMap::new(),
            debug: false,
        }
    }

    /// Sets a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets basic auth credentials.
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables request/response dumps.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Loads PEM material given inline or as a path.
pub(super) fn load_pem(field: &str, value: &str) -> Result<Vec<u8>, ConfigError> {
    if value.trim_start().starts_with("-----BEGIN") {
        return Ok(value.as_bytes().to_vec());
    }

    std::fs::read(Path::new(value)).map_err(|e| ConfigError::InvalidTls {
        field: field.to_string(),
        message: format!("cannot read {value}: {e}"),
    })
}
