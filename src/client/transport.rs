//! HTTP transport shared by every endpoint.
//!
//! One `reqwest` client is built from [`ClientConfig`] and reused for
//! every call. Non-2xx responses are classified once here into
//! [`ApiError`]; nothing above this layer inspects status text.

use std::fmt;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Client, Identity, Method, Proxy, Request};
use tracing::debug;

use super::config::{ClientConfig, load_pem};
use crate::error::{ApiError, ConfigError, Result};

/// Tenant header understood by every Mimir component.
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// Which configured base URI a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// The default `uri`.
    Default,
    /// The ruler, `ruler_uri`.
    Ruler,
    /// The Alertmanager, `alertmanager_uri`.
    Alertmanager,
    /// The distributor, `distributor_uri`.
    Distributor,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Ruler => write!(f, "ruler"),
            Self::Alertmanager => write!(f, "alertmanager"),
            Self::Distributor => write!(f, "distributor"),
        }
    }
}

/// Mimir API client.
#[derive(Debug, Clone)]
pub struct MimirClient {
    /// HTTP client.
    http: Client,
    /// Provider configuration.
    config: ClientConfig,
    /// Provider headers plus the tenant header.
    default_headers: HeaderMap,
}

impl MimirClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS material, a header, or the proxy is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| ApiError::Configuration {
                message: format!("invalid proxy_url {proxy_url}: {e}"),
            })?;
            builder = builder.proxy(proxy);
        }

        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ca) = &config.ca {
            let pem = load_pem("ca", ca)?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|e| tls_error("ca", &e))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        match (&config.cert, &config.key) {
            (Some(cert), Some(key)) => {
                let mut pem = load_pem("cert", cert)?;
                pem.push(b'\n');
                pem.extend(load_pem("key", key)?);
                let identity = Identity::from_pem(&pem).map_err(|e| tls_error("cert", &e))?;
                builder = builder.identity(identity);
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::InvalidTls {
                    field: String::from("cert"),
                    message: String::from("cert and key must be set together"),
                }
                .into());
            }
            (None, None) => {}
        }

        let http = builder.build().map_err(|e| ApiError::Configuration {
            message: e.to_string(),
        })?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let (name, value) = header_pair(name, value)?;
            default_headers.insert(name, value);
        }
        if !config.org_id.is_empty() {
            let (name, value) = header_pair(ORG_ID_HEADER, &config.org_id)?;
            default_headers.insert(name, value);
        }

        Ok(Self {
            http,
            config,
            default_headers,
        })
    }

    /// Returns the provider-level tenant.
    #[must_use]
    pub fn org_id(&self) -> &str {
        &self.config.org_id
    }

    /// Returns the base URI for a component.
    #[must_use]
    pub fn base_uri(&self, component: Component) -> &str {
        let specific = match component {
            Component::Default => None,
            Component::Ruler => self.config.ruler_uri.as_deref(),
            Component::Alertmanager => self.config.alertmanager_uri.as_deref(),
            Component::Distributor => self.config.distributor_uri.as_deref(),
        };
        specific
            .filter(|uri| !uri.is_empty())
            .unwrap_or(self.config.uri.as_str())
            .trim_end_matches('/')
    }

    /// Builds per-call headers overriding the tenant, if one is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant is not a valid header value.
    pub fn tenant_headers(org_id: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(org) = org_id.filter(|o| !o.is_empty()) {
            let (name, value) = header_pair(ORG_ID_HEADER, org)?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// Sends one request and returns the response body.
    ///
    /// Provider headers are applied first, then `headers`, which win on
    /// conflict. A bearer token takes precedence over basic auth.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] on transport failure and a classified
    /// status error for any response outside 2xx.
    pub async fn send_request(
        &self,
        component: Component,
        method: Method,
        path: &str,
        body: Option<String>,
        headers: &HeaderMap,
    ) -> Result<String> {
        let url = format!("{}{path}", self.base_uri(component));

        let mut merged = self.default_headers.clone();
        for (name, value) in headers {
            merged.insert(name.clone(), value.clone());
        }
        if body.is_some() {
            merged.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/yaml"),
            );
        }

        let mut builder = self.http.request(method, &url).headers(merged);
        if let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) {
            builder = builder.bearer_auth(token);
        } else if let Some(username) = self.config.username.as_deref().filter(|u| !u.is_empty()) {
            builder = builder.basic_auth(username, self.config.password.as_deref());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let request = builder
            .build()
            .map_err(|e| ApiError::network(&url, format!("invalid request: {e}")))?;

        if self.config.debug {
            dump_request(&request);
        }

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ApiError::network(&url, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::network(&url, format!("failed to read response body: {e}")))?;

        if self.config.debug {
            debug!("<<< {} {url}\n{text}", status.as_u16());
        }

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), url, text).into());
        }

        Ok(text)
    }
}

fn tls_error(field: &str, err: &reqwest::Error) -> ConfigError {
    ConfigError::InvalidTls {
        field: field.to_string(),
        message: err.to_string(),
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ConfigError::validation(format!("invalid header name: {e}"), "headers"))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| ConfigError::validation(format!("invalid value for header {name}: {e}"), "headers"))?;
    Ok((header_name, header_value))
}

fn dump_request(request: &Request) {
    let mut dump = format!(">>> {} {}\n", request.method(), request.url());
    for (name, value) in request.headers() {
        let shown = if name == header::AUTHORIZATION {
            "<redacted>"
        } else {
            value.to_str().unwrap_or("<binary>")
        };
        dump.push_str(&format!("{name}: {shown}\n"));
    }
    if let Some(body) = request.body().and_then(reqwest::Body::as_bytes) {
        dump.push_str(&String::from_utf8_lossy(body));
    }
    debug!("{dump}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> MimirClient {
        MimirClient::new(ClientConfig::new(server.uri(), "tenant-1")).expect("client")
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header(ORG_ID_HEADER, "tenant-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let body = client(&server)
            .send_request(Component::Default, Method::GET, "/ping", None, &HeaderMap::new())
            .await
            .expect("request");
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_not_found_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("group does not exist"))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_request(Component::Ruler, Method::GET, "/missing", None, &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("response code '404'"));
        assert!(err.to_string().contains("group does not exist"));
    }

    #[tokio::test]
    async fn test_server_error_is_not_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_request(
                Component::Default,
                Method::POST,
                "/x",
                Some(String::from("a: 1")),
                &HeaderMap::new(),
            )
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("response code '500'"));
    }

    #[tokio::test]
    async fn test_per_call_tenant_wins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header(ORG_ID_HEADER, "override"))
            .and(header("content-type", "application/yaml"))
            .and(body_string("groups: []"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let headers = MimirClient::tenant_headers(Some("override")).expect("headers");
        client(&server)
            .send_request(
                Component::Ruler,
                Method::POST,
                "/config/v1/rules/ns",
                Some(String::from("groups: []")),
                &headers,
            )
            .await
            .expect("request");
    }

    #[tokio::test]
    async fn test_bearer_wins_over_basic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer secret"))
            .and(header("X-Extra", "yes"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri(), "t")
            .with_basic_auth("user", "pass")
            .with_token("secret")
            .with_header("X-Extra", "yes")
            .with_debug(true);
        MimirClient::new(config)
            .expect("client")
            .send_request(Component::Default, Method::GET, "/", None, &HeaderMap::new())
            .await
            .expect("request");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let config = ClientConfig::new("http://127.0.0.1:1", "t");
        let err = MimirClient::new(config)
            .expect("client")
            .send_request(Component::Default, Method::GET, "/", None, &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::MimirError::Api(ApiError::Network { .. })
        ));
    }

    #[test]
    fn test_component_uri_fallback() {
        let mut config = ClientConfig::new("http://default/", "t");
        config.ruler_uri = Some(String::from("http://ruler"));
        config.alertmanager_uri = Some(String::new());
        let client = MimirClient::new(config).expect("client");

        assert_eq!(client.base_uri(Component::Default), "http://default");
        assert_eq!(client.base_uri(Component::Ruler), "http://ruler");
        assert_eq!(client.base_uri(Component::Alertmanager), "http://default");
        assert_eq!(client.base_uri(Component::Distributor), "http://default");
    }

    #[test]
    fn test_cert_without_key_rejected() {
        let mut config = ClientConfig::new("http://mimir", "t");
        config.cert = Some(String::from("-----BEGIN CERTIFICATE-----\n"));
        assert!(MimirClient::new(config).is_err());
    }
}
