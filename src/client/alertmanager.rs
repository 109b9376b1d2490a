//! Alertmanager user configuration endpoints.

use reqwest::Method;
use tracing::debug;

use super::transport::{Component, MimirClient};
use crate::alertmanager::UserConfig;
use crate::error::{MimirError, Result};

/// Alertmanager configuration API path.
pub const ALERTS_PATH: &str = "/api/v1/alerts";

impl MimirClient {
    /// Fetches a tenant's Alertmanager configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError::NotFound`] if the tenant has no
    /// configuration, or any other transport or decode error.
    pub async fn get_alertmanager_config(&self, org_id: Option<&str>) -> Result<UserConfig> {
        let headers = Self::tenant_headers(org_id)?;
        let body = self
            .send_request(Component::Alertmanager, Method::GET, ALERTS_PATH, None, &headers)
            .await?;

        serde_yaml::from_str(&body).map_err(|e| MimirError::yaml("alertmanager user config", &e))
    }

    /// Uploads a tenant's Alertmanager configuration.
    ///
    /// # Errors
    ///
    /// Returns any transport or encode error.
    pub async fn set_alertmanager_config(&self, org_id: Option<&str>, config: &UserConfig) -> Result<()> {
        let headers = Self::tenant_headers(org_id)?;
        let body = serde_yaml::to_string(config)
            .map_err(|e| MimirError::yaml("alertmanager user config", &e))?;

        debug!("Uploading alertmanager configuration");
        self.send_request(Component::Alertmanager, Method::POST, ALERTS_PATH, Some(body), &headers)
            .await?;
        Ok(())
    }

    /// Deletes a tenant's Alertmanager configuration.
    ///
    /// # Errors
    ///
    /// Returns any transport error, including `NotFound`.
    pub async fn delete_alertmanager_config(&self, org_id: Option<&str>) -> Result<()> {
        let headers = Self::tenant_headers(org_id)?;

        debug!("Deleting alertmanager configuration");
        self.send_request(Component::Alertmanager, Method::DELETE, ALERTS_PATH, None, &headers)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> MimirClient {
        let mut config = ClientConfig::new("http://unused", "tenant-1");
        config.alertmanager_uri = Some(server.uri());
        MimirClient::new(config).expect("client")
    }

    #[tokio::test]
    async fn test_get_config() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ALERTS_PATH))
            .and(header("X-Scope-OrgID", "tenant-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "template_files: {}\nalertmanager_config: |\n  route:\n    receiver: a\n",
            ))
            .mount(&server)
            .await;

        let config = client(&server).get_alertmanager_config(None).await.expect("get");
        assert!(config.alertmanager_config.contains("receiver: a"));
    }

    #[tokio::test]
    async fn test_set_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ALERTS_PATH))
            .and(body_string_contains("alertmanager_config"))
            .and(body_string_contains("default.tmpl"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let config = UserConfig {
            template_files: BTreeMap::from([(String::from("default.tmpl"), String::from("x"))]),
            alertmanager_config: String::from("route:\n  receiver: a\n"),
        };
        client(&server)
            .set_alertmanager_config(None, &config)
            .await
            .expect("set");
    }

    #[tokio::test]
    async fn test_delete_surfaces_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_string("alertmanager config not found"))
            .mount(&server)
            .await;

        let err = client(&server)
            .delete_alertmanager_config(Some("other"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
