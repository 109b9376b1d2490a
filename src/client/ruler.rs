//! Ruler rule group endpoints.

use std::collections::BTreeMap;

use reqwest::Method;
use tracing::debug;

use super::transport::{Component, MimirClient};
use crate::error::{MimirError, Result};
use crate::rules::RuleGroup;

/// Ruler configuration API prefix.
pub const RULES_PATH: &str = "/config/v1/rules";

impl MimirClient {
    /// Fetches one rule group.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError::NotFound`] if the group does not
    /// exist, or any other transport or decode error.
    pub async fn get_rule_group(
        &self,
        org_id: Option<&str>,
        namespace: &str,
        name: &str,
    ) -> Result<RuleGroup> {
        let path = format!("{RULES_PATH}/{namespace}/{name}");
        let headers = Self::tenant_headers(org_id)?;
        let body = self
            .send_request(Component::Ruler, Method::GET, &path, None, &headers)
            .await?;

        serde_yaml::from_str(&body)
            .map_err(|e| MimirError::yaml(format!("rule group {namespace}/{name}"), &e))
    }

    /// Lists the groups in a namespace.
    ///
    /// A namespace with no groups yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns any transport or decode error. Mimir answers 404 for an
    /// empty namespace, which is mapped to an empty list.
    pub async fn list_rule_groups(&self, org_id: Option<&str>, namespace: &str) -> Result<Vec<RuleGroup>> {
        let path = format!("{RULES_PATH}/{namespace}");
        let headers = Self::tenant_headers(org_id)?;
        let body = match self
            .send_request(Component::Ruler, Method::GET, &path, None, &headers)
            .await
        {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut namespaces: BTreeMap<String, Vec<RuleGroup>> = serde_yaml::from_str(&body)
            .map_err(|e| MimirError::yaml(format!("rule namespace {namespace}"), &e))?;
        Ok(namespaces.remove(namespace).unwrap_or_default())
    }

    /// Creates or replaces a rule group.
    ///
    /// # Errors
    ///
    /// Returns any transport or encode error.
    pub async fn create_rule_group(
        &self,
        org_id: Option<&str>,
        namespace: &str,
        group: &RuleGroup,
    ) -> Result<()> {
        let path = format!("{RULES_PATH}/{namespace}");
        let headers = Self::tenant_headers(org_id)?;
        let body = group.to_yaml()?;

        debug!("Writing rule group {namespace}/{}", group.name);
        self.send_request(Component::Ruler, Method::POST, &path, Some(body), &headers)
            .await?;
        Ok(())
    }

    /// Deletes a rule group.
    ///
    /// # Errors
    ///
    /// Returns any transport error, including `NotFound`.
    pub async fn delete_rule_group(&self, org_id: Option<&str>, namespace: &str, name: &str) -> Result<()> {
        let path = format!("{RULES_PATH}/{namespace}/{name}");
        let headers = Self::tenant_headers(org_id)?;

        debug!("Deleting rule group {namespace}/{name}");
        self.send_request(Component::Ruler, Method::DELETE, &path, None, &headers)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GROUP: &str = "name: cpu\nrules:\n- alert: HighCPUUsage\n  expr: cpu_usage > 80\n  for: 5m\n";

    fn client(server: &MockServer) -> MimirClient {
        let mut config = ClientConfig::new("http://unused", "tenant-1");
        config.ruler_uri = Some(server.uri());
        MimirClient::new(config).expect("client")
    }

    #[tokio::test]
    async fn test_get_rule_group() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/v1/rules/infra/cpu"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GROUP))
            .mount(&server)
            .await;

        let group = client(&server)
            .get_rule_group(None, "infra", "cpu")
            .await
            .expect("group");
        assert_eq!(group.name, "cpu");
        assert_eq!(group.rules[0].name(), "HighCPUUsage");
    }

    #[tokio::test]
    async fn test_get_missing_group_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("group does not exist"))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_rule_group(None, "infra", "cpu")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_posts_yaml_with_org_override() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/config/v1/rules/infra"))
            .and(header("X-Scope-OrgID", "other"))
            .and(body_string_contains("alert: HighCPUUsage"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let group: RuleGroup = serde_yaml::from_str(GROUP).expect("group");
        client(&server)
            .create_rule_group(Some("other"), "infra", &group)
            .await
            .expect("create");
    }

    #[tokio::test]
    async fn test_list_namespace() {
        let server = MockServer::start().await;
        let body = format!("infra:\n- {}", GROUP.replace('\n', "\n  ").trim_end());
        Mock::given(method("GET"))
            .and(path("/config/v1/rules/infra"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let groups = client(&server)
            .list_rule_groups(None, "infra")
            .await
            .expect("list");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "cpu");
    }

    #[tokio::test]
    async fn test_list_missing_namespace_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let groups = client(&server)
            .list_rule_groups(None, "empty")
            .await
            .expect("list");
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn test_delete_surfaces_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/config/v1/rules/infra/cpu"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .delete_rule_group(None, "infra", "cpu")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
