//! Read-only lookups.

use crate::alertmanager::AlertmanagerSpec;
use crate::client::TenantStats;
use crate::error::Result;
use crate::rules::RuleGroup;

use super::ProviderContext;

/// Data sources backed by the same client as the controllers.
#[derive(Debug, Clone)]
pub struct DataSources {
    ctx: ProviderContext,
}

impl DataSources {
    /// Creates the data sources.
    #[must_use]
    pub const fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    /// Looks up one rule group.
    ///
    /// # Errors
    ///
    /// Returns an error if the group does not exist or the call fails.
    pub async fn rule_group(&self, org_id: Option<&str>, namespace: &str, name: &str) -> Result<RuleGroup> {
        let group = self.ctx.client.get_rule_group(org_id, namespace, name).await?;
        group.normalized(self.ctx.format)
    }

    /// Looks up a tenant's Alertmanager configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no configuration or the call fails.
    pub async fn alertmanager_config(&self, org_id: Option<&str>) -> Result<AlertmanagerSpec> {
        let org = self.ctx.org_id(org_id).to_string();
        let envelope = self.ctx.client.get_alertmanager_config(Some(&org)).await?;
        AlertmanagerSpec::from_wire(&envelope, org_id.map(str::to_string))
    }

    /// Fetches distributor ingestion statistics for every tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be fetched or parsed.
    pub async fn distributor_stats(&self) -> Result<Vec<TenantStats>> {
        self.ctx.client.user_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_rule_group_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/v1/rules/infra/cpu"))
            .and(header("X-Scope-OrgID", "t2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("name: cpu\ninterval: 60s\nrules:\n- record: r\n  expr: up\n"),
            )
            .mount(&server)
            .await;

        let group = DataSources::new(context(&server))
            .rule_group(Some("t2"), "infra", "cpu")
            .await
            .expect("lookup");
        assert_eq!(group.interval.as_deref(), Some("1m"));
    }

    #[tokio::test]
    async fn test_alertmanager_lookup_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = DataSources::new(context(&server))
            .alertmanager_config(None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
