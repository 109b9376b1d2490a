//! Manifest validation.
//!
//! Checks the provider block and every declared resource before anything
//! touches the network. All problems are collected; the first one is
//! returned as the error so callers can stop early, and `collect` hands
//! back the full list for reporting.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{ConfigError, MimirError, Result};
use crate::resources::DesiredResource;
use crate::rules::select_managed;

use super::spec::{Manifest, ProviderConfig, ResourceAddress};

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing every problem found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationError {
    fn from_config(err: &ConfigError, default_field: &str) -> Self {
        Self {
            field: err.field().unwrap_or(default_field).to_string(),
            message: err.to_string(),
        }
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let result = self.collect(manifest);
        if let Some(first) = result.errors.first() {
            return Err(MimirError::Config(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            }));
        }
        debug!("Manifest validation passed");
        Ok(result)
    }

    /// Validates a manifest and returns every error and warning.
    #[must_use]
    pub fn collect(&self, manifest: &Manifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_provider(&manifest.provider, &mut result);

        let desired = manifest.resources.desired();
        if desired.is_empty() {
            result
                .warnings
                .push(String::from("No resources declared; apply will only destroy"));
        }
        for (address, resource) in &desired {
            Self::validate_resource(address, resource, &mut result);
        }
        Self::validate_targets(&manifest.provider, &desired, &mut result);

        result
    }

    fn validate_provider(provider: &ProviderConfig, result: &mut ValidationResult) {
        match provider.uri.as_deref() {
            None | Some("") => result.errors.push(ValidationError {
                field: String::from("provider.uri"),
                message: String::from("provider.uri is required (or set MIMIR_URI)"),
            }),
            Some(uri) => Self::validate_uri("provider.uri", uri, result),
        }

        for (field, value) in [
            ("provider.ruler_uri", &provider.ruler_uri),
            ("provider.alertmanager_uri", &provider.alertmanager_uri),
            ("provider.distributor_uri", &provider.distributor_uri),
            ("provider.proxy_url", &provider.proxy_url),
        ] {
            if let Some(uri) = value.as_deref() {
                Self::validate_uri(field, uri, result);
            }
        }

        if provider.org_id.as_deref().is_none_or(str::is_empty) {
            result.errors.push(ValidationError {
                field: String::from("provider.org_id"),
                message: String::from("provider.org_id is required (or set MIMIR_ORG_ID)"),
            });
        }

        if provider.username.is_some() != provider.password.is_some() {
            result.errors.push(ValidationError {
                field: String::from("provider.username"),
                message: String::from("username and password must be set together"),
            });
        }
        if provider.token.is_some() && provider.username.is_some() {
            result.warnings.push(String::from(
                "provider.token and provider.username are both set; the bearer token is used",
            ));
        }
        if provider.cert.is_some() != provider.key.is_some() {
            result.errors.push(ValidationError {
                field: String::from("provider.cert"),
                message: String::from("cert and key must be set together"),
            });
        }
        if provider.insecure == Some(true) {
            result
                .warnings
                .push(String::from("TLS certificate verification is disabled"));
        }
        if provider.timeout == Some(0) {
            result.errors.push(ValidationError {
                field: String::from("provider.timeout"),
                message: String::from("timeout must be at least 1 second"),
            });
        }
        if let Err(e) = provider.read_delay() {
            result
                .errors
                .push(ValidationError::from_config(&e, "provider.read_delay"));
        }
    }

    fn validate_uri(field: &str, uri: &str, result: &mut ValidationResult) {
        if !(uri.starts_with("http://") || uri.starts_with("https://")) {
            result.errors.push(ValidationError {
                field: field.to_string(),
                message: format!("'{uri}' must start with http:// or https://"),
            });
        }
    }

    fn validate_resource(
        address: &ResourceAddress,
        resource: &DesiredResource,
        result: &mut ValidationResult,
    ) {
        let field = format!("resources.{}.{}", address.kind, address.label);
        if let Err(e) = resource.validate(&field) {
            let mut error = ValidationError::from_config(&e, &field);
            if !error.field.starts_with("resources.") {
                error.field = format!("{field}.{}", error.field);
            }
            result.errors.push(error);
            return;
        }

        if let DesiredResource::AlertmanagerConfig(spec) = resource {
            for receiver in spec.undeclared_receivers() {
                result.warnings.push(format!(
                    "{field}: route references receiver '{receiver}' which is not declared"
                ));
            }
        }
    }

    /// Rejects two resources that would manage the same remote object.
    fn validate_targets(
        provider: &ProviderConfig,
        desired: &[(ResourceAddress, DesiredResource)],
        result: &mut ValidationResult,
    ) {
        let default_org = provider.org_id.as_deref().unwrap_or_default();
        let org = |o: Option<&str>| o.filter(|o| !o.is_empty()).unwrap_or(default_org).to_string();
        let mut seen: BTreeMap<String, &ResourceAddress> = BTreeMap::new();

        for (address, resource) in desired {
            let targets = match resource {
                DesiredResource::AlertingRuleGroup(spec) => {
                    let id = spec.group_id();
                    vec![group_target(&org(id.org_id.as_deref()), &id.namespace, &id.name)]
                }
                DesiredResource::RecordingRuleGroup(spec) => {
                    let id = spec.group_id();
                    vec![group_target(&org(id.org_id.as_deref()), &id.namespace, &id.name)]
                }
                DesiredResource::AlertmanagerConfig(spec) => {
                    vec![format!("alertmanager config for {}", org(spec.org_id.as_deref()))]
                }
                // A broken document or filter is reported by validate_resource.
                DesiredResource::Rules(spec) => match (spec.document(), spec.filter()) {
                    (Ok(doc), Ok(filter)) => {
                        let org = org(spec.org_id.as_deref());
                        select_managed(&doc, &filter)
                            .into_iter()
                            .map(|group| group_target(&org, &spec.namespace, &group.name))
                            .collect()
                    }
                    _ => Vec::new(),
                },
            };

            for target in targets {
                if let Some(previous) = seen.get(&target) {
                    result.errors.push(ValidationError {
                        field: format!("resources.{}.{}", address.kind, address.label),
                        message: format!("{target} is already managed by {previous}"),
                    });
                } else {
                    seen.insert(target, address);
                }
            }
        }
    }
}

fn group_target(org: &str, namespace: &str, name: &str) -> String {
    format!("rule group {org}/{namespace}/{name}")
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn manifest(yaml: &str) -> Manifest {
        ConfigParser::new().parse_yaml(yaml, None).expect("parse")
    }

    const PROVIDER: &str = r"
provider:
  uri: http://mimir:8080
  org_id: tenant-1
";

    #[test]
    fn test_valid_manifest() {
        let yaml = format!(
            "{PROVIDER}{}",
            r#"
resources:
  mimir_rule_group_alerting:
    cpu:
      namespace: infra
      name: cpu
      rule:
        - alert: HighCPUUsage
          expr: 'rate(cpu_seconds_total[5m]) > 0.9'
          for: 5m
"#
        );
        let result = ConfigValidator::new()
            .validate(&manifest(&yaml))
            .expect("valid");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_missing_provider_fields() {
        let result = ConfigValidator::new().collect(&Manifest::default());
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"provider.uri"));
        assert!(fields.contains(&"provider.org_id"));
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_auth_shape() {
        let yaml = r"
provider:
  uri: mimir:8080
  org_id: t
  username: admin
  cert: /tmp/cert.pem
";
        let result = ConfigValidator::new().collect(&manifest(yaml));
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["provider.uri", "provider.username", "provider.cert"]);
    }

    #[test]
    fn test_resource_error_is_prefixed() {
        let yaml = format!(
            "{PROVIDER}{}",
            r"
resources:
  mimir_rule_group_recording:
    bad:
      namespace: infra
      name: bad
      rule:
        - record: 'not a metric'
          expr: up
"
        );
        let err = ConfigValidator::new()
            .validate(&manifest(&yaml))
            .unwrap_err();
        let MimirError::Config(ConfigError::ValidationError { field, .. }) = err else {
            panic!("unexpected error {err}");
        };
        assert!(
            field
                .as_deref()
                .is_some_and(|f| f.starts_with("resources.mimir_rule_group_recording.bad")),
            "{field:?}"
        );
    }

    #[test]
    fn test_same_target_twice() {
        let yaml = format!(
            "{PROVIDER}{}",
            r"
resources:
  mimir_alertmanager_config:
    a:
      route:
        receiver: default
      receiver:
        - name: default
    b:
      org_id: tenant-1
      route:
        receiver: default
      receiver:
        - name: default
"
        );
        let result = ConfigValidator::new().collect(&manifest(&yaml));
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "resources.mimir_alertmanager_config.b");
        assert!(result.errors[0].message.contains("already managed by"));
    }

    #[test]
    fn test_disjoint_group_filters_share_namespace() {
        let yaml = format!(
            "{PROVIDER}{}",
            r"
resources:
  mimir_rules:
    team_a:
      namespace: shared
      only_groups: [a]
      content: |
        groups:
        - name: a
          rules:
          - record: job:up:sum
            expr: sum by (job) (up)
        - name: b
          rules:
          - record: job:down:sum
            expr: sum by (job) (up == 0)
    team_b:
      namespace: shared
      only_groups: [b]
      content: |
        groups:
        - name: a
          rules:
          - record: job:up:sum
            expr: sum by (job) (up)
        - name: b
          rules:
          - record: job:down:sum
            expr: sum by (job) (up == 0)
"
        );
        let result = ConfigValidator::new().collect(&manifest(&yaml));
        assert_eq!(result.error_count(), 0, "{:?}", result.errors);
    }

    #[test]
    fn test_group_claimed_by_single_and_bulk_resource() {
        let yaml = format!(
            "{PROVIDER}{}",
            r"
resources:
  mimir_rule_group_alerting:
    a:
      namespace: shared
      name: a
      rule:
        - alert: Down
          expr: up == 0
  mimir_rules:
    all:
      namespace: shared
      content: |
        groups:
        - name: a
          rules:
          - alert: Down
            expr: up == 0
"
        );
        let result = ConfigValidator::new().collect(&manifest(&yaml));
        assert_eq!(result.error_count(), 1, "{:?}", result.errors);
        assert!(result.errors[0].message.contains("rule group tenant-1/shared/a"));
        assert!(result.errors[0].message.contains("already managed by"));
    }

    #[test]
    fn test_undeclared_receiver_warns() {
        let yaml = format!(
            "{PROVIDER}{}",
            r"
resources:
  mimir_alertmanager_config:
    main:
      route:
        receiver: default
        child_route:
          - receiver: pager
      receiver:
        - name: default
"
        );
        let result = ConfigValidator::new().collect(&manifest(&yaml));
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("'pager'")));
    }
}
