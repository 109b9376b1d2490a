//! Identity strings for imported and recorded resources.

use std::fmt;

use super::ResourceKind;
use crate::error::ReconcileError;

/// Identity of a single rule group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupId {
    /// Tenant, when it differs from the provider default.
    pub org_id: Option<String>,
    /// Rule namespace.
    pub namespace: String,
    /// Group name.
    pub name: String,
}

impl GroupId {
    /// Parses `namespace/name` or `org_id/namespace/name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id has another shape or an empty part.
    pub fn parse(kind: ResourceKind, id: &str) -> Result<Self, ReconcileError> {
        let parts: Vec<&str> = id.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid(kind, id));
        }
        match parts.as_slice() {
            [namespace, name] => Ok(Self {
                org_id: None,
                namespace: (*namespace).to_string(),
                name: (*name).to_string(),
            }),
            [org, namespace, name] => Ok(Self {
                org_id: Some((*org).to_string()),
                namespace: (*namespace).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(invalid(kind, id)),
        }
    }

    /// True if both ids name the same remote group once an unset org
    /// falls back to `default_org`.
    #[must_use]
    pub fn same_target(&self, other: &Self, default_org: &str) -> bool {
        self.namespace == other.namespace
            && self.name == other.name
            && resolve(self.org_id.as_deref(), default_org) == resolve(other.org_id.as_deref(), default_org)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.org_id {
            Some(org) => write!(f, "{org}/{}/{}", self.namespace, self.name),
            None => write!(f, "{}/{}", self.namespace, self.name),
        }
    }
}

/// Identity of a rule namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceId {
    /// Tenant, when it differs from the provider default.
    pub org_id: Option<String>,
    /// Rule namespace.
    pub namespace: String,
}

impl NamespaceId {
    /// Parses `namespace` or `org_id/namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id has another shape or an empty part.
    pub fn parse(kind: ResourceKind, id: &str) -> Result<Self, ReconcileError> {
        match id.split('/').collect::<Vec<_>>().as_slice() {
            [namespace] if !namespace.is_empty() => Ok(Self {
                org_id: None,
                namespace: (*namespace).to_string(),
            }),
            [org, namespace] if !org.is_empty() && !namespace.is_empty() => Ok(Self {
                org_id: Some((*org).to_string()),
                namespace: (*namespace).to_string(),
            }),
            _ => Err(invalid(kind, id)),
        }
    }

    /// True if both ids name the same remote namespace once an unset org
    /// falls back to `default_org`.
    #[must_use]
    pub fn same_target(&self, other: &Self, default_org: &str) -> bool {
        self.namespace == other.namespace
            && resolve(self.org_id.as_deref(), default_org) == resolve(other.org_id.as_deref(), default_org)
    }
}

fn resolve<'a>(org_id: Option<&'a str>, default_org: &'a str) -> &'a str {
    org_id.filter(|o| !o.is_empty()).unwrap_or(default_org)
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.org_id {
            Some(org) => write!(f, "{org}/{}", self.namespace),
            None => f.write_str(&self.namespace),
        }
    }
}

fn invalid(kind: ResourceKind, id: &str) -> ReconcileError {
    ReconcileError::InvalidImportId {
        resource_type: kind.to_string(),
        id: id.to_string(),
        expected: kind.import_formats().to_string(),
    }
}
