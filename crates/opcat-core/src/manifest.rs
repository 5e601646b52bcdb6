//! Tagged view over a bundle's heterogeneous manifests
//!
//! Bundles carry arbitrary Kubernetes objects; everything is inspected by
//! `kind` with an `Unknown` fallback so unrecognized objects still travel
//! through ingest and payload reconstruction untouched.

use serde_json::Value;

use crate::crd::CrdManifest;
use crate::csv::ClusterServiceVersion;
use crate::error::{CoreError, Result};

/// One manifest document, dispatched on `kind`/`apiVersion`.
#[derive(Debug, Clone)]
pub enum Manifest {
    ClusterServiceVersion(ClusterServiceVersion),
    CustomResourceDefinition(CrdManifest),
    ServiceAccount(Value),
    Role(Value),
    ClusterRole(Value),
    RoleBinding(Value),
    ClusterRoleBinding(Value),
    PodDisruptionBudget(Value),
    PriorityClass(Value),
    ConfigMap(Value),
    Secret(Value),
    Unknown { raw: Value },
}

impl Manifest {
    /// Parse one YAML document into its tagged form.
    ///
    /// The document is routed through the JSON value model so downstream
    /// storage sees a single representation.
    pub fn from_yaml(doc: &str) -> Result<Self> {
        let raw: Value = serde_yaml::from_str(doc)?;
        Self::from_value(raw)
    }

    /// Parse an unstructured document into its tagged form.
    pub fn from_value(raw: Value) -> Result<Self> {
        let kind = raw.get("kind").and_then(Value::as_str).unwrap_or_default();
        Ok(match kind {
            "ClusterServiceVersion" => {
                Self::ClusterServiceVersion(ClusterServiceVersion::parse(raw)?)
            }
            "CustomResourceDefinition" => Self::CustomResourceDefinition(CrdManifest::parse(raw)?),
            "ServiceAccount" => Self::ServiceAccount(raw),
            "Role" => Self::Role(raw),
            "ClusterRole" => Self::ClusterRole(raw),
            "RoleBinding" => Self::RoleBinding(raw),
            "ClusterRoleBinding" => Self::ClusterRoleBinding(raw),
            "PodDisruptionBudget" => Self::PodDisruptionBudget(raw),
            "PriorityClass" => Self::PriorityClass(raw),
            "ConfigMap" => Self::ConfigMap(raw),
            "Secret" => Self::Secret(raw),
            _ => Self::Unknown { raw },
        })
    }

    /// The object's `kind`, as written in the document.
    pub fn kind(&self) -> &str {
        self.raw()
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The object's `metadata.name`, if present.
    pub fn name(&self) -> Option<&str> {
        self.raw()
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
    }

    /// The underlying document.
    pub fn raw(&self) -> &Value {
        match self {
            Self::ClusterServiceVersion(csv) => &csv.raw,
            Self::CustomResourceDefinition(crd) => &crd.raw,
            Self::ServiceAccount(raw)
            | Self::Role(raw)
            | Self::ClusterRole(raw)
            | Self::RoleBinding(raw)
            | Self::ClusterRoleBinding(raw)
            | Self::PodDisruptionBudget(raw)
            | Self::PriorityClass(raw)
            | Self::ConfigMap(raw)
            | Self::Secret(raw)
            | Self::Unknown { raw } => raw,
        }
    }

    pub fn as_csv(&self) -> Option<&ClusterServiceVersion> {
        match self {
            Self::ClusterServiceVersion(csv) => Some(csv),
            _ => None,
        }
    }

    pub fn as_crd(&self) -> Option<&CrdManifest> {
        match self {
            Self::CustomResourceDefinition(crd) => Some(crd),
            _ => None,
        }
    }
}

/// Parse a (possibly multi-document) YAML file into tagged manifests.
///
/// Empty documents (stray `---` separators, comment-only blocks) are
/// dropped rather than surfaced as unknowns.
pub fn parse_documents(content: &str) -> Result<Vec<Manifest>> {
    use serde::Deserialize;

    let mut manifests = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(content) {
        let raw = Value::deserialize(doc).map_err(CoreError::YamlParse)?;
        if raw.is_null() {
            continue;
        }
        manifests.push(Manifest::from_value(raw)?);
    }
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_known_kinds() {
        let manifest = Manifest::from_yaml(
            "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: etcd-operator\n",
        )
        .unwrap();
        assert!(matches!(manifest, Manifest::ServiceAccount(_)));
        assert_eq!(manifest.name(), Some("etcd-operator"));
    }

    #[test]
    fn test_unknown_fallback_keeps_raw() {
        let manifest = Manifest::from_yaml(
            "apiVersion: monitoring.coreos.com/v1\nkind: ServiceMonitor\nmetadata:\n  name: m\n",
        )
        .unwrap();
        assert!(matches!(manifest, Manifest::Unknown { .. }));
        assert_eq!(manifest.kind(), "ServiceMonitor");
    }

    #[test]
    fn test_multi_document_split() {
        let content = "---\nkind: ConfigMap\nmetadata:\n  name: a\n---\nkind: Secret\nmetadata:\n  name: b\n";
        let manifests = parse_documents(content).unwrap();
        assert_eq!(manifests.len(), 2);
        assert!(matches!(manifests[0], Manifest::ConfigMap(_)));
        assert!(matches!(manifests[1], Manifest::Secret(_)));
    }
}
