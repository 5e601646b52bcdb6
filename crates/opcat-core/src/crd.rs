//! CustomResourceDefinition manifest model
//!
//! CRDs arrive as unstructured YAML in both `apiextensions.k8s.io/v1` and
//! the legacy `v1beta1` shape; the parser keeps the raw document for
//! storage and lifts out the fields the graph and validators inspect.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ApiKey;
use crate::error::{CoreError, Result};

/// A parsed CustomResourceDefinition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdManifest {
    /// `metadata.name`, conventionally `<plural>.<group>`.
    pub name: String,
    /// `apiextensions.k8s.io/v1` or `apiextensions.k8s.io/v1beta1`.
    pub api_version: String,
    pub group: String,
    pub kind: String,
    pub plural: String,
    pub scope: CrdScope,
    pub versions: Vec<CrdVersion>,
    /// The full document, kept verbatim for payload reconstruction.
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrdScope {
    Namespaced,
    Cluster,
}

/// One served version of the custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrdVersion {
    pub name: String,
    pub served: bool,
    pub storage: bool,
}

impl CrdManifest {
    /// Parse a CRD from its unstructured document.
    pub fn parse(raw: Value) -> Result<Self> {
        let name = str_at(&raw, &["metadata", "name"])
            .ok_or_else(|| missing(&raw, "metadata.name"))?
            .to_string();
        let api_version = str_at(&raw, &["apiVersion"])
            .ok_or_else(|| missing(&raw, "apiVersion"))?
            .to_string();

        let spec = raw
            .get("spec")
            .ok_or_else(|| missing(&raw, "spec"))?;

        let group = str_at(spec, &["group"])
            .ok_or_else(|| missing(&raw, "spec.group"))?
            .to_string();
        let kind = str_at(spec, &["names", "kind"])
            .ok_or_else(|| missing(&raw, "spec.names.kind"))?
            .to_string();
        let plural = str_at(spec, &["names", "plural"])
            .unwrap_or_default()
            .to_string();

        let scope = match str_at(spec, &["scope"]) {
            Some("Cluster") => CrdScope::Cluster,
            _ => CrdScope::Namespaced,
        };

        let mut versions = Vec::new();
        if let Some(list) = spec.get("versions").and_then(Value::as_array) {
            for entry in list {
                let Some(vname) = str_at(entry, &["name"]) else {
                    continue;
                };
                versions.push(CrdVersion {
                    name: vname.to_string(),
                    served: entry.get("served").and_then(Value::as_bool).unwrap_or(true),
                    storage: entry.get("storage").and_then(Value::as_bool).unwrap_or(false),
                });
            }
        }
        // v1beta1 allows a single top-level spec.version instead of a list
        if versions.is_empty() {
            if let Some(single) = str_at(spec, &["version"]) {
                versions.push(CrdVersion {
                    name: single.to_string(),
                    served: true,
                    storage: true,
                });
            }
        }
        if versions.is_empty() {
            return Err(missing(&raw, "spec.versions"));
        }

        Ok(Self {
            name,
            api_version,
            group,
            kind,
            plural,
            scope,
            versions,
            raw,
        })
    }

    /// The APIs this CRD serves, one per served version.
    pub fn served_apis(&self) -> Vec<ApiKey> {
        self.versions
            .iter()
            .filter(|v| v.served)
            .map(|v| ApiKey::new(&self.group, &v.name, &self.kind).with_plural(&self.plural))
            .collect()
    }

    /// How many versions are flagged as the storage version.
    pub fn storage_version_count(&self) -> usize {
        self.versions.iter().filter(|v| v.storage).count()
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

fn missing(raw: &Value, field: &str) -> CoreError {
    CoreError::MissingField {
        name: str_at(raw, &["metadata", "name"]).unwrap_or("<unnamed>").to_string(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v1_crd() -> Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": { "name": "etcdclusters.etcd.database.coreos.com" },
            "spec": {
                "group": "etcd.database.coreos.com",
                "scope": "Namespaced",
                "names": { "kind": "EtcdCluster", "plural": "etcdclusters" },
                "versions": [
                    { "name": "v1beta2", "served": true, "storage": true },
                    { "name": "v1beta1", "served": false, "storage": false }
                ]
            }
        })
    }

    #[test]
    fn test_parse_v1() {
        let crd = CrdManifest::parse(v1_crd()).unwrap();
        assert_eq!(crd.group, "etcd.database.coreos.com");
        assert_eq!(crd.versions.len(), 2);
        assert_eq!(crd.storage_version_count(), 1);
        let apis = crd.served_apis();
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].version, "v1beta2");
    }

    #[test]
    fn test_parse_v1beta1_single_version() {
        let crd = CrdManifest::parse(json!({
            "apiVersion": "apiextensions.k8s.io/v1beta1",
            "kind": "CustomResourceDefinition",
            "metadata": { "name": "widgets.example.com" },
            "spec": {
                "group": "example.com",
                "version": "v1alpha1",
                "names": { "kind": "Widget", "plural": "widgets" }
            }
        }))
        .unwrap();
        assert_eq!(crd.versions.len(), 1);
        assert!(crd.versions[0].storage);
    }

    #[test]
    fn test_missing_group_is_error() {
        let result = CrdManifest::parse(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": { "name": "x.y" },
            "spec": { "names": { "kind": "X" }, "versions": [{ "name": "v1" }] }
        }));
        assert!(result.is_err());
    }
}
