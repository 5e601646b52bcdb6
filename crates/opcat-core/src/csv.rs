//! ClusterServiceVersion manifest model
//!
//! The CSV is the per-version manifest carrying the install strategy,
//! permissions, provided/required APIs and upgrade annotations. The typed
//! spec below lifts out what the graph builder and validators read; the raw
//! document is kept verbatim for payload reconstruction.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ApiKey;
use crate::error::{CoreError, Result};
use crate::version::{self, SkipRange};

/// Annotation carrying the skip range.
pub const SKIP_RANGE_ANNOTATION: &str = "olm.skipRange";
/// Annotation naming the bundle this one substitutes for.
pub const SUBSTITUTES_FOR_ANNOTATION: &str = "olm.substitutesFor";
/// Annotation holding example custom resources, as a JSON array.
pub const ALM_EXAMPLES_ANNOTATION: &str = "alm-examples";
/// Annotation holding the comma-separated category list.
pub const CATEGORIES_ANNOTATION: &str = "categories";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterServiceVersion {
    /// `metadata.name`, conventionally `<package>.v<version>`.
    pub name: String,
    pub annotations: BTreeMap<String, String>,
    pub spec: CsvSpec,
    /// The full document, kept verbatim.
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvSpec {
    pub version: String,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub min_kube_version: Option<String>,
    pub provider: Option<Provider>,
    pub maintainers: Vec<Maintainer>,
    pub keywords: Vec<String>,
    pub icon: Vec<Icon>,
    pub install_modes: Vec<InstallMode>,
    pub related_images: Vec<RelatedImage>,
    pub install: Option<InstallStrategy>,
    #[serde(rename = "customresourcedefinitions")]
    pub crd_descriptors: CrdDescriptors,
    #[serde(rename = "apiservicedefinitions")]
    pub apiservice_descriptors: ApiServiceDescriptors,
    #[serde(rename = "webhookdefinitions")]
    pub webhook_definitions: Vec<WebhookDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Icon {
    #[serde(default)]
    pub base64data: String,
    #[serde(default)]
    pub mediatype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallMode {
    #[serde(rename = "type")]
    pub type_: String,
    pub supported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    #[serde(default)]
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallStrategy {
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub spec: StrategyDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyDetails {
    pub deployments: Vec<StrategyDeployment>,
    pub permissions: Vec<StrategyPermissions>,
    pub cluster_permissions: Vec<StrategyPermissions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyDeployment {
    #[serde(default)]
    pub name: String,
    /// The embedded DeploymentSpec, left unstructured.
    #[serde(default)]
    pub spec: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyPermissions {
    pub service_account_name: String,
    pub rules: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrdDescriptors {
    pub owned: Vec<CrdDescriptor>,
    pub required: Vec<CrdDescriptor>,
}

/// A CRD reference from the CSV: `name` is the CRD object name
/// (`<plural>.<group>`), `version` and `kind` pin the served API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrdDescriptor {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiServiceDescriptors {
    pub owned: Vec<ApiServiceDescriptor>,
    pub required: Vec<ApiServiceDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiServiceDescriptor {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookDefinition {
    #[serde(rename = "type")]
    pub type_: String,
    pub conversion_crds: Vec<String>,
}

impl ClusterServiceVersion {
    /// Parse a CSV from its unstructured document.
    pub fn parse(raw: Value) -> Result<Self> {
        let name = raw
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::MissingField {
                name: "<unnamed>".to_string(),
                field: "metadata.name".to_string(),
            })?
            .to_string();

        let annotations = raw
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let spec: CsvSpec = raw
            .get("spec")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            name,
            annotations,
            spec,
            raw,
        })
    }

    /// The bundle version. Failure to parse is a hard ingest error.
    pub fn version(&self) -> Result<Version> {
        version::parse_version(&self.spec.version)
    }

    pub fn replaces(&self) -> Option<&str> {
        self.spec.replaces.as_deref().filter(|s| !s.is_empty())
    }

    pub fn skips(&self) -> &[String] {
        &self.spec.skips
    }

    pub fn skip_range(&self) -> Result<Option<SkipRange>> {
        match self.annotations.get(SKIP_RANGE_ANNOTATION) {
            Some(raw) if !raw.is_empty() => Ok(Some(SkipRange::parse(raw)?)),
            _ => Ok(None),
        }
    }

    pub fn substitutes_for(&self) -> Option<&str> {
        self.annotations
            .get(SUBSTITUTES_FOR_ANNOTATION)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Owned CRD APIs plus owned API services.
    pub fn provided_apis(&self) -> Vec<ApiKey> {
        let mut apis: Vec<ApiKey> = self
            .spec
            .crd_descriptors
            .owned
            .iter()
            .filter_map(|d| ApiKey::from_crd_name(&d.name, &d.version, &d.kind))
            .collect();
        apis.extend(
            self.spec
                .apiservice_descriptors
                .owned
                .iter()
                .map(|d| ApiKey::new(&d.group, &d.version, &d.kind)),
        );
        apis.sort();
        apis.dedup();
        apis
    }

    /// Required CRD APIs plus required API services. GVK-typed dependencies
    /// are merged in by the bundle model, not here.
    pub fn required_apis(&self) -> Vec<ApiKey> {
        let mut apis: Vec<ApiKey> = self
            .spec
            .crd_descriptors
            .required
            .iter()
            .filter_map(|d| ApiKey::from_crd_name(&d.name, &d.version, &d.kind))
            .collect();
        apis.extend(
            self.spec
                .apiservice_descriptors
                .required
                .iter()
                .map(|d| ApiKey::new(&d.group, &d.version, &d.kind)),
        );
        apis.sort();
        apis.dedup();
        apis
    }

    /// Container images referenced by the install strategy's deployments.
    pub fn operator_images(&self) -> Vec<String> {
        let mut images = Vec::new();
        let Some(install) = &self.spec.install else {
            return images;
        };
        for deployment in &install.spec.deployments {
            let pod_spec = deployment
                .spec
                .get("template")
                .and_then(|t| t.get("spec"));
            let Some(pod_spec) = pod_spec else { continue };
            for field in ["containers", "initContainers"] {
                if let Some(containers) = pod_spec.get(field).and_then(Value::as_array) {
                    for container in containers {
                        if let Some(image) = container.get("image").and_then(Value::as_str) {
                            images.push(image.to_string());
                        }
                    }
                }
            }
        }
        images.sort();
        images.dedup();
        images
    }

    /// Service accounts named by the install strategy (deployments and
    /// permission grants).
    pub fn strategy_service_accounts(&self) -> Vec<String> {
        let mut accounts = Vec::new();
        let Some(install) = &self.spec.install else {
            return accounts;
        };
        for perms in install
            .spec
            .permissions
            .iter()
            .chain(&install.spec.cluster_permissions)
        {
            if !perms.service_account_name.is_empty() {
                accounts.push(perms.service_account_name.clone());
            }
        }
        for deployment in &install.spec.deployments {
            if let Some(sa) = deployment
                .spec
                .get("template")
                .and_then(|t| t.get("spec"))
                .and_then(|s| s.get("serviceAccountName"))
                .and_then(Value::as_str)
            {
                accounts.push(sa.to_string());
            }
        }
        accounts.sort();
        accounts.dedup();
        accounts
    }

    /// Decode the alm-examples annotation, if present.
    pub fn alm_examples(&self) -> Result<Vec<Value>> {
        match self.annotations.get(ALM_EXAMPLES_ANNOTATION) {
            Some(raw) => {
                let value: Value = serde_json::from_str(raw)?;
                match value {
                    Value::Array(items) => Ok(items),
                    other => Ok(vec![other]),
                }
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_csv() -> Value {
        json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "ClusterServiceVersion",
            "metadata": {
                "name": "etcdoperator.v0.9.4",
                "annotations": {
                    "olm.skipRange": ">=0.9.0 <0.9.4",
                    "alm-examples": "[{\"apiVersion\": \"etcd.database.coreos.com/v1beta2\", \"kind\": \"EtcdCluster\"}]"
                }
            },
            "spec": {
                "version": "0.9.4",
                "replaces": "etcdoperator.v0.9.2",
                "skips": ["etcdoperator.v0.9.1"],
                "customresourcedefinitions": {
                    "owned": [
                        { "name": "etcdclusters.etcd.database.coreos.com", "version": "v1beta2", "kind": "EtcdCluster" }
                    ]
                },
                "install": {
                    "strategy": "deployment",
                    "spec": {
                        "permissions": [ { "serviceAccountName": "etcd-operator", "rules": [] } ],
                        "deployments": [
                            {
                                "name": "etcd-operator",
                                "spec": {
                                    "template": {
                                        "spec": {
                                            "serviceAccountName": "etcd-operator",
                                            "containers": [
                                                { "name": "etcd-operator", "image": "quay.io/coreos/etcd-operator@sha256:abc" }
                                            ]
                                        }
                                    }
                                }
                            }
                        ]
                    }
                },
                "installModes": [
                    { "type": "OwnNamespace", "supported": true },
                    { "type": "AllNamespaces", "supported": false }
                ],
                "relatedImages": [
                    { "name": "etcd", "image": "quay.io/coreos/etcd@sha256:def" }
                ]
            }
        })
    }

    #[test]
    fn test_parse_accessors() {
        let csv = ClusterServiceVersion::parse(sample_csv()).unwrap();
        assert_eq!(csv.name, "etcdoperator.v0.9.4");
        assert_eq!(csv.version().unwrap().to_string(), "0.9.4");
        assert_eq!(csv.replaces(), Some("etcdoperator.v0.9.2"));
        assert_eq!(csv.skips(), ["etcdoperator.v0.9.1"]);
        assert!(csv.skip_range().unwrap().is_some());
        assert!(csv.substitutes_for().is_none());
    }

    #[test]
    fn test_provided_apis() {
        let csv = ClusterServiceVersion::parse(sample_csv()).unwrap();
        let apis = csv.provided_apis();
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].group, "etcd.database.coreos.com");
        assert_eq!(apis[0].plural, "etcdclusters");
    }

    #[test]
    fn test_operator_images_and_service_accounts() {
        let csv = ClusterServiceVersion::parse(sample_csv()).unwrap();
        assert_eq!(csv.operator_images(), ["quay.io/coreos/etcd-operator@sha256:abc"]);
        assert_eq!(csv.strategy_service_accounts(), ["etcd-operator"]);
    }

    #[test]
    fn test_alm_examples_decode() {
        let csv = ClusterServiceVersion::parse(sample_csv()).unwrap();
        let examples = csv.alm_examples().unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0]["kind"], "EtcdCluster");
    }

    #[test]
    fn test_bad_version_is_error() {
        let mut raw = sample_csv();
        raw["spec"]["version"] = json!("not-semver");
        let csv = ClusterServiceVersion::parse(raw).unwrap();
        assert!(csv.version().is_err());
    }
}
