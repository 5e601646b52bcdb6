//! Bundle structure validation

use std::collections::BTreeSet;
use std::io::Write;

use opcat_core::Bundle;
use opcat_core::manifest::Manifest;

use crate::{Finding, Options, ValidationObject, Validator};

/// Hard ceiling on the gzip-compressed bundle size; the apiserver rejects
/// anything larger once it lands in a resource.
pub const MAX_COMPRESSED_SIZE: usize = 1 << 20;
/// Fraction of the ceiling at which a warning fires.
pub const SIZE_WARNING_RATIO: f64 = 0.85;

pub struct BundleValidator;

impl Validator for BundleValidator {
    fn name(&self) -> &'static str {
        "bundle"
    }

    fn accepts(&self, object: &ValidationObject<'_>) -> bool {
        matches!(object, ValidationObject::Bundle(_))
    }

    fn validate(&self, object: &ValidationObject<'_>, _options: &Options) -> Vec<Finding> {
        let ValidationObject::Bundle(bundle) = object else {
            return Vec::new();
        };
        let mut findings = Vec::new();
        check_owned_crds(bundle, &mut findings);
        check_duplicate_gvks(bundle, &mut findings);
        check_compressed_size(bundle, &mut findings);
        check_service_accounts(bundle, &mut findings);
        findings
    }
}

/// Each owned-CRD descriptor must be backed by exactly one shipped CRD
/// serving the declared version.
fn check_owned_crds(bundle: &Bundle, findings: &mut Vec<Finding>) {
    for descriptor in &bundle.csv().spec.crd_descriptors.owned {
        let matching: Vec<_> = bundle
            .crds()
            .filter(|crd| crd.name == descriptor.name)
            .collect();
        match matching.as_slice() {
            [] => findings.push(Finding::error(
                &bundle.name,
                format!(
                    "owned CRD {:?} is not shipped in the bundle manifests",
                    descriptor.name
                ),
            )),
            [crd] => {
                if !descriptor.version.is_empty()
                    && !crd.versions.iter().any(|v| v.name == descriptor.version)
                {
                    findings.push(Finding::error(
                        &bundle.name,
                        format!(
                            "owned CRD {:?} does not serve declared version {:?}",
                            descriptor.name, descriptor.version
                        ),
                    ));
                }
            }
            _ => findings.push(Finding::error(
                &bundle.name,
                format!("owned CRD {:?} appears more than once", descriptor.name),
            )),
        }
    }

    for crd in bundle.crds() {
        let owned = bundle
            .csv()
            .spec
            .crd_descriptors
            .owned
            .iter()
            .any(|d| d.name == crd.name);
        if !owned {
            findings.push(Finding::warning(
                &bundle.name,
                format!("shipped CRD {:?} is not declared as owned", crd.name),
            ));
        }
    }
}

fn check_duplicate_gvks(bundle: &Bundle, findings: &mut Vec<Finding>) {
    let mut seen = BTreeSet::new();
    for api in bundle.csv().provided_apis() {
        let key = (api.group.clone(), api.version.clone(), api.kind.clone());
        if !seen.insert(key) {
            findings.push(Finding::error(
                &bundle.name,
                format!("duplicate provided API {api}"),
            ));
        }
    }
}

fn check_compressed_size(bundle: &Bundle, findings: &mut Vec<Finding>) {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    for object in bundle.objects() {
        if encoder.write_all(object.as_bytes()).is_err() {
            return;
        }
    }
    let Ok(compressed) = encoder.finish() else {
        return;
    };

    let size = compressed.len();
    let warn_at = (MAX_COMPRESSED_SIZE as f64 * SIZE_WARNING_RATIO) as usize;
    if size > MAX_COMPRESSED_SIZE {
        findings.push(Finding::error(
            &bundle.name,
            format!(
                "compressed bundle is {size} bytes, over the {MAX_COMPRESSED_SIZE} byte limit"
            ),
        ));
    } else if size > warn_at {
        findings.push(Finding::warning(
            &bundle.name,
            format!(
                "compressed bundle is {size} bytes, over 85% of the {MAX_COMPRESSED_SIZE} byte limit"
            ),
        ));
    }
}

/// A ServiceAccount object shipped in the bundle must not shadow one the
/// install strategy already creates.
fn check_service_accounts(bundle: &Bundle, findings: &mut Vec<Finding>) {
    let strategy_accounts: BTreeSet<String> =
        bundle.csv().strategy_service_accounts().into_iter().collect();
    for manifest in bundle.manifests() {
        if let Manifest::ServiceAccount(_) = manifest {
            if let Some(name) = manifest.name() {
                if strategy_accounts.contains(name) {
                    findings.push(Finding::error(
                        &bundle.name,
                        format!(
                            "service account {name:?} shadows one declared by the install strategy"
                        ),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcat_core::annotations::Annotations;
    use serde_json::json;

    fn bundle(manifests: Vec<serde_json::Value>) -> Bundle {
        let annotations = Annotations {
            package: "etcd".into(),
            channels: vec!["stable".into()],
            default_channel: None,
        };
        let manifests = manifests
            .into_iter()
            .map(|v| Manifest::from_value(v).unwrap())
            .collect();
        Bundle::assemble(annotations, manifests, Vec::new(), Vec::new()).unwrap()
    }

    fn csv(owned_crd: &str) -> serde_json::Value {
        json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "ClusterServiceVersion",
            "metadata": { "name": "etcdoperator.v0.9.4" },
            "spec": {
                "version": "0.9.4",
                "customresourcedefinitions": {
                    "owned": [ { "name": owned_crd, "version": "v1beta2", "kind": "EtcdCluster" } ]
                },
                "install": {
                    "strategy": "deployment",
                    "spec": {
                        "permissions": [ { "serviceAccountName": "etcd-operator", "rules": [] } ],
                        "deployments": []
                    }
                }
            }
        })
    }

    fn crd() -> serde_json::Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": { "name": "etcdclusters.etcd.database.coreos.com" },
            "spec": {
                "group": "etcd.database.coreos.com",
                "names": { "kind": "EtcdCluster", "plural": "etcdclusters" },
                "versions": [ { "name": "v1beta2", "served": true, "storage": true } ]
            }
        })
    }

    fn run(bundle: &Bundle) -> Vec<Finding> {
        BundleValidator.validate(&ValidationObject::Bundle(bundle), &Options::new())
    }

    #[test]
    fn test_complete_bundle_is_clean() {
        let b = bundle(vec![csv("etcdclusters.etcd.database.coreos.com"), crd()]);
        let findings = run(&b);
        assert!(findings.iter().all(|f| f.level != crate::Severity::Error), "{findings:?}");
    }

    #[test]
    fn test_missing_owned_crd_is_error() {
        let b = bundle(vec![csv("etcdclusters.etcd.database.coreos.com")]);
        let findings = run(&b);
        assert!(findings.iter().any(|f| f.level == crate::Severity::Error));
    }

    #[test]
    fn test_shadowed_service_account_is_error() {
        let sa = json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": { "name": "etcd-operator" }
        });
        let b = bundle(vec![csv("etcdclusters.etcd.database.coreos.com"), crd(), sa]);
        let findings = run(&b);
        assert!(
            findings
                .iter()
                .any(|f| f.message.contains("shadows") && f.level == crate::Severity::Error)
        );
    }
}
