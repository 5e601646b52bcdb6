//! ClusterServiceVersion validation

use once_cell::sync::Lazy;
use regex::Regex;

use opcat_core::ClusterServiceVersion;

use crate::{Finding, Options, ValidationObject, Validator};

/// `<lowercase dns subdomain>.v<semver>`
static CSV_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*\.v(?P<version>.+)$")
        .expect("CSV name pattern compiles")
});

pub struct CsvValidator;

impl Validator for CsvValidator {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn accepts(&self, object: &ValidationObject<'_>) -> bool {
        matches!(object, ValidationObject::Csv(_) | ValidationObject::Bundle(_))
    }

    fn validate(&self, object: &ValidationObject<'_>, _options: &Options) -> Vec<Finding> {
        let csv = match object {
            ValidationObject::Csv(csv) => csv,
            ValidationObject::Bundle(bundle) => bundle.csv(),
            _ => return Vec::new(),
        };
        let mut findings = Vec::new();
        check_name(csv, &mut findings);
        check_version(csv, &mut findings);
        check_install_modes(csv, &mut findings);
        check_examples(csv, &mut findings);
        findings
    }
}

fn check_name(csv: &ClusterServiceVersion, findings: &mut Vec<Finding>) {
    match CSV_NAME.captures(&csv.name) {
        None => findings.push(Finding::error(
            &csv.name,
            "name must be <lowercase-dns-subdomain>.v<semver>",
        )),
        Some(captures) => {
            let tail = &captures["version"];
            if semver::Version::parse(tail).is_err() {
                findings.push(Finding::error(
                    &csv.name,
                    format!("name suffix {tail:?} is not a semantic version"),
                ));
            } else if !csv.spec.version.is_empty() && tail != csv.spec.version {
                findings.push(Finding::warning(
                    &csv.name,
                    format!(
                        "name version {tail:?} differs from spec.version {:?}",
                        csv.spec.version
                    ),
                ));
            }
        }
    }
}

fn check_version(csv: &ClusterServiceVersion, findings: &mut Vec<Finding>) {
    if csv.spec.version.is_empty() {
        findings.push(Finding::error(&csv.name, "spec.version is empty"));
    } else if csv.version().is_err() {
        findings.push(Finding::error(
            &csv.name,
            format!("spec.version {:?} is not a semantic version", csv.spec.version),
        ));
    }
}

fn check_install_modes(csv: &ClusterServiceVersion, findings: &mut Vec<Finding>) {
    if csv.spec.install_modes.is_empty() {
        findings.push(Finding::error(&csv.name, "spec.installModes is empty"));
        return;
    }
    if !csv.spec.install_modes.iter().any(|m| m.supported) {
        findings.push(Finding::error(
            &csv.name,
            "no install mode is marked supported",
        ));
    }

    let declares_conversion = csv
        .spec
        .webhook_definitions
        .iter()
        .any(|w| !w.conversion_crds.is_empty());
    let supports_all_namespaces = csv
        .spec
        .install_modes
        .iter()
        .any(|m| m.type_ == "AllNamespaces" && m.supported);
    if declares_conversion && !supports_all_namespaces {
        findings.push(Finding::error(
            &csv.name,
            "conversion webhooks require the AllNamespaces install mode",
        ));
    }
}

/// The alm-examples annotation must decode as a sequence of objects whose
/// GVKs the CSV actually provides.
fn check_examples(csv: &ClusterServiceVersion, findings: &mut Vec<Finding>) {
    let examples = match csv.alm_examples() {
        Ok(examples) => examples,
        Err(e) => {
            findings.push(Finding::error(
                &csv.name,
                format!("alm-examples annotation does not decode: {e}"),
            ));
            return;
        }
    };

    let provided = csv.provided_apis();
    for example in examples {
        let kind = example.get("kind").and_then(|k| k.as_str()).unwrap_or("");
        let api_version = example
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if kind.is_empty() || api_version.is_empty() {
            findings.push(Finding::error(
                &csv.name,
                "alm-examples entry is missing kind or apiVersion",
            ));
            continue;
        }
        let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
        let known = provided
            .iter()
            .any(|api| api.group == group && api.version == version && api.kind == kind);
        if !known {
            findings.push(Finding::warning(
                &csv.name,
                format!("alm-examples entry {api_version}/{kind} is not a provided API"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;
    use serde_json::json;

    fn csv(name: &str, version: &str) -> ClusterServiceVersion {
        ClusterServiceVersion::parse(json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "ClusterServiceVersion",
            "metadata": { "name": name },
            "spec": {
                "version": version,
                "installModes": [ { "type": "AllNamespaces", "supported": true } ]
            }
        }))
        .unwrap()
    }

    fn run(csv: &ClusterServiceVersion) -> Vec<Finding> {
        CsvValidator.validate(&ValidationObject::Csv(csv), &Options::new())
    }

    #[test]
    fn test_wellformed_csv() {
        let findings = run(&csv("etcdoperator.v0.9.4", "0.9.4"));
        assert!(findings.is_empty(), "{findings:?}");
    }

    #[test]
    fn test_bad_name_shape() {
        let findings = run(&csv("EtcdOperator-0.9.4", "0.9.4"));
        assert!(findings.iter().any(|f| f.level == Severity::Error));
    }

    #[test]
    fn test_name_version_mismatch_warns() {
        let findings = run(&csv("etcdoperator.v0.9.4", "0.9.5"));
        assert!(findings.iter().any(|f| f.level == Severity::Warning));
    }

    #[test]
    fn test_empty_install_modes() {
        let csv = ClusterServiceVersion::parse(json!({
            "kind": "ClusterServiceVersion",
            "metadata": { "name": "etcdoperator.v0.9.4" },
            "spec": { "version": "0.9.4" }
        }))
        .unwrap();
        let findings = run(&csv);
        assert!(findings.iter().any(|f| f.message.contains("installModes")));
    }

    #[test]
    fn test_conversion_needs_all_namespaces() {
        let csv = ClusterServiceVersion::parse(json!({
            "kind": "ClusterServiceVersion",
            "metadata": { "name": "etcdoperator.v0.9.4" },
            "spec": {
                "version": "0.9.4",
                "installModes": [ { "type": "OwnNamespace", "supported": true } ],
                "webhookdefinitions": [
                    { "type": "ConversionWebhook", "conversionCRDs": ["etcdclusters.etcd.database.coreos.com"] }
                ]
            }
        }))
        .unwrap();
        let findings = run(&csv);
        assert!(findings.iter().any(|f| f.message.contains("conversion")));
    }

    #[test]
    fn test_unknown_example_gvk_warns() {
        let csv = ClusterServiceVersion::parse(json!({
            "kind": "ClusterServiceVersion",
            "metadata": {
                "name": "etcdoperator.v0.9.4",
                "annotations": {
                    "alm-examples": "[{\"apiVersion\": \"etcd.database.coreos.com/v1beta2\", \"kind\": \"EtcdCluster\"}]"
                }
            },
            "spec": {
                "version": "0.9.4",
                "installModes": [ { "type": "AllNamespaces", "supported": true } ]
            }
        }))
        .unwrap();
        let findings = run(&csv);
        assert!(findings.iter().any(|f| f.level == Severity::Warning));
    }
}
