//! Runtime-configurable validators
//!
//! These are opt-in and read their parameters from the validator set's
//! string-keyed options map (see `option_keys`). They never fail an ingest
//! on a missing option; they degrade to an info finding instead.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;

use crate::{Finding, Options, ValidationObject, Validator, option_keys};

/// APIs removed from Kubernetes, by the minor release that removed them:
/// (removal version, api group/version, kind or "*").
const REMOVED_APIS: &[(u64, &str, &str)] = &[
    (16, "extensions/v1beta1", "Deployment"),
    (16, "extensions/v1beta1", "DaemonSet"),
    (16, "extensions/v1beta1", "ReplicaSet"),
    (22, "apiextensions.k8s.io/v1beta1", "CustomResourceDefinition"),
    (22, "admissionregistration.k8s.io/v1beta1", "*"),
    (22, "rbac.authorization.k8s.io/v1beta1", "*"),
    (25, "policy/v1beta1", "PodDisruptionBudget"),
    (25, "batch/v1beta1", "CronJob"),
    (26, "autoscaling/v2beta2", "HorizontalPodAutoscaler"),
];

/// Flags objects whose API no longer exists at the configured Kubernetes
/// version (`k8s-version` option, e.g. `1.25`).
pub struct RemovedApisValidator;

impl RemovedApisValidator {
    pub const NAME: &'static str = "removed-apis";
}

impl Validator for RemovedApisValidator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn accepts(&self, object: &ValidationObject<'_>) -> bool {
        matches!(object, ValidationObject::Bundle(_))
    }

    fn validate(&self, object: &ValidationObject<'_>, options: &Options) -> Vec<Finding> {
        let ValidationObject::Bundle(bundle) = object else {
            return Vec::new();
        };
        let Some(raw) = options.get(option_keys::K8S_VERSION) else {
            return vec![Finding::info(
                &bundle.name,
                "removed-apis check skipped: no k8s-version option",
            )];
        };
        let Some(target_minor) = parse_minor(raw) else {
            return vec![Finding::warning(
                &bundle.name,
                format!("removed-apis check skipped: k8s-version {raw:?} does not parse"),
            )];
        };

        let mut findings = Vec::new();
        for manifest in bundle.manifests() {
            let api_version = manifest
                .raw()
                .get("apiVersion")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let kind = manifest.kind();
            for (removed_in, removed_api, removed_kind) in REMOVED_APIS {
                let kind_matches = *removed_kind == "*" || *removed_kind == kind;
                if api_version != *removed_api || !kind_matches {
                    continue;
                }
                let message = format!(
                    "{kind} uses {api_version}, removed in Kubernetes 1.{removed_in}"
                );
                if target_minor >= *removed_in {
                    findings.push(Finding::error(&bundle.name, message));
                } else {
                    findings.push(Finding::warning(&bundle.name, message));
                }
            }
        }
        findings
    }
}

fn parse_minor(raw: &str) -> Option<u64> {
    let mut parts = raw.trim().trim_start_matches('v').split('.');
    let major: u64 = parts.next()?.parse().ok()?;
    if major != 1 {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Architecture labels the CSV may carry.
const ARCH_LABEL_PREFIX: &str = "operatorframework.io/arch.";
const OS_LABEL_PREFIX: &str = "operatorframework.io/os.";

/// Checks the CSV's declared architecture/os support labels. Inspecting
/// the images themselves is the caller's business (the `container-tools`
/// option names the tool it would use); this validator covers what the
/// manifest alone can prove.
pub struct MultiArchValidator;

impl MultiArchValidator {
    pub const NAME: &'static str = "multiarch";
}

impl Validator for MultiArchValidator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn accepts(&self, object: &ValidationObject<'_>) -> bool {
        matches!(object, ValidationObject::Csv(_) | ValidationObject::Bundle(_))
    }

    fn validate(&self, object: &ValidationObject<'_>, options: &Options) -> Vec<Finding> {
        let csv = match object {
            ValidationObject::Csv(csv) => csv,
            ValidationObject::Bundle(bundle) => bundle.csv(),
            _ => return Vec::new(),
        };
        let mut findings = Vec::new();
        if let Some(tool) = options.get(option_keys::CONTAINER_TOOLS) {
            findings.push(Finding::info(
                &csv.name,
                format!("image-level architecture inspection delegated to {tool}"),
            ));
        }

        let labels = csv
            .raw
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.as_object());
        let arches: Vec<&str> = labels
            .map(|labels| {
                labels
                    .keys()
                    .filter_map(|k| k.strip_prefix(ARCH_LABEL_PREFIX))
                    .collect()
            })
            .unwrap_or_default();
        let oses: Vec<&str> = labels
            .map(|labels| {
                labels
                    .keys()
                    .filter_map(|k| k.strip_prefix(OS_LABEL_PREFIX))
                    .collect()
            })
            .unwrap_or_default();

        if arches.is_empty() {
            findings.push(Finding::info(
                &csv.name,
                "no architecture labels; consumers assume amd64 only",
            ));
        }
        if !oses.is_empty() && !oses.contains(&"linux") {
            findings.push(Finding::warning(
                &csv.name,
                "os labels are set but linux is not among them",
            ));
        }
        findings
    }
}

/// The category whitelist OperatorHub accepts, overridable through the
/// `OPERATOR_BUNDLE_CATEGORIES` environment variable (a JSON file with a
/// `categories` array).
pub const CATEGORIES_ENV: &str = "OPERATOR_BUNDLE_CATEGORIES";

static DEFAULT_CATEGORIES: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "AI/Machine Learning",
        "Application Runtime",
        "Big Data",
        "Cloud Provider",
        "Database",
        "Developer Tools",
        "Drivers and plugins",
        "Integration & Delivery",
        "Logging & Tracing",
        "Modernization & Migration",
        "Monitoring",
        "Networking",
        "OpenShift Optional",
        "Security",
        "Storage",
        "Streaming & Messaging",
    ]
    .into()
});

/// OperatorHub publication policy: categories from the whitelist, a
/// provider, a description and an icon.
pub struct OperatorHubValidator {
    categories: BTreeSet<String>,
}

impl OperatorHubValidator {
    pub const NAME: &'static str = "operatorhub";

    /// Build with the default whitelist, overridden by the categories file
    /// named in `OPERATOR_BUNDLE_CATEGORIES` when set.
    pub fn from_env() -> Self {
        match std::env::var(CATEGORIES_ENV) {
            Ok(path) => match Self::load_categories(&path) {
                Ok(categories) => Self { categories },
                Err(e) => {
                    tracing::warn!("ignoring {CATEGORIES_ENV}={path}: {e}");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    fn load_categories(path: &str) -> std::io::Result<BTreeSet<String>> {
        #[derive(serde::Deserialize)]
        struct CategoriesFile {
            categories: Vec<String>,
        }
        let content = std::fs::read_to_string(path)?;
        let file: CategoriesFile = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(file.categories.into_iter().collect())
    }
}

impl Default for OperatorHubValidator {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Validator for OperatorHubValidator {
    fn name(&self) -> &'static str {
        Self::NAME
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

        if let Some(raw) = csv.annotations.get(opcat_core::csv::CATEGORIES_ANNOTATION) {
            for category in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                if !self.categories.contains(category) {
                    findings.push(Finding::error(
                        &csv.name,
                        format!("category {category:?} is not in the accepted list"),
                    ));
                }
            }
        }
        if csv.spec.provider.as_ref().and_then(|p| p.name.as_deref()).is_none() {
            findings.push(Finding::warning(&csv.name, "spec.provider.name is not set"));
        }
        if csv.spec.description.as_deref().unwrap_or("").is_empty() {
            findings.push(Finding::warning(&csv.name, "spec.description is empty"));
        }
        if csv.spec.icon.is_empty() {
            findings.push(Finding::warning(&csv.name, "spec.icon is not set"));
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;
    use opcat_core::ClusterServiceVersion;
    use serde_json::json;

    fn csv_with(metadata: serde_json::Value) -> ClusterServiceVersion {
        ClusterServiceVersion::parse(json!({
            "kind": "ClusterServiceVersion",
            "metadata": metadata,
            "spec": { "version": "1.0.0" }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_minor() {
        assert_eq!(parse_minor("1.25"), Some(25));
        assert_eq!(parse_minor("v1.22.3"), Some(22));
        assert_eq!(parse_minor("2.0"), None);
        assert_eq!(parse_minor("latest"), None);
    }

    #[test]
    fn test_operatorhub_rejects_unknown_category() {
        let csv = csv_with(json!({
            "name": "etcdoperator.v1.0.0",
            "annotations": { "categories": "Database, Blockchain" }
        }));
        let findings =
            OperatorHubValidator::default().validate(&ValidationObject::Csv(&csv), &Options::new());
        assert!(
            findings
                .iter()
                .any(|f| f.level == Severity::Error && f.message.contains("Blockchain"))
        );
        assert!(!findings.iter().any(|f| f.message.contains("Database\" is not")));
    }

    #[test]
    fn test_operatorhub_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(&path, r#"{ "categories": ["Blockchain"] }"#).unwrap();

        let validator = OperatorHubValidator {
            categories: OperatorHubValidator::load_categories(path.to_str().unwrap()).unwrap(),
        };
        let csv = csv_with(json!({
            "name": "etcdoperator.v1.0.0",
            "annotations": { "categories": "Blockchain" }
        }));
        let findings = validator.validate(&ValidationObject::Csv(&csv), &Options::new());
        assert!(!findings.iter().any(|f| f.level == Severity::Error));
    }

    #[test]
    fn test_multiarch_info_without_labels() {
        let csv = csv_with(json!({ "name": "etcdoperator.v1.0.0" }));
        let findings =
            MultiArchValidator.validate(&ValidationObject::Csv(&csv), &Options::new());
        assert!(findings.iter().any(|f| f.message.contains("amd64")));
    }
}
