//! Opcat Validate - composable validators for catalog content
//!
//! A validator is a pure function from a typed object to a list of
//! findings. A `ValidatorSet` is assembled by its builder and owned by the
//! caller; there is no process-wide mutable registry. Each validator
//! declares which object kinds it accepts and runs for every matching
//! object in a pass.

pub mod bundle;
pub mod crd;
pub mod csv;
pub mod graph;
pub mod optional;
pub mod package;

use std::collections::BTreeMap;
use std::fmt;

use opcat_core::{Bundle, ClusterServiceVersion, CrdManifest, PackageManifest};

pub use graph::{GraphBundle, UpgradeGraph};

/// Recognized option keys for runtime-configurable validators.
pub mod option_keys {
    /// Kubernetes version the removed-APIs check validates against.
    pub const K8S_VERSION: &str = "k8s-version";
    /// Container tool used by the multi-architecture check.
    pub const CONTAINER_TOOLS: &str = "container-tools";
    /// Path of the index the OperatorHub check cross-references.
    pub const INDEX_PATH: &str = "index-path";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One validation result: severity, message, and what it points at.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Finding {
    pub level: Severity,
    pub message: String,
    /// What the finding is anchored to (bundle name, CSV name, file).
    pub locator: String,
}

impl Finding {
    pub fn error(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: Severity::Error,
            message: message.into(),
            locator: locator.into(),
        }
    }

    pub fn warning(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: Severity::Warning,
            message: message.into(),
            locator: locator.into(),
        }
    }

    pub fn info(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: Severity::Info,
            message: message.into(),
            locator: locator.into(),
        }
    }
}

/// The object kinds validators dispatch on.
#[derive(Debug, Clone, Copy)]
pub enum ValidationObject<'a> {
    Bundle(&'a Bundle),
    Csv(&'a ClusterServiceVersion),
    Crd(&'a CrdManifest),
    PackageManifest(&'a PackageManifest),
    Graph(&'a UpgradeGraph),
}

impl ValidationObject<'_> {
    /// A human-oriented anchor for findings about this object.
    pub fn locator(&self) -> String {
        match self {
            Self::Bundle(b) => b.name.clone(),
            Self::Csv(c) => c.name.clone(),
            Self::Crd(c) => c.name.clone(),
            Self::PackageManifest(p) => p.package_name.clone(),
            Self::Graph(g) => g.package.clone(),
        }
    }
}

/// String-keyed options consumed by the runtime-configurable validators.
pub type Options = BTreeMap<String, String>;

pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn accepts(&self, object: &ValidationObject<'_>) -> bool;
    fn validate(&self, object: &ValidationObject<'_>, options: &Options) -> Vec<Finding>;
}

/// A caller-owned collection of validators plus their options.
pub struct ValidatorSet {
    validators: Vec<Box<dyn Validator>>,
    options: Options,
}

impl ValidatorSet {
    pub fn builder() -> ValidatorSetBuilder {
        ValidatorSetBuilder::default()
    }

    /// The default suite: everything this system requires, none of the
    /// optional policy validators.
    pub fn default_set() -> Self {
        Self::builder().with_required().build()
    }

    pub fn run(&self, objects: &[ValidationObject<'_>]) -> ValidationReport {
        let mut findings = Vec::new();
        for object in objects {
            for validator in &self.validators {
                if validator.accepts(object) {
                    findings.extend(validator.validate(object, &self.options));
                }
            }
        }
        findings.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.locator.cmp(&b.locator)));
        ValidationReport { findings }
    }
}

#[derive(Default)]
pub struct ValidatorSetBuilder {
    validators: Vec<Box<dyn Validator>>,
    options: Options,
}

impl ValidatorSetBuilder {
    /// The validators this system requires for every ingest.
    pub fn with_required(mut self) -> Self {
        self.validators.push(Box::new(bundle::BundleValidator));
        self.validators.push(Box::new(csv::CsvValidator));
        self.validators.push(Box::new(crd::CrdValidator));
        self.validators.push(Box::new(package::PackageManifestValidator));
        self.validators.push(Box::new(graph::UpgradeGraphValidator));
        self
    }

    pub fn with(mut self, validator: Box<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Enable an optional validator by name; unknown names are ignored
    /// with a log line so option typos do not fail an ingest.
    pub fn with_optional(mut self, name: &str) -> Self {
        match name {
            optional::RemovedApisValidator::NAME => {
                self.validators.push(Box::new(optional::RemovedApisValidator))
            }
            optional::MultiArchValidator::NAME => {
                self.validators.push(Box::new(optional::MultiArchValidator))
            }
            optional::OperatorHubValidator::NAME => self
                .validators
                .push(Box::new(optional::OperatorHubValidator::from_env())),
            other => tracing::warn!("unknown optional validator {other:?}, skipping"),
        }
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ValidatorSet {
        ValidatorSet {
            validators: self.validators,
            options: self.options,
        }
    }
}

/// The outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.level == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.level == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.level == Severity::Warning)
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysWarn;
    impl Validator for AlwaysWarn {
        fn name(&self) -> &'static str {
            "always-warn"
        }
        fn accepts(&self, object: &ValidationObject<'_>) -> bool {
            matches!(object, ValidationObject::PackageManifest(_))
        }
        fn validate(&self, object: &ValidationObject<'_>, _: &Options) -> Vec<Finding> {
            vec![Finding::warning(object.locator(), "synthetic warning")]
        }
    }

    #[test]
    fn test_set_dispatches_on_kind() {
        let manifest = PackageManifest {
            package_name: "etcd".into(),
            channels: vec![],
            default_channel_name: None,
        };
        let set = ValidatorSet::builder().with(Box::new(AlwaysWarn)).build();
        let report = set.run(&[ValidationObject::PackageManifest(&manifest)]);
        assert_eq!(report.findings.len(), 1);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_errors_sort_first() {
        let report = ValidationReport {
            findings: vec![
                Finding::info("a", "i"),
                Finding::error("b", "e"),
                Finding::warning("c", "w"),
            ],
        };
        let mut sorted = report.findings.clone();
        sorted.sort_by(|a, b| b.level.cmp(&a.level));
        assert_eq!(sorted[0].level, Severity::Error);
    }
}
