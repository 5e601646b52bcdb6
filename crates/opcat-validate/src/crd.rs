//! CustomResourceDefinition validation

use opcat_core::CrdManifest;

use crate::{Finding, Options, ValidationObject, Validator};

pub struct CrdValidator;

impl Validator for CrdValidator {
    fn name(&self) -> &'static str {
        "crd"
    }

    fn accepts(&self, object: &ValidationObject<'_>) -> bool {
        matches!(object, ValidationObject::Crd(_) | ValidationObject::Bundle(_))
    }

    fn validate(&self, object: &ValidationObject<'_>, _options: &Options) -> Vec<Finding> {
        match object {
            ValidationObject::Crd(crd) => check(crd),
            ValidationObject::Bundle(bundle) => bundle.crds().flat_map(check).collect(),
            _ => Vec::new(),
        }
    }
}

fn check(crd: &CrdManifest) -> Vec<Finding> {
    let mut findings = Vec::new();

    if crd.plural.is_empty() {
        findings.push(Finding::error(&crd.name, "spec.names.plural is empty"));
    } else {
        let expected = format!("{}.{}", crd.plural, crd.group);
        if crd.name != expected {
            findings.push(Finding::error(
                &crd.name,
                format!("metadata.name must be {expected:?} (plural.group)"),
            ));
        }
    }

    match crd.storage_version_count() {
        0 => findings.push(Finding::error(&crd.name, "no version is flagged as storage")),
        1 => {}
        n => findings.push(Finding::error(
            &crd.name,
            format!("{n} versions are flagged as storage; at most one is allowed"),
        )),
    }

    if !crd.versions.iter().any(|v| v.served) {
        findings.push(Finding::warning(&crd.name, "no version is served"));
    }

    findings
}
