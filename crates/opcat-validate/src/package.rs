//! Package manifest validation

use std::collections::BTreeSet;

use opcat_core::PackageManifest;

use crate::{Finding, Options, ValidationObject, Validator};

pub struct PackageManifestValidator;

impl Validator for PackageManifestValidator {
    fn name(&self) -> &'static str {
        "package-manifest"
    }

    fn accepts(&self, object: &ValidationObject<'_>) -> bool {
        matches!(object, ValidationObject::PackageManifest(_))
    }

    fn validate(&self, object: &ValidationObject<'_>, _options: &Options) -> Vec<Finding> {
        let ValidationObject::PackageManifest(manifest) = object else {
            return Vec::new();
        };
        check(manifest)
    }
}

fn check(manifest: &PackageManifest) -> Vec<Finding> {
    let locator = if manifest.package_name.is_empty() {
        "<unnamed package>".to_string()
    } else {
        manifest.package_name.clone()
    };
    let mut findings = Vec::new();

    if manifest.package_name.is_empty() {
        findings.push(Finding::error(&locator, "packageName is empty"));
    }
    if manifest.channels.is_empty() {
        findings.push(Finding::error(&locator, "channel list is empty"));
    }

    let mut seen = BTreeSet::new();
    for channel in &manifest.channels {
        if !seen.insert(channel.name.as_str()) {
            findings.push(Finding::error(
                &locator,
                format!("duplicate channel {:?}", channel.name),
            ));
        }
        if channel.current_csv.is_empty() {
            findings.push(Finding::error(
                &locator,
                format!("channel {:?} has no currentCSV", channel.name),
            ));
        }
    }

    if let Some(default) = &manifest.default_channel_name {
        if !manifest.channels.iter().any(|c| &c.name == default) {
            findings.push(Finding::error(
                &locator,
                format!("defaultChannel {default:?} is not one of the channels"),
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;
    use opcat_core::package::PackageChannel;

    fn manifest(default: Option<&str>, channels: &[(&str, &str)]) -> PackageManifest {
        PackageManifest {
            package_name: "etcd".into(),
            channels: channels
                .iter()
                .map(|(name, csv)| PackageChannel {
                    name: name.to_string(),
                    current_csv: csv.to_string(),
                })
                .collect(),
            default_channel_name: default.map(String::from),
        }
    }

    #[test]
    fn test_clean_manifest() {
        let m = manifest(Some("stable"), &[("stable", "etcdoperator.v0.9.4")]);
        assert!(check(&m).is_empty());
    }

    #[test]
    fn test_unknown_default_channel() {
        let m = manifest(Some("beta"), &[("stable", "etcdoperator.v0.9.4")]);
        assert!(check(&m).iter().any(|f| f.level == Severity::Error));
    }

    #[test]
    fn test_duplicate_channels() {
        let m = manifest(
            None,
            &[("stable", "etcdoperator.v0.9.4"), ("stable", "etcdoperator.v0.9.2")],
        );
        assert!(check(&m).iter().any(|f| f.message.contains("duplicate")));
    }

    #[test]
    fn test_empty_channel_list() {
        let m = manifest(None, &[]);
        assert!(check(&m).iter().any(|f| f.message.contains("empty")));
    }
}
