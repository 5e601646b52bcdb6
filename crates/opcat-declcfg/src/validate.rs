//! Catalog model validation
//!
//! Lifts the loaded records into the upgrade-graph summary the validator
//! suite understands and adds the record-level rules only the file form
//! needs (entry names resolve, default channels exist, version conflicts).

use std::collections::{BTreeMap, BTreeSet};

use opcat_core::SkipRange;
use opcat_core::property::property_types;
use opcat_validate::{
    Finding, GraphBundle, UpgradeGraph, ValidationObject, ValidationReport, ValidatorSet,
};

use crate::types::{DeclarativeConfig, SCHEMA_BUNDLE};

/// Validate a loaded catalog. The report carries every finding; callers
/// gate on `has_errors`.
pub fn validate(config: &DeclarativeConfig) -> ValidationReport {
    let mut findings = Vec::new();

    check_bundles_exist(config, &mut findings);
    check_default_channels(config, &mut findings);
    check_channel_version_conflicts(config, &mut findings);

    let suite = ValidatorSet::builder().with_required().build();
    for package in &config.packages {
        let graphs = channel_graphs(config, &package.name);
        let objects: Vec<ValidationObject<'_>> =
            graphs.iter().map(ValidationObject::Graph).collect();
        findings.extend(suite.run(&objects).findings);
    }

    findings.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.locator.cmp(&b.locator)));
    ValidationReport { findings }
}

/// Every channel entry must name a bundle record of the same package.
fn check_bundles_exist(config: &DeclarativeConfig, findings: &mut Vec<Finding>) {
    for channel in &config.channels {
        for entry in &channel.entries {
            let exists = config
                .bundles
                .iter()
                .any(|b| b.name == entry.name && b.package == channel.package);
            if !exists {
                findings.push(Finding::error(
                    format!("{}/{}", channel.package, channel.name),
                    format!("entry {:?} has no olm.bundle record", entry.name),
                ));
            }
        }
    }
}

fn check_default_channels(config: &DeclarativeConfig, findings: &mut Vec<Finding>) {
    for package in &config.packages {
        let Some(default) = &package.default_channel else {
            continue;
        };
        let exists = config
            .channels_of(&package.name)
            .any(|c| &c.name == default);
        if !exists {
            findings.push(Finding::error(
                &package.name,
                format!("defaultChannel {default:?} has no olm.channel record"),
            ));
        }
    }
}

/// Within one channel, two entries must not carry the same version.
fn check_channel_version_conflicts(config: &DeclarativeConfig, findings: &mut Vec<Finding>) {
    for channel in &config.channels {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for entry in &channel.entries {
            let Some(version) = bundle_version(config, &entry.name) else {
                continue;
            };
            if let Some(previous) = seen.insert(version.clone(), &entry.name) {
                findings.push(Finding::error(
                    format!("{}/{}", channel.package, channel.name),
                    format!(
                        "version {version} is carried by both {previous:?} and {:?}",
                        entry.name
                    ),
                ));
            }
        }
    }
}

/// One upgrade-graph summary per channel of the package. Entries become
/// graph bundles; deprecated references become tombstones.
fn channel_graphs(config: &DeclarativeConfig, package: &str) -> Vec<UpgradeGraph> {
    let tombstones: BTreeSet<String> = config
        .deprecations_of(package)
        .map(|d| {
            d.entries
                .iter()
                .filter(|e| e.reference.schema == SCHEMA_BUNDLE)
                .map(|e| e.reference.name.clone())
                .collect()
        })
        .unwrap_or_default();

    config
        .channels_of(package)
        .map(|channel| UpgradeGraph {
            package: format!("{}/{}", package, channel.name),
            default_channel: None,
            bundles: channel
                .entries
                .iter()
                .map(|entry| GraphBundle {
                    name: entry.name.clone(),
                    version: bundle_version(config, &entry.name)
                        .and_then(|v| semver::Version::parse(&v).ok()),
                    replaces: entry.replaces.clone(),
                    skips: entry.skips.clone(),
                    skip_range: entry
                        .skip_range
                        .as_deref()
                        .and_then(|r| SkipRange::parse(r).ok()),
                    channels: vec![channel.name.clone()],
                })
                .collect(),
            tombstones: tombstones.clone(),
        })
        .collect()
}

/// A bundle's version, read from its package-identity property.
fn bundle_version(config: &DeclarativeConfig, bundle: &str) -> Option<String> {
    let record = config.bundle(bundle)?;
    record
        .properties
        .iter()
        .find(|p| p.type_ == property_types::PACKAGE)
        .and_then(|p| p.value.get("version"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use opcat_core::Property;

    fn config() -> DeclarativeConfig {
        DeclarativeConfig {
            packages: vec![PackageRecord {
                schema: SCHEMA_PACKAGE.into(),
                name: "etcd".into(),
                default_channel: Some("stable".into()),
                ..Default::default()
            }],
            channels: vec![ChannelRecord {
                schema: SCHEMA_CHANNEL.into(),
                package: "etcd".into(),
                name: "stable".into(),
                entries: vec![
                    ChannelEntry {
                        name: "etcdoperator.v0.9.2".into(),
                        ..Default::default()
                    },
                    ChannelEntry {
                        name: "etcdoperator.v0.9.4".into(),
                        replaces: Some("etcdoperator.v0.9.2".into()),
                        ..Default::default()
                    },
                ],
            }],
            bundles: vec![
                bundle_record("etcdoperator.v0.9.2", "0.9.2"),
                bundle_record("etcdoperator.v0.9.4", "0.9.4"),
            ],
            ..Default::default()
        }
    }

    fn bundle_record(name: &str, version: &str) -> BundleRecord {
        BundleRecord {
            schema: SCHEMA_BUNDLE.into(),
            package: "etcd".into(),
            name: name.into(),
            properties: vec![Property::package("etcd", version)],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_catalog() {
        let report = validate(&config());
        assert!(!report.has_errors(), "{:?}", report.findings);
    }

    #[test]
    fn test_entry_without_bundle_record() {
        let mut c = config();
        c.bundles.remove(0);
        let report = validate(&c);
        assert!(report.has_errors());
    }

    #[test]
    fn test_default_channel_must_exist() {
        let mut c = config();
        c.packages[0].default_channel = Some("missing".into());
        assert!(validate(&c).has_errors());
    }

    #[test]
    fn test_version_conflict_in_channel() {
        let mut c = config();
        c.bundles[0] = bundle_record("etcdoperator.v0.9.2", "0.9.4");
        assert!(
            validate(&c)
                .findings
                .iter()
                .any(|f| f.message.contains("carried by both"))
        );
    }

    #[test]
    fn test_tombstone_legitimizes_dangling_replaces() {
        let mut c = config();
        c.channels[0].entries.remove(0);
        c.bundles.remove(0);
        // dangling replaces first
        assert!(validate(&c).has_errors());

        c.deprecations.push(DeprecationsRecord {
            schema: SCHEMA_DEPRECATIONS.into(),
            package: "etcd".into(),
            entries: vec![DeprecationEntry {
                reference: DeprecationRef {
                    schema: SCHEMA_BUNDLE.into(),
                    name: "etcdoperator.v0.9.2".into(),
                },
                message: "superseded".into(),
            }],
        });
        assert!(!validate(&c).has_errors());
    }
}
