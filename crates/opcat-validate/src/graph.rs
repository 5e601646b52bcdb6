//! Upgrade graph validation
//!
//! Works over a package-level summary of every bundle's graph edges, so it
//! can run against a loaded store, a file-based catalog, or a directory of
//! bundles about to be ingested.

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;

use opcat_core::SkipRange;

use crate::{Finding, Options, ValidationObject, Validator};

/// One bundle's graph-relevant facts.
#[derive(Debug, Clone, Default)]
pub struct GraphBundle {
    pub name: String,
    pub version: Option<Version>,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
    pub skip_range: Option<SkipRange>,
    pub channels: Vec<String>,
}

/// A package's upgrade graph as the validator sees it.
#[derive(Debug, Clone, Default)]
pub struct UpgradeGraph {
    pub package: String,
    pub default_channel: Option<String>,
    pub bundles: Vec<GraphBundle>,
    /// Names a dangling reference may legitimately point at.
    pub tombstones: BTreeSet<String>,
}

impl UpgradeGraph {
    fn bundle(&self, name: &str) -> Option<&GraphBundle> {
        self.bundles.iter().find(|b| b.name == name)
    }

    fn channel_members(&self, channel: &str) -> impl Iterator<Item = &GraphBundle> {
        self.bundles
            .iter()
            .filter(move |b| b.channels.iter().any(|c| c == channel))
    }

    fn channels(&self) -> BTreeSet<&str> {
        self.bundles
            .iter()
            .flat_map(|b| b.channels.iter().map(String::as_str))
            .collect()
    }
}

pub struct UpgradeGraphValidator;

impl Validator for UpgradeGraphValidator {
    fn name(&self) -> &'static str {
        "upgrade-graph"
    }

    fn accepts(&self, object: &ValidationObject<'_>) -> bool {
        matches!(object, ValidationObject::Graph(_))
    }

    fn validate(&self, object: &ValidationObject<'_>, _options: &Options) -> Vec<Finding> {
        let ValidationObject::Graph(graph) = object else {
            return Vec::new();
        };
        let mut findings = Vec::new();
        check_references(graph, &mut findings);
        check_cycles(graph, &mut findings);
        check_unique_replacer(graph, &mut findings);
        check_skip_ranges(graph, &mut findings);
        check_skips_replaces_overlap(graph, &mut findings);
        findings
    }
}

/// Every replaces/skips reference resolves to a bundle or a tombstone.
fn check_references(graph: &UpgradeGraph, findings: &mut Vec<Finding>) {
    for bundle in &graph.bundles {
        if let Some(target) = &bundle.replaces {
            if graph.bundle(target).is_none() && !graph.tombstones.contains(target) {
                findings.push(Finding::error(
                    &bundle.name,
                    format!("replaces {target:?}, which does not exist"),
                ));
            }
        }
        for skip in &bundle.skips {
            if graph.bundle(skip).is_none() && !graph.tombstones.contains(skip) {
                findings.push(Finding::warning(
                    &bundle.name,
                    format!("skips {skip:?}, which does not exist"),
                ));
            }
        }
    }
}

/// Walk the replaces chain from every bundle; revisiting a name is a cycle.
fn check_cycles(graph: &UpgradeGraph, findings: &mut Vec<Finding>) {
    for start in &graph.bundles {
        let mut seen = BTreeSet::new();
        let mut cursor = Some(start.name.clone());
        while let Some(current) = cursor {
            if !seen.insert(current.clone()) {
                findings.push(Finding::error(
                    &start.name,
                    format!("replaces chain loops through {current:?}"),
                ));
                break;
            }
            cursor = graph.bundle(&current).and_then(|b| b.replaces.clone());
        }
    }
}

/// Within one channel, a bundle may be replaced by at most one other.
fn check_unique_replacer(graph: &UpgradeGraph, findings: &mut Vec<Finding>) {
    for channel in graph.channels() {
        let mut replacers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for bundle in graph.channel_members(channel) {
            if let Some(target) = &bundle.replaces {
                replacers.entry(target).or_default().push(&bundle.name);
            }
        }
        for (target, bundles) in replacers {
            if bundles.len() > 1 {
                findings.push(Finding::error(
                    target,
                    format!(
                        "replaced by {} bundles in channel {channel:?}: {}",
                        bundles.len(),
                        bundles.join(", ")
                    ),
                ));
            }
        }
    }
}

/// A skipRange never includes the declaring bundle's own version.
fn check_skip_ranges(graph: &UpgradeGraph, findings: &mut Vec<Finding>) {
    for bundle in &graph.bundles {
        let (Some(range), Some(version)) = (&bundle.skip_range, &bundle.version) else {
            continue;
        };
        if range.matches(version) {
            findings.push(Finding::error(
                &bundle.name,
                format!("skipRange {range} includes its own version {version}"),
            ));
        }
    }
}

/// Skipping the bundle you also replace is redundant.
fn check_skips_replaces_overlap(graph: &UpgradeGraph, findings: &mut Vec<Finding>) {
    for bundle in &graph.bundles {
        if let Some(target) = &bundle.replaces {
            if bundle.skips.iter().any(|s| s == target) {
                findings.push(Finding::warning(
                    &bundle.name,
                    format!("skips {target:?}, which it already replaces"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;

    fn bundle(name: &str, version: &str, replaces: Option<&str>) -> GraphBundle {
        GraphBundle {
            name: name.into(),
            version: Some(Version::parse(version).unwrap()),
            replaces: replaces.map(String::from),
            channels: vec!["stable".into()],
            ..Default::default()
        }
    }

    fn run(graph: &UpgradeGraph) -> Vec<Finding> {
        UpgradeGraphValidator.validate(&ValidationObject::Graph(graph), &Options::new())
    }

    #[test]
    fn test_linear_chain_is_clean() {
        let graph = UpgradeGraph {
            package: "etcd".into(),
            bundles: vec![
                bundle("etcd.v0.9.0", "0.9.0", None),
                bundle("etcd.v0.9.2", "0.9.2", Some("etcd.v0.9.0")),
            ],
            ..Default::default()
        };
        assert!(run(&graph).is_empty());
    }

    #[test]
    fn test_dangling_replaces_is_error_unless_tombstoned() {
        let mut graph = UpgradeGraph {
            package: "etcd".into(),
            bundles: vec![bundle("etcd.v0.9.2", "0.9.2", Some("etcd.v0.9.0"))],
            ..Default::default()
        };
        assert!(run(&graph).iter().any(|f| f.level == Severity::Error));

        graph.tombstones.insert("etcd.v0.9.0".into());
        assert!(run(&graph).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let graph = UpgradeGraph {
            package: "etcd".into(),
            bundles: vec![
                bundle("a", "1.0.0", Some("b")),
                bundle("b", "1.1.0", Some("a")),
            ],
            ..Default::default()
        };
        assert!(run(&graph).iter().any(|f| f.message.contains("loops")));
    }

    #[test]
    fn test_double_replacer_in_channel() {
        let graph = UpgradeGraph {
            package: "etcd".into(),
            bundles: vec![
                bundle("a", "1.0.0", None),
                bundle("b", "1.1.0", Some("a")),
                bundle("c", "1.2.0", Some("a")),
            ],
            ..Default::default()
        };
        assert!(run(&graph).iter().any(|f| f.message.contains("replaced by 2")));
    }

    #[test]
    fn test_self_covering_skip_range() {
        let mut b = bundle("a", "1.0.0", None);
        b.skip_range = Some(SkipRange::parse(">=0.9.0 <1.1.0").unwrap());
        let graph = UpgradeGraph {
            package: "etcd".into(),
            bundles: vec![b],
            ..Default::default()
        };
        assert!(run(&graph).iter().any(|f| f.message.contains("own version")));
    }

    #[test]
    fn test_skip_of_replaces_target_warns() {
        let mut b = bundle("b", "1.1.0", Some("a"));
        b.skips = vec!["a".into()];
        let graph = UpgradeGraph {
            package: "etcd".into(),
            bundles: vec![bundle("a", "1.0.0", None), b],
            ..Default::default()
        };
        assert!(run(&graph).iter().any(|f| f.level == Severity::Warning));
    }
}
