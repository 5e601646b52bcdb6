//! In-memory channel graph
//!
//! The builder materializes one channel's bundles into a `ChannelGraph`,
//! applies the mutation under the selected update mode, verifies the graph
//! invariants, and hands back the entry rows to persist. Depth is 0 at the
//! head; each `replaces` hop increments it; a skip target sits at the same
//! depth as the bundle the skipper replaces.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use semver::Version;

use opcat_core::version::{order_versions, same_base_version};

use crate::error::{Result, StoreError};

/// Bound on the replaces walk; a chain deeper than this is treated as a
/// cycle that slipped past edge validation.
pub const MAX_CHAIN_DEPTH: usize = 31;

/// How a new bundle is integrated into a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Declared replaces/skips are respected verbatim.
    #[default]
    Replaces,
    /// Edges are synthesized from semantic-version order.
    Semver,
    /// As `Semver`, but lower patches of the same major.minor become skips.
    SemverSkippatch,
}

impl UpdateMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "replaces" => Some(Self::Replaces),
            "semver" => Some(Self::Semver),
            "semver-skippatch" => Some(Self::SemverSkippatch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replaces => "replaces",
            Self::Semver => "semver",
            Self::SemverSkippatch => "semver-skippatch",
        }
    }
}

/// One bundle's position in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub version: Version,
    pub replaces: Option<String>,
    pub skips: BTreeSet<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            replaces: None,
            skips: BTreeSet::new(),
        }
    }

    pub fn with_replaces(mut self, replaces: Option<String>) -> Self {
        self.replaces = replaces;
        self
    }

    pub fn with_skips<I: IntoIterator<Item = String>>(mut self, skips: I) -> Self {
        self.skips = skips.into_iter().collect();
        self
    }
}

/// An entry row ready to persist: the bundle's primary edge plus one skip
/// edge per present skip target, all at `depth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRow {
    pub bundle: String,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct ChannelGraph {
    pub package: String,
    pub name: String,
    nodes: BTreeMap<String, Node>,
}

impl ChannelGraph {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Restore a graph from persisted nodes (no validation; the store wrote
    /// them after a successful validate).
    pub fn from_nodes(
        package: impl Into<String>,
        name: impl Into<String>,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            nodes: nodes.into_iter().map(|n| (n.name.clone(), n)).collect(),
        }
    }

    /// Integrate `node` under `mode`. Returns warnings for conditions that
    /// only fail in non-permissive ingest (the caller decides).
    pub fn insert(
        &mut self,
        node: Node,
        mode: UpdateMode,
        permissive: bool,
    ) -> Result<Vec<String>> {
        if self.nodes.contains_key(&node.name) {
            return Err(StoreError::BundleAlreadyPresent(node.name));
        }
        self.reject_duplicate_version(&node)?;

        match mode {
            UpdateMode::Replaces => self.insert_replaces(node, permissive),
            UpdateMode::Semver => {
                self.nodes.insert(node.name.clone(), node);
                self.rebuild_semver(false)?;
                Ok(Vec::new())
            }
            UpdateMode::SemverSkippatch => {
                self.nodes.insert(node.name.clone(), node);
                self.rebuild_semver(true)?;
                Ok(Vec::new())
            }
        }
    }

    fn reject_duplicate_version(&self, node: &Node) -> Result<()> {
        if let Some(existing) = self
            .nodes
            .values()
            .find(|n| same_base_version(&n.version, &node.version))
        {
            return Err(StoreError::PackageVersionAlreadyPresent {
                package: self.package.clone(),
                channel: self.name.clone(),
                version: existing.version.to_string(),
            });
        }
        Ok(())
    }

    fn insert_replaces(&mut self, mut node: Node, permissive: bool) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if let Some(target) = node.replaces.clone() {
            if !self.nodes.contains_key(&target) {
                if !permissive {
                    return Err(StoreError::MissingReplacesTarget {
                        bundle: node.name,
                        target,
                        channel: self.name.clone(),
                    });
                }
                warnings.push(format!(
                    "bundle {} replaces {}, which is not in channel {}; leaving a dangling edge",
                    node.name, target, self.name
                ));
            }
        }
        for skip in &node.skips {
            if !self.nodes.contains_key(skip) && Some(skip) != node.replaces.as_ref() {
                warnings.push(format!(
                    "bundle {} skips {}, which is not in channel {}",
                    node.name, skip, self.name
                ));
            }
        }
        if node.skips.contains(&node.name) {
            node.skips.remove(&node.name);
            warnings.push(format!("bundle {} skips itself; ignoring", node.name));
        }

        self.nodes.insert(node.name.clone(), node);
        self.validate()?;
        Ok(warnings)
    }

    /// Rebuild the whole channel from semantic-version order, dropping
    /// declared edges. With `skip_patch`, only the highest entry of each
    /// (major, minor) group stays on the chain; the rest become its skips.
    fn rebuild_semver(&mut self, skip_patch: bool) -> Result<()> {
        let mut ordered: Vec<(String, Version)> = self
            .nodes
            .values()
            .map(|n| (n.name.clone(), n.version.clone()))
            .collect();
        ordered.sort_by(|a, b| order_versions(&b.1, &a.1));

        for pair in ordered.windows(2) {
            if same_base_version(&pair[0].1, &pair[1].1) {
                return Err(StoreError::PackageVersionAlreadyPresent {
                    package: self.package.clone(),
                    channel: self.name.clone(),
                    version: pair[0].1.to_string(),
                });
            }
        }

        // chain members, highest first, each with the skips it absorbs
        let mut chain: Vec<(String, Version, BTreeSet<String>)> = Vec::new();
        for (name, version) in &ordered {
            match chain.last_mut() {
                Some((_, leader_version, skips))
                    if skip_patch && is_same_minor(leader_version, version) =>
                {
                    skips.insert(name.clone());
                }
                _ => chain.push((name.clone(), version.clone(), BTreeSet::new())),
            }
        }

        for index in 0..chain.len() {
            let replaces = chain.get(index + 1).map(|(name, _, _)| name.clone());
            let (name, _, skips) = &chain[index];
            let node = self.nodes.get_mut(name).expect("chain member exists");
            node.replaces = replaces;
            node.skips = skips.clone();
        }
        // skipped entries hang off their leader; they keep no edges of
        // their own
        for (_, _, skips) in &chain {
            for skip in skips {
                let node = self.nodes.get_mut(skip).expect("skip member exists");
                node.replaces = None;
                node.skips = BTreeSet::new();
            }
        }

        self.validate()
    }

    /// Drop `name` from the channel, handing its position to nobody:
    /// survivors that replaced or skipped it lose that edge.
    pub fn remove(&mut self, name: &str) {
        self.nodes.remove(name);
        for node in self.nodes.values_mut() {
            if node.replaces.as_deref() == Some(name) {
                node.replaces = None;
            }
            node.skips.remove(name);
        }
    }

    /// Replace `target`'s position with `substitute`: the substitute takes
    /// the target's own edges, and every edge pointing at the target is
    /// re-parented to the substitute.
    pub fn substitute(&mut self, target: &str, mut substitute: Node) -> Result<()> {
        let Some(old) = self.nodes.remove(target) else {
            return Err(StoreError::not_found("bundle", target));
        };
        if substitute.replaces.is_none() {
            substitute.replaces = old.replaces;
        }
        substitute.skips.extend(old.skips);
        substitute.skips.remove(&substitute.name);

        let new_name = substitute.name.clone();
        for node in self.nodes.values_mut() {
            if node.replaces.as_deref() == Some(target) {
                node.replaces = Some(new_name.clone());
            }
            if node.skips.remove(target) {
                node.skips.insert(new_name.clone());
            }
        }
        self.nodes.insert(new_name, substitute);
        self.validate()
    }

    /// The transitive closure reachable downward from `name` via replaces
    /// and skips, including `name` itself.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                if let Some(target) = &node.replaces {
                    queue.push_back(target.clone());
                }
                for skip in &node.skips {
                    queue.push_back(skip.clone());
                }
            }
        }
        seen.into_iter().collect()
    }

    /// The unique head: the node no other node replaces or skips.
    pub fn head(&self) -> Result<&Node> {
        let mut referenced: BTreeSet<&str> = BTreeSet::new();
        for node in self.nodes.values() {
            if let Some(target) = &node.replaces {
                referenced.insert(target);
            }
            for skip in &node.skips {
                referenced.insert(skip);
            }
        }
        let heads: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| !referenced.contains(n.name.as_str()))
            .collect();
        match heads.as_slice() {
            [head] => Ok(*head),
            [] if self.nodes.is_empty() => Err(StoreError::not_found("channel", &self.name)),
            [] => Err(StoreError::Cycle(self.name.clone())),
            _ => Err(StoreError::MultipleHeads {
                package: self.package.clone(),
                channel: self.name.clone(),
                heads: heads.iter().map(|n| n.name.clone()).collect(),
            }),
        }
    }

    /// Verify the graph invariants: one head, no cycle, bounded depth,
    /// every member reachable, no duplicate versions.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        let head = self.head()?;

        // bounded replaces walk from the head
        let mut visited = BTreeSet::new();
        let mut cursor = Some(head.name.clone());
        let mut hops = 0usize;
        while let Some(current) = cursor {
            if !visited.insert(current.clone()) {
                return Err(StoreError::Cycle(current));
            }
            if hops > MAX_CHAIN_DEPTH {
                return Err(StoreError::ChainTooDeep {
                    channel: self.name.clone(),
                });
            }
            hops += 1;
            cursor = self
                .nodes
                .get(&current)
                .and_then(|n| n.replaces.clone())
                .filter(|t| self.nodes.contains_key(t));
        }

        // every member must be reachable from the head
        let depths = self.assign_depths(&head.name);
        if let Some(stranded) = self.nodes.keys().find(|n| !depths.contains_key(*n)) {
            return Err(StoreError::InvariantViolation(format!(
                "bundle {stranded} in channel {} is not reachable from head",
                self.name
            )));
        }

        let mut versions: Vec<&Version> = self.nodes.values().map(|n| &n.version).collect();
        versions.sort_by(|a, b| order_versions(a, b));
        for pair in versions.windows(2) {
            if same_base_version(pair[0], pair[1]) {
                return Err(StoreError::InvariantViolation(format!(
                    "channel {} carries version {} twice",
                    self.name, pair[0]
                )));
            }
        }
        Ok(())
    }

    /// Entry rows for persistence, deepest first so every referenced entry
    /// is written before its referrer.
    pub fn entries(&self) -> Result<Vec<EntryRow>> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }
        let head = self.head()?.name.clone();
        let depths = self.assign_depths(&head);

        let mut rows: Vec<EntryRow> = self
            .nodes
            .values()
            .map(|node| EntryRow {
                bundle: node.name.clone(),
                replaces: node
                    .replaces
                    .clone()
                    .filter(|t| self.nodes.contains_key(t)),
                skips: node
                    .skips
                    .iter()
                    .filter(|s| self.nodes.contains_key(*s))
                    .cloned()
                    .collect(),
                depth: depths.get(&node.name).copied().unwrap_or(0),
            })
            .collect();
        rows.sort_by(|a, b| b.depth.cmp(&a.depth).then_with(|| a.bundle.cmp(&b.bundle)));
        Ok(rows)
    }

    /// BFS depth assignment: the head is 0, a replaces or skip edge from a
    /// node at depth d puts its target at d+1 (keeping the minimum).
    fn assign_depths(&self, head: &str) -> HashMap<String, usize> {
        let mut depths: HashMap<String, usize> = HashMap::new();
        let mut queue = VecDeque::from([(head.to_string(), 0usize)]);
        while let Some((current, depth)) = queue.pop_front() {
            match depths.get(&current) {
                Some(&existing) if existing <= depth => continue,
                _ => {}
            }
            depths.insert(current.clone(), depth);
            if let Some(node) = self.nodes.get(&current) {
                if let Some(target) = &node.replaces {
                    if self.nodes.contains_key(target) {
                        queue.push_back((target.clone(), depth + 1));
                    }
                }
                for skip in &node.skips {
                    if self.nodes.contains_key(skip) {
                        queue.push_back((skip.clone(), depth + 1));
                    }
                }
            }
        }
        depths
    }
}

fn is_same_minor(a: &Version, b: &Version) -> bool {
    a.major == b.major && a.minor == b.minor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    fn node(name: &str, v: &str) -> Node {
        Node::new(name, version(v))
    }

    #[test]
    fn test_replaces_mode_builds_chain() {
        let mut graph = ChannelGraph::new("foo", "stable");
        graph
            .insert(node("foo.v1.0.0", "1.0.0"), UpdateMode::Replaces, false)
            .unwrap();
        graph
            .insert(
                node("foo.v1.1.0", "1.1.0").with_replaces(Some("foo.v1.0.0".into())),
                UpdateMode::Replaces,
                false,
            )
            .unwrap();

        assert_eq!(graph.head().unwrap().name, "foo.v1.1.0");
        let entries = graph.entries().unwrap();
        assert_eq!(entries[0].bundle, "foo.v1.0.0");
        assert_eq!(entries[0].depth, 1);
        assert_eq!(entries[1].bundle, "foo.v1.1.0");
        assert_eq!(entries[1].replaces.as_deref(), Some("foo.v1.0.0"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut graph = ChannelGraph::new("foo", "stable");
        graph
            .insert(node("foo.v1.0.0", "1.0.0"), UpdateMode::Replaces, false)
            .unwrap();
        let err = graph
            .insert(node("foo.v1.0.0", "1.0.1"), UpdateMode::Replaces, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::BundleAlreadyPresent(_)));
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let mut graph = ChannelGraph::new("foo", "stable");
        graph
            .insert(node("foo.v1.0.0", "1.0.0"), UpdateMode::Replaces, false)
            .unwrap();
        let err = graph
            .insert(
                node("foo.v1.0.0-rebuild", "1.0.0+2").with_replaces(Some("foo.v1.0.0".into())),
                UpdateMode::Replaces,
                false,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::PackageVersionAlreadyPresent { .. }
        ));
    }

    #[test]
    fn test_missing_replaces_target_permissive() {
        let mut graph = ChannelGraph::new("foo", "stable");
        graph
            .insert(node("foo.v1.0.0", "1.0.0"), UpdateMode::Replaces, false)
            .unwrap();

        let strict = graph.clone().insert(
            node("foo.v1.1.0", "1.1.0").with_replaces(Some("ghost.v0.1.0".into())),
            UpdateMode::Replaces,
            false,
        );
        assert!(matches!(
            strict.unwrap_err(),
            StoreError::MissingReplacesTarget { .. }
        ));

        // permissive keeps the dangling edge but reports it
        let mut permissive = ChannelGraph::new("foo", "stable");
        let warnings = permissive
            .insert(
                node("foo.v1.1.0", "1.1.0").with_replaces(Some("ghost.v0.1.0".into())),
                UpdateMode::Replaces,
                true,
            )
            .unwrap();
        assert_eq!(warnings.len(), 1);
        let entries = permissive.entries().unwrap();
        assert_eq!(entries[0].replaces, None);
    }

    #[test]
    fn test_cycle_detected() {
        // a -> b -> a has no head at all
        let graph = ChannelGraph::from_nodes(
            "foo",
            "stable",
            [
                node("a", "1.0.0").with_replaces(Some("b".into())),
                node("b", "1.1.0").with_replaces(Some("a".into())),
            ],
        );
        assert!(matches!(graph.validate().unwrap_err(), StoreError::Cycle(_)));
    }

    #[test]
    fn test_semver_mode_synthesizes_edges() {
        let mut graph = ChannelGraph::new("foo", "stable");
        graph
            .insert(node("foo.v1.0.0", "1.0.0"), UpdateMode::Semver, false)
            .unwrap();
        graph
            .insert(node("foo.v1.2.0", "1.2.0"), UpdateMode::Semver, false)
            .unwrap();
        // inserted out of order; the chain is version order regardless
        graph
            .insert(node("foo.v1.1.0", "1.1.0"), UpdateMode::Semver, false)
            .unwrap();

        assert_eq!(graph.head().unwrap().name, "foo.v1.2.0");
        assert_eq!(
            graph.node("foo.v1.2.0").unwrap().replaces.as_deref(),
            Some("foo.v1.1.0")
        );
        assert_eq!(
            graph.node("foo.v1.1.0").unwrap().replaces.as_deref(),
            Some("foo.v1.0.0")
        );
    }

    #[test]
    fn test_semver_equal_versions_rejected() {
        let mut graph = ChannelGraph::new("foo", "stable");
        graph
            .insert(node("foo.a", "1.0.0+1"), UpdateMode::Semver, false)
            .unwrap();
        let err = graph
            .insert(node("foo.b", "1.0.0+2"), UpdateMode::Semver, false)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::PackageVersionAlreadyPresent { .. }
        ));
    }

    #[test]
    fn test_skippatch_groups_patches() {
        let mut graph = ChannelGraph::new("foo", "stable");
        for (name, v) in [
            ("foo.v1.0.0", "1.0.0"),
            ("foo.v1.0.1", "1.0.1"),
            ("foo.v1.1.0", "1.1.0"),
        ] {
            graph
                .insert(node(name, v), UpdateMode::SemverSkippatch, false)
                .unwrap();
        }
        graph
            .insert(node("foo.v1.1.2", "1.1.2"), UpdateMode::SemverSkippatch, false)
            .unwrap();

        let head = graph.head().unwrap();
        assert_eq!(head.name, "foo.v1.1.2");
        assert!(head.skips.contains("foo.v1.1.0"));
        assert_eq!(head.replaces.as_deref(), Some("foo.v1.0.1"));
        assert!(
            graph
                .node("foo.v1.0.1")
                .unwrap()
                .skips
                .contains("foo.v1.0.0")
        );
    }

    #[test]
    fn test_substitute_takes_position() {
        let mut graph = ChannelGraph::new("foo", "stable");
        graph
            .insert(node("foo.v1.0.0", "1.0.0"), UpdateMode::Replaces, false)
            .unwrap();
        graph
            .insert(
                node("foo.v1.1.0", "1.1.0").with_replaces(Some("foo.v1.0.0".into())),
                UpdateMode::Replaces,
                false,
            )
            .unwrap();
        graph
            .insert(
                node("foo.v1.2.0", "1.2.0").with_replaces(Some("foo.v1.1.0".into())),
                UpdateMode::Replaces,
                false,
            )
            .unwrap();

        graph
            .substitute("foo.v1.1.0", node("foo.v1.1.0-sub", "1.1.0+rebuild"))
            .unwrap();

        assert!(!graph.contains("foo.v1.1.0"));
        assert_eq!(
            graph.node("foo.v1.2.0").unwrap().replaces.as_deref(),
            Some("foo.v1.1.0-sub")
        );
        assert_eq!(
            graph.node("foo.v1.1.0-sub").unwrap().replaces.as_deref(),
            Some("foo.v1.0.0")
        );
    }

    #[test]
    fn test_descendants_closure() {
        let graph = ChannelGraph::from_nodes(
            "foo",
            "stable",
            [
                node("a", "1.0.0"),
                node("b", "1.1.0")
                    .with_replaces(Some("a".into()))
                    .with_skips(["z".to_string()]),
                node("c", "1.2.0").with_replaces(Some("b".into())),
                node("z", "1.0.5"),
            ],
        );
        let closure = graph.descendants("b");
        assert_eq!(closure, ["a", "b", "z"]);
    }

    #[test]
    fn test_depths_skip_sibling() {
        // head replaces r and skips s: r and s share depth 1
        let graph = ChannelGraph::from_nodes(
            "foo",
            "stable",
            [
                node("r", "1.0.0"),
                node("s", "1.0.1"),
                node("head", "1.1.0")
                    .with_replaces(Some("r".into()))
                    .with_skips(["s".to_string()]),
            ],
        );
        let entries = graph.entries().unwrap();
        let depth_of = |name: &str| entries.iter().find(|e| e.bundle == name).unwrap().depth;
        assert_eq!(depth_of("head"), 0);
        assert_eq!(depth_of("r"), 1);
        assert_eq!(depth_of("s"), 1);
    }
}
