//! API identity - the interned (group, version, kind, plural) tuple

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an API served or required by a bundle.
///
/// Two bundles referring to the same (group, version, kind) refer to the
/// same API row in the store; `plural` rides along for presentation and is
/// not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApiKey {
    pub group: String,
    pub version: String,
    pub kind: String,
    #[serde(default)]
    pub plural: String,
}

impl ApiKey {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: String::new(),
        }
    }

    pub fn with_plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = plural.into();
        self
    }

    /// Parse an owned-CRD name of the form `<plural>.<group>`.
    ///
    /// CSV owned/required CRD descriptors carry the CRD object name, not the
    /// group/plural pair; the split is on the first dot.
    pub fn from_crd_name(name: &str, version: &str, kind: &str) -> Option<Self> {
        let (plural, group) = name.split_once('.')?;
        if plural.is_empty() || group.is_empty() {
            return None;
        }
        Some(
            Self::new(group, version, kind).with_plural(plural),
        )
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_crd_name() {
        let key = ApiKey::from_crd_name("etcdclusters.etcd.database.coreos.com", "v1beta2", "EtcdCluster")
            .unwrap();
        assert_eq!(key.group, "etcd.database.coreos.com");
        assert_eq!(key.plural, "etcdclusters");
        assert_eq!(key.kind, "EtcdCluster");
    }

    #[test]
    fn test_from_crd_name_rejects_groupless() {
        assert!(ApiKey::from_crd_name("noseparator", "v1", "Kind").is_none());
        assert!(ApiKey::from_crd_name(".group.only", "v1", "Kind").is_none());
    }

    #[test]
    fn test_identity_ignores_plural() {
        let a = ApiKey::new("g", "v1", "K").with_plural("ks");
        let b = ApiKey::new("g", "v1", "K").with_plural("kays");
        // plural differs but the display identity is the same triple
        assert_eq!(a.to_string(), b.to_string());
    }
}
