//! File-based catalog record types
//!
//! A catalog is a stream of typed documents, each carrying a `schema`
//! field. Field order matters for byte-stable output, hence the indexmap
//! and the explicit serde ordering below.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use opcat_core::Property;

pub const SCHEMA_PACKAGE: &str = "olm.package";
pub const SCHEMA_CHANNEL: &str = "olm.channel";
pub const SCHEMA_BUNDLE: &str = "olm.bundle";
pub const SCHEMA_DEPRECATIONS: &str = "olm.deprecations";

/// Property type embedding a manifest object in the catalog.
pub const PROPERTY_BUNDLE_OBJECT: &str = "olm.bundle.object";

/// `olm.package`: one per package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    #[serde(default)]
    pub base64data: String,
    #[serde(default)]
    pub mediatype: String,
}

/// `olm.channel`: one per (package, channel).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub schema: String,
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub entries: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<String>,
}

/// `olm.bundle`: one per bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRecord {
    pub schema: String,
    pub package: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_images: Vec<RelatedImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub image: String,
}

/// `olm.deprecations`: at most one per package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeprecationsRecord {
    pub schema: String,
    pub package: String,
    #[serde(default)]
    pub entries: Vec<DeprecationEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeprecationEntry {
    pub reference: DeprecationRef,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeprecationRef {
    pub schema: String,
    pub name: String,
}

/// A document with an unrecognized schema, preserved verbatim so foreign
/// records round-trip through read/write untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherRecord {
    pub schema: String,
    #[serde(flatten)]
    pub rest: IndexMap<String, serde_json::Value>,
}

/// A whole loaded catalog, order-independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarativeConfig {
    pub packages: Vec<PackageRecord>,
    pub channels: Vec<ChannelRecord>,
    pub bundles: Vec<BundleRecord>,
    pub deprecations: Vec<DeprecationsRecord>,
    pub others: Vec<OtherRecord>,
}

impl DeclarativeConfig {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.channels.is_empty()
            && self.bundles.is_empty()
            && self.deprecations.is_empty()
            && self.others.is_empty()
    }

    pub fn package(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn bundle(&self, name: &str) -> Option<&BundleRecord> {
        self.bundles.iter().find(|b| b.name == name)
    }

    pub fn channels_of(&self, package: &str) -> impl Iterator<Item = &ChannelRecord> {
        self.channels.iter().filter(move |c| c.package == package)
    }

    pub fn deprecations_of(&self, package: &str) -> Option<&DeprecationsRecord> {
        self.deprecations.iter().find(|d| d.package == package)
    }

    /// Merge another catalog into this one (the reader accumulates across
    /// files in any order).
    pub fn merge(&mut self, other: DeclarativeConfig) {
        self.packages.extend(other.packages);
        self.channels.extend(other.channels);
        self.bundles.extend(other.bundles);
        self.deprecations.extend(other.deprecations);
        self.others.extend(other.others);
    }

    /// Canonical in-memory order: packages, channels and bundles sorted by
    /// name so equality and diffing ignore file layout.
    pub fn normalize(&mut self) {
        self.packages.sort_by(|a, b| a.name.cmp(&b.name));
        self.channels
            .sort_by(|a, b| (&a.package, &a.name).cmp(&(&b.package, &b.name)));
        self.bundles
            .sort_by(|a, b| (&a.package, &a.name).cmp(&(&b.package, &b.name)));
        self.deprecations.sort_by(|a, b| a.package.cmp(&b.package));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_entry_optional_fields_are_omitted() {
        let entry = ChannelEntry {
            name: "etcd.v0.9.2".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"name":"etcd.v0.9.2"}"#);
    }

    #[test]
    fn test_other_record_roundtrips() {
        let raw = r#"{"schema":"olm.composite","custom":{"a":1}}"#;
        let record: OtherRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.schema, "olm.composite");
        assert_eq!(serde_json::to_string(&record).unwrap(), raw);
    }

    #[test]
    fn test_merge_and_normalize() {
        let mut a = DeclarativeConfig {
            packages: vec![PackageRecord {
                schema: SCHEMA_PACKAGE.into(),
                name: "zookeeper".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        a.merge(DeclarativeConfig {
            packages: vec![PackageRecord {
                schema: SCHEMA_PACKAGE.into(),
                name: "etcd".into(),
                ..Default::default()
            }],
            ..Default::default()
        });
        a.normalize();
        assert_eq!(a.packages[0].name, "etcd");
    }
}
