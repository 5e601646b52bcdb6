//! Bundle metadata files
//!
//! `metadata/annotations.yaml` declares the package, the channel membership
//! and the default channel; `metadata/dependencies.yaml` and
//! `metadata/properties.yaml` carry the optional dependency/property lists.

use serde::{Deserialize, Serialize};

use crate::property::{Dependency, Property};

/// Annotation key carrying the package name.
pub const PACKAGE_ANNOTATION: &str = "operators.operatorframework.io.bundle.package.v1";
/// Annotation key carrying the comma-separated channel list.
pub const CHANNELS_ANNOTATION: &str = "operators.operatorframework.io.bundle.channels.v1";
/// Annotation key carrying the default channel.
pub const DEFAULT_CHANNEL_ANNOTATION: &str =
    "operators.operatorframework.io.bundle.channel.default.v1";

/// Top-level shape of `metadata/annotations.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationsFile {
    pub annotations: std::collections::BTreeMap<String, String>,
}

/// The channel membership a bundle declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub package: String,
    pub channels: Vec<String>,
    pub default_channel: Option<String>,
}

impl AnnotationsFile {
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Lift out the bundle-graph annotations, splitting the channel CSV.
    pub fn bundle_annotations(&self) -> Annotations {
        let package = self
            .annotations
            .get(PACKAGE_ANNOTATION)
            .cloned()
            .unwrap_or_default();
        let channels = self
            .annotations
            .get(CHANNELS_ANNOTATION)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let default_channel = self
            .annotations
            .get(DEFAULT_CHANNEL_ANNOTATION)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Annotations {
            package,
            channels,
            default_channel,
        }
    }
}

/// Top-level shape of `metadata/dependencies.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependenciesFile {
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// Top-level shape of `metadata/properties.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertiesFile {
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_annotations() {
        let file = AnnotationsFile::parse(
            r#"
annotations:
  operators.operatorframework.io.bundle.package.v1: etcd
  operators.operatorframework.io.bundle.channels.v1: "stable, beta"
  operators.operatorframework.io.bundle.channel.default.v1: stable
"#,
        )
        .unwrap();
        let annotations = file.bundle_annotations();
        assert_eq!(annotations.package, "etcd");
        assert_eq!(annotations.channels, ["stable", "beta"]);
        assert_eq!(annotations.default_channel.as_deref(), Some("stable"));
    }

    #[test]
    fn test_missing_default_channel_is_none() {
        let file = AnnotationsFile::parse(
            r#"
annotations:
  operators.operatorframework.io.bundle.package.v1: etcd
  operators.operatorframework.io.bundle.channels.v1: stable
"#,
        )
        .unwrap();
        assert!(file.bundle_annotations().default_channel.is_none());
    }
}
