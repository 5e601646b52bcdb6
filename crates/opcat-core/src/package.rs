//! Legacy package manifest model
//!
//! The package manifest predates bundle annotations: one document per
//! package naming its channels and each channel's current CSV. It remains
//! an input to the graph builder and the package-manifest validator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub package_name: String,
    #[serde(default)]
    pub channels: Vec<PackageChannel>,
    #[serde(default)]
    pub default_channel_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageChannel {
    pub name: String,
    #[serde(rename = "currentCSV")]
    pub current_csv: String,
}

impl PackageManifest {
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn channel(&self, name: &str) -> Option<&PackageChannel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// The default channel: the declared one, or the sole channel when only
    /// one exists.
    pub fn default_channel(&self) -> Option<&str> {
        match &self.default_channel_name {
            Some(name) => Some(name),
            None if self.channels.len() == 1 => Some(&self.channels[0].name),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_manifest() {
        let manifest = PackageManifest::parse(
            r#"
packageName: etcd
defaultChannelName: stable
channels:
- name: stable
  currentCSV: etcdoperator.v0.9.4
- name: alpha
  currentCSV: etcdoperator.v0.9.5-alpha.1
"#,
        )
        .unwrap();
        assert_eq!(manifest.package_name, "etcd");
        assert_eq!(manifest.default_channel(), Some("stable"));
        assert_eq!(
            manifest.channel("alpha").unwrap().current_csv,
            "etcdoperator.v0.9.5-alpha.1"
        );
    }

    #[test]
    fn test_single_channel_is_implicit_default() {
        let manifest = PackageManifest {
            package_name: "p".into(),
            channels: vec![PackageChannel {
                name: "stable".into(),
                current_csv: "p.v1.0.0".into(),
            }],
            default_channel_name: None,
        };
        assert_eq!(manifest.default_channel(), Some("stable"));
    }
}
