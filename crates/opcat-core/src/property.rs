//! Bundle properties
//!
//! A property is an open-ended `(type, value)` pair attached to a bundle,
//! with the value JSON-encoded. The legacy `dependencies` list uses the same
//! shape; in memory both are folded into `Property` and the relational
//! `dependencies` view is synthesized only at the schema boundary.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::ApiKey;

/// Recognized property type identifiers.
pub mod property_types {
    /// An API (group, version, kind) provided by the bundle.
    pub const GVK: &str = "olm.gvk";
    /// An API the bundle requires another operator to provide.
    pub const GVK_REQUIRED: &str = "olm.gvk.required";
    /// The bundle's own package identity (name + version).
    pub const PACKAGE: &str = "olm.package";
    /// A package the bundle requires, with a version range.
    pub const PACKAGE_REQUIRED: &str = "olm.package.required";
    /// A free-form label.
    pub const LABEL: &str = "olm.label";
    /// Tombstone marker written by the deprecator.
    pub const DEPRECATED: &str = "olm.deprecated";
}

/// A typed, JSON-encoded key/value attached to a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: serde_json::Value,
}

impl Property {
    pub fn new(type_: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            type_: type_.into(),
            value,
        }
    }

    /// The package-identity property every stored bundle carries.
    pub fn package(package: &str, version: &str) -> Self {
        Self::new(
            property_types::PACKAGE,
            json!({ "packageName": package, "version": version }),
        )
    }

    /// A provided-API property.
    pub fn gvk(api: &ApiKey) -> Self {
        Self::new(
            property_types::GVK,
            json!({ "group": api.group, "version": api.version, "kind": api.kind }),
        )
    }

    /// A required-API property.
    pub fn gvk_required(api: &ApiKey) -> Self {
        Self::new(
            property_types::GVK_REQUIRED,
            json!({ "group": api.group, "version": api.version, "kind": api.kind }),
        )
    }

    /// A required-package property with a version range.
    pub fn package_required(package: &str, range: &str) -> Self {
        Self::new(
            property_types::PACKAGE_REQUIRED,
            json!({ "packageName": package, "versionRange": range }),
        )
    }

    /// The tombstone property written by the deprecator.
    pub fn deprecated() -> Self {
        Self::new(property_types::DEPRECATED, json!({}))
    }

    /// Decode a GVK-shaped value back into an `ApiKey`, if this property
    /// carries one.
    pub fn as_api_key(&self) -> Option<ApiKey> {
        if self.type_ != property_types::GVK && self.type_ != property_types::GVK_REQUIRED {
            return None;
        }
        let group = self.value.get("group")?.as_str()?;
        let version = self.value.get("version")?.as_str()?;
        let kind = self.value.get("kind")?.as_str()?;
        Some(ApiKey::new(group, version, kind))
    }

    /// Whether this property is a requirement (as opposed to a declaration).
    pub fn is_requirement(&self) -> bool {
        matches!(
            self.type_.as_str(),
            property_types::GVK_REQUIRED | property_types::PACKAGE_REQUIRED
        )
    }

    /// The JSON encoding of the value, canonical enough for storage.
    pub fn value_json(&self) -> String {
        self.value.to_string()
    }
}

/// A dependency as declared in `metadata/dependencies.yaml`.
///
/// The legacy file uses `olm.gvk` / `olm.package` type names for what the
/// property model calls requirements; `into_property` performs the fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: serde_json::Value,
}

impl Dependency {
    /// Fold a legacy dependency into the unified property model.
    pub fn into_property(self) -> Property {
        let type_ = match self.type_.as_str() {
            property_types::GVK => property_types::GVK_REQUIRED.to_string(),
            property_types::PACKAGE => property_types::PACKAGE_REQUIRED.to_string(),
            other => other.to_string(),
        };
        Property {
            type_,
            value: self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gvk_roundtrip() {
        let api = ApiKey::new("etcd.database.coreos.com", "v1beta2", "EtcdCluster");
        let prop = Property::gvk(&api);
        assert_eq!(prop.as_api_key().unwrap(), api);
    }

    #[test]
    fn test_dependency_fold() {
        let dep = Dependency {
            type_: "olm.gvk".to_string(),
            value: json!({ "group": "g", "version": "v1", "kind": "K" }),
        };
        let prop = dep.into_property();
        assert_eq!(prop.type_, property_types::GVK_REQUIRED);
        assert!(prop.is_requirement());
    }

    #[test]
    fn test_package_dependency_fold() {
        let dep = Dependency {
            type_: "olm.package".to_string(),
            value: json!({ "packageName": "etcd", "version": ">=3.0.0" }),
        };
        assert_eq!(dep.into_property().type_, property_types::PACKAGE_REQUIRED);
    }

    #[test]
    fn test_non_gvk_has_no_api_key() {
        assert!(Property::package("p", "1.0.0").as_api_key().is_none());
    }
}
