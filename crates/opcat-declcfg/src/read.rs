//! Catalog reader
//!
//! Accepts any legal serialization: one record per file or many, JSON
//! value streams or YAML document streams, interleaved however the author
//! liked across a directory subtree. Documents dispatch on their `schema`
//! field; unrecognized schemas are preserved verbatim.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CatalogError, Result};
use crate::types::{
    BundleRecord, ChannelRecord, DeclarativeConfig, DeprecationsRecord, OtherRecord,
    PackageRecord, SCHEMA_BUNDLE, SCHEMA_CHANNEL, SCHEMA_DEPRECATIONS, SCHEMA_PACKAGE,
};

/// Load a catalog from a file or a directory subtree.
pub fn load_path<P: AsRef<Path>>(path: P) -> Result<DeclarativeConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CatalogError::NotFound(path.to_path_buf()));
    }

    let mut config = DeclarativeConfig::default();
    if path.is_file() {
        let content = std::fs::read_to_string(path)?;
        config.merge(load_str(&content, &path.display().to_string())?);
    } else {
        for entry in walkdir::WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let file = entry.path();
            if !file.is_file() {
                continue;
            }
            match file.extension().and_then(|e| e.to_str()) {
                Some("json") | Some("yaml") | Some("yml") => {}
                _ => continue,
            }
            let content = std::fs::read_to_string(file)?;
            config.merge(load_str(&content, &file.display().to_string())?);
        }
    }
    config.normalize();
    Ok(config)
}

/// Parse one file's content: a concatenated JSON value stream or a YAML
/// document stream, sniffed from the first non-whitespace byte.
pub fn load_str(content: &str, origin: &str) -> Result<DeclarativeConfig> {
    let mut config = DeclarativeConfig::default();
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(config);
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        for document in serde_json::Deserializer::from_str(content).into_iter::<Value>() {
            let document = document.map_err(|e| CatalogError::Parse {
                path: origin.to_string(),
                message: e.to_string(),
            })?;
            dispatch(document, origin, &mut config)?;
        }
    } else {
        for document in serde_yaml::Deserializer::from_str(content) {
            let document = Value::deserialize(document).map_err(|e| CatalogError::Parse {
                path: origin.to_string(),
                message: e.to_string(),
            })?;
            if document.is_null() {
                continue;
            }
            dispatch(document, origin, &mut config)?;
        }
    }
    Ok(config)
}

fn dispatch(document: Value, origin: &str, config: &mut DeclarativeConfig) -> Result<()> {
    // a JSON stream may legally carry an array of records
    if let Value::Array(items) = document {
        for item in items {
            dispatch(item, origin, config)?;
        }
        return Ok(());
    }

    let schema = document
        .get("schema")
        .and_then(Value::as_str)
        .ok_or_else(|| CatalogError::MissingSchema {
            path: origin.to_string(),
        })?
        .to_string();

    let parse = |e: serde_json::Error| CatalogError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    };
    match schema.as_str() {
        SCHEMA_PACKAGE => config
            .packages
            .push(serde_json::from_value::<PackageRecord>(document).map_err(parse)?),
        SCHEMA_CHANNEL => config
            .channels
            .push(serde_json::from_value::<ChannelRecord>(document).map_err(parse)?),
        SCHEMA_BUNDLE => config
            .bundles
            .push(serde_json::from_value::<BundleRecord>(document).map_err(parse)?),
        SCHEMA_DEPRECATIONS => config
            .deprecations
            .push(serde_json::from_value::<DeprecationsRecord>(document).map_err(parse)?),
        _ => config
            .others
            .push(serde_json::from_value::<OtherRecord>(document).map_err(parse)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_STREAM: &str = r#"
{"schema": "olm.package", "name": "etcd", "defaultChannel": "stable"}
{"schema": "olm.channel", "package": "etcd", "name": "stable",
 "entries": [{"name": "etcdoperator.v0.9.4"}]}
{"schema": "olm.bundle", "package": "etcd", "name": "etcdoperator.v0.9.4",
 "image": "quay.io/coreos/etcd-operator@sha256:abc"}
"#;

    const YAML_STREAM: &str = r#"---
schema: olm.package
name: etcd
defaultChannel: stable
---
schema: olm.channel
package: etcd
name: stable
entries:
- name: etcdoperator.v0.9.4
"#;

    #[test]
    fn test_json_stream() {
        let config = load_str(JSON_STREAM, "test.json").unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.bundles.len(), 1);
        assert_eq!(config.channels[0].entries[0].name, "etcdoperator.v0.9.4");
    }

    #[test]
    fn test_yaml_stream() {
        let config = load_str(YAML_STREAM, "test.yaml").unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.channels.len(), 1);
        assert_eq!(
            config.packages[0].default_channel.as_deref(),
            Some("stable")
        );
    }

    #[test]
    fn test_unknown_schema_is_preserved() {
        let config = load_str(r#"{"schema": "olm.custom", "payload": 42}"#, "x.json").unwrap();
        assert_eq!(config.others.len(), 1);
        assert_eq!(config.others[0].schema, "olm.custom");
    }

    #[test]
    fn test_schemaless_document_is_rejected() {
        let err = load_str(r#"{"name": "etcd"}"#, "x.json").unwrap_err();
        assert!(matches!(err, CatalogError::MissingSchema { .. }));
    }

    #[test]
    fn test_interleaved_files_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etcd")).unwrap();
        std::fs::write(
            dir.path().join("etcd/catalog.yaml"),
            "schema: olm.package\nname: etcd\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("bundles.json"),
            r#"{"schema": "olm.bundle", "package": "etcd", "name": "etcdoperator.v0.9.4"}"#,
        )
        .unwrap();

        let config = load_path(dir.path()).unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.bundles.len(), 1);
    }
}
