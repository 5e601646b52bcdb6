//! Catalog writer
//!
//! Emits one directory per package with a single concatenated stream file,
//! JSON by default. The JSON form is the canonical one: pretty-printed
//! documents separated by newlines, package record first, then channels,
//! bundles and deprecations, each group name-ordered.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::types::DeclarativeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl Format {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            Self::Json => "catalog.json",
            Self::Yaml => "catalog.yaml",
        }
    }
}

/// Write the catalog under `root`, one subdirectory per package.
pub fn write_dir<P: AsRef<Path>>(
    config: &DeclarativeConfig,
    root: P,
    format: Format,
) -> Result<()> {
    let root = root.as_ref();
    std::fs::create_dir_all(root)?;

    let mut config = config.clone();
    config.normalize();

    for package in &config.packages {
        let dir = root.join(&package.name);
        std::fs::create_dir_all(&dir)?;
        let mut file = std::fs::File::create(dir.join(format.file_name()))?;
        write_package_stream(&config, &package.name, &mut file, format)?;
    }

    // foreign-schema records get a top-level stream of their own
    if !config.others.is_empty() {
        let mut file = std::fs::File::create(root.join(format.file_name()))?;
        for other in &config.others {
            write_document(other, &mut file, format)?;
        }
    }
    Ok(())
}

fn write_package_stream<W: Write>(
    config: &DeclarativeConfig,
    package: &str,
    out: &mut W,
    format: Format,
) -> Result<()> {
    if let Some(record) = config.package(package) {
        write_document(record, out, format)?;
    }
    for channel in config.channels_of(package) {
        write_document(channel, out, format)?;
    }
    for bundle in config.bundles.iter().filter(|b| b.package == package) {
        write_document(bundle, out, format)?;
    }
    if let Some(deprecations) = config.deprecations_of(package) {
        write_document(deprecations, out, format)?;
    }
    Ok(())
}

fn write_document<T: Serialize, W: Write>(value: &T, out: &mut W, format: Format) -> Result<()> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            out.write_all(b"\n")?;
        }
        Format::Yaml => {
            out.write_all(b"---\n")?;
            serde_yaml::to_writer(&mut *out, value)?;
        }
    }
    Ok(())
}

/// Serialize the whole catalog into one string (test and render-to-stdout
/// convenience).
pub fn to_string(config: &DeclarativeConfig, format: Format) -> Result<String> {
    let mut config = config.clone();
    config.normalize();

    let mut out = Vec::new();
    let packages: Vec<String> = config.packages.iter().map(|p| p.name.clone()).collect();
    for package in packages {
        write_package_stream(&config, &package, &mut out, format)?;
    }
    for other in &config.others {
        write_document(other, &mut out, format)?;
    }
    Ok(String::from_utf8(out).expect("serializers emit UTF-8"))
}
