//! One-way migration between the relational store and the file form
//!
//! `render` walks every bundle of a store, reconstructs the property set
//! from the relational rows (package identity, provided and required GVKs,
//! dependencies, embedded objects) and emits the record stream. `populate`
//! loads a catalog into a fresh store with the channel edges taken
//! verbatim, which is what makes the render round-trip law hold.

use std::collections::{BTreeMap, BTreeSet};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use opcat_core::annotations::Annotations;
use opcat_core::manifest::Manifest;
use opcat_core::property::{Property, property_types};
use opcat_store::query::BundlePayload;
use opcat_store::{ImportChannel, ImportEntry, ImportPackage, Store};

use crate::error::{CatalogError, Result};
use crate::types::*;

/// Render a store into its file-based form.
pub fn render(store: &Store) -> Result<DeclarativeConfig> {
    let mut config = DeclarativeConfig::default();
    let mut bundles_seen = BTreeSet::new();
    let mut channel_entries: BTreeMap<(String, String), Vec<ChannelEntry>> = BTreeMap::new();

    for payload in store.list_bundles() {
        let payload = payload?;
        let channel = payload
            .channel
            .clone()
            .expect("list_bundles yields channel positions");

        channel_entries
            .entry((payload.package.clone(), channel))
            .or_default()
            .push(ChannelEntry {
                name: payload.name.clone(),
                replaces: payload.replaces.clone(),
                skips: payload.skips.clone(),
                skip_range: payload.skip_range.clone(),
            });

        if bundles_seen.insert(payload.name.clone()) {
            config.bundles.push(bundle_record(&payload));
        }
    }

    for package_name in store.list_packages()? {
        let summary = store.get_package(&package_name)?;
        let icon = summary
            .default_channel
            .as_deref()
            .and_then(|channel| store.get_bundle_for_channel(&package_name, channel).ok())
            .and_then(|head| head_icon(&head));
        config.packages.push(PackageRecord {
            schema: SCHEMA_PACKAGE.into(),
            name: summary.name.clone(),
            default_channel: summary.default_channel.clone(),
            description: summary.description.clone(),
            icon,
        });
    }

    for ((package, channel), mut entries) in channel_entries {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        config.channels.push(ChannelRecord {
            schema: SCHEMA_CHANNEL.into(),
            package,
            name: channel,
            entries,
        });
    }

    render_deprecations(store, &mut config)?;
    config.normalize();
    Ok(config)
}

fn bundle_record(payload: &BundlePayload) -> BundleRecord {
    let mut properties = payload.properties.clone();

    // required APIs and legacy dependencies fold into requirement
    // properties; anything already declared stays deduplicated
    for api in &payload.required_apis {
        let property = Property::gvk_required(api);
        if !properties.contains(&property) {
            properties.push(property);
        }
    }
    for dependency in &payload.dependencies {
        let property = dependency.clone().into_property();
        if !properties.contains(&property) {
            properties.push(property);
        }
    }
    for object in &payload.objects {
        properties.push(Property::new(
            PROPERTY_BUNDLE_OBJECT,
            serde_json::json!({ "data": BASE64.encode(object.as_bytes()) }),
        ));
    }

    BundleRecord {
        schema: SCHEMA_BUNDLE.into(),
        package: payload.package.clone(),
        name: payload.name.clone(),
        image: payload.bundle_path.clone(),
        properties,
        related_images: payload
            .related_images
            .iter()
            .map(|image| RelatedImage {
                name: String::new(),
                image: image.clone(),
            })
            .collect(),
    }
}

fn head_icon(payload: &BundlePayload) -> Option<Icon> {
    let csv: serde_json::Value = serde_json::from_str(&payload.csv_json).ok()?;
    let icon = csv.get("spec")?.get("icon")?.get(0)?;
    Some(Icon {
        base64data: icon.get("base64data")?.as_str()?.to_string(),
        mediatype: icon.get("mediatype")?.as_str().unwrap_or_default().to_string(),
    })
}

/// Tombstones surface as `olm.deprecations`. A tombstone whose bundle
/// is gone maps to its package by name prefix; one that maps nowhere is
/// dropped with a log line.
fn render_deprecations(store: &Store, config: &mut DeclarativeConfig) -> Result<()> {
    let packages = store.list_packages()?;
    let mut per_package: BTreeMap<String, Vec<DeprecationEntry>> = BTreeMap::new();

    for name in store.list_deprecated()? {
        let package = match store.get_bundle_by_name(&name) {
            Ok(payload) => Some(payload.package),
            Err(_) => packages
                .iter()
                .find(|p| name.starts_with(&format!("{p}.")))
                .cloned(),
        };
        let Some(package) = package else {
            tracing::warn!("tombstone {name:?} maps to no known package, dropping from render");
            continue;
        };
        per_package.entry(package).or_default().push(DeprecationEntry {
            reference: DeprecationRef {
                schema: SCHEMA_BUNDLE.into(),
                name,
            },
            message: String::new(),
        });
    }

    for (package, entries) in per_package {
        config.deprecations.push(DeprecationsRecord {
            schema: SCHEMA_DEPRECATIONS.into(),
            package,
            entries,
        });
    }
    Ok(())
}

/// Load a catalog into a store, package by package, edges verbatim.
pub fn populate(config: &DeclarativeConfig, store: &Store) -> Result<()> {
    for package in &config.packages {
        let mut bundles = Vec::new();
        for record in config.bundles.iter().filter(|b| b.package == package.name) {
            bundles.push(bundle_from_record(config, package, record)?);
        }

        let channels = config
            .channels_of(&package.name)
            .map(|channel| ImportChannel {
                name: channel.name.clone(),
                entries: channel
                    .entries
                    .iter()
                    .map(|entry| ImportEntry {
                        bundle: entry.name.clone(),
                        replaces: entry.replaces.clone(),
                        skips: entry.skips.clone(),
                    })
                    .collect(),
            })
            .collect();

        let deprecated = config
            .deprecations_of(&package.name)
            .map(|d| {
                d.entries
                    .iter()
                    .filter(|e| e.reference.schema == SCHEMA_BUNDLE)
                    .map(|e| e.reference.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        store.import_package(&ImportPackage {
            name: package.name.clone(),
            default_channel: package.default_channel.clone(),
            description: package.description.clone(),
            channels,
            bundles,
            deprecated,
        })?;
    }
    Ok(())
}

/// Rebuild an in-memory bundle from its record: manifests from the
/// embedded objects, channel membership from the channel records, and the
/// legacy dependency view synthesized from requirement properties.
fn bundle_from_record(
    config: &DeclarativeConfig,
    package: &PackageRecord,
    record: &BundleRecord,
) -> Result<opcat_core::Bundle> {
    let mut manifests = Vec::new();
    let mut declared_properties = Vec::new();
    let mut dependencies = Vec::new();

    for property in &record.properties {
        match property.type_.as_str() {
            PROPERTY_BUNDLE_OBJECT => {
                let data = property
                    .value
                    .get("data")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default();
                let decoded = BASE64.decode(data).map_err(|e| CatalogError::Parse {
                    path: record.name.clone(),
                    message: format!("olm.bundle.object data does not decode: {e}"),
                })?;
                let value: serde_json::Value = serde_json::from_slice(&decoded)?;
                manifests.push(Manifest::from_value(value)?);
            }
            // re-synthesized at assembly time from the CSV
            property_types::PACKAGE | property_types::GVK => {}
            property_types::GVK_REQUIRED => {
                dependencies.push(opcat_core::Dependency {
                    type_: "olm.gvk".into(),
                    value: property.value.clone(),
                });
            }
            property_types::PACKAGE_REQUIRED => {
                dependencies.push(opcat_core::Dependency {
                    type_: "olm.package".into(),
                    value: serde_json::json!({
                        "packageName": property.value.get("packageName").cloned().unwrap_or_default(),
                        "version": property.value.get("versionRange").cloned().unwrap_or_default(),
                    }),
                });
            }
            _ => declared_properties.push(property.clone()),
        }
    }

    if manifests.iter().all(|m| m.as_csv().is_none()) {
        return Err(CatalogError::NoObjects {
            bundle: record.name.clone(),
        });
    }

    let channels = config
        .channels_of(&record.package)
        .filter(|c| c.entries.iter().any(|e| e.name == record.name))
        .map(|c| c.name.clone())
        .collect();

    let annotations = Annotations {
        package: record.package.clone(),
        channels,
        default_channel: package.default_channel.clone(),
    };
    let bundle =
        opcat_core::Bundle::assemble(annotations, manifests, declared_properties, dependencies)?;
    Ok(if record.image.is_empty() {
        bundle
    } else {
        bundle.with_image(&record.image)
    })
}
