//! Bundle ingest
//!
//! One bundle, one transaction: rows land first, then the bundle is
//! integrated into each declared channel under the selected update mode.
//! Any invariant violation rolls the whole bundle back.

use rusqlite::{OptionalExtension, Transaction, params};

use opcat_core::Bundle;
use opcat_core::version::same_base_version;

use crate::db::Store;
use crate::error::{Result, StoreError};
use crate::graph::{Node, UpdateMode};
use crate::invariants;
use crate::persist;

/// Knobs for one ingest.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub mode: UpdateMode,
    /// Downgrade recoverable graph problems to warnings.
    pub permissive: bool,
    /// Allow replacing the current head of a channel with a same-named
    /// bundle; the only supported in-place mutation.
    pub overwrite_latest: bool,
}

/// What a successful ingest wants the caller to know.
#[derive(Debug, Default)]
pub struct AddReport {
    pub warnings: Vec<String>,
}

impl Store {
    /// Ingest one bundle into its declared channels.
    pub fn add_bundle(&self, bundle: &Bundle, opts: &AddOptions) -> Result<AddReport> {
        let version = bundle.version()?;
        if let Some(range) = bundle.skip_range()? {
            if range.matches(&version) {
                return Err(StoreError::SelfSkippingRange {
                    bundle: bundle.name.clone(),
                    version: version.to_string(),
                });
            }
        }

        self.with_writer(|tx| {
            let mut report = AddReport::default();

            if bundle_exists(tx, &bundle.name)? {
                if opts.overwrite_latest {
                    overwrite_existing_head(tx, &bundle.name)?;
                } else {
                    return Err(StoreError::BundleAlreadyPresent(bundle.name.clone()));
                }
            }

            tx.execute(
                "INSERT OR IGNORE INTO package (name, default_channel) VALUES (?1, NULL)",
                [&bundle.package],
            )?;
            insert_bundle_rows(tx, bundle)?;

            // substitution drives placement in the target's channels;
            // remaining declared channels get a normal insertion
            let mut placed = Vec::new();
            if let Some(target) = bundle.substitutes_for() {
                placed = substitute_bundle(tx, bundle, target, &mut report)?;
            }
            for channel in &bundle.channels {
                if placed.iter().any(|c| c == channel) {
                    continue;
                }
                let mut graph = persist::load_channel_graph(tx, &bundle.package, channel)?;
                let node = declared_node(bundle)?;
                let warnings = graph.insert(node, opts.mode, opts.permissive)?;
                for warning in &warnings {
                    tracing::warn!(channel = %channel, "{warning}");
                }
                report.warnings.extend(warnings);
                persist::write_channel_graph(tx, &graph)?;
            }

            elect_default_channel(tx, bundle)?;
            invariants::check(tx)?;
            Ok(report)
        })
    }
}

fn bundle_exists(tx: &Transaction<'_>, name: &str) -> Result<bool> {
    Ok(tx
        .query_row(
            "SELECT 1 FROM operatorbundle WHERE name = ?1",
            [name],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// Overwrite-latest: the existing same-named bundle must be the head of
/// every channel it occupies; its rows go first, the new bundle lands in
/// the same transaction.
fn overwrite_existing_head(tx: &Transaction<'_>, name: &str) -> Result<()> {
    let channels = persist::channels_of_bundle(tx, name)?;
    for (package, channel) in &channels {
        let head: String = tx.query_row(
            "SELECT head_operatorbundle_name FROM channel
             WHERE name = ?1 AND package_name = ?2",
            params![channel, package],
            |row| row.get(0),
        )?;
        if head != name {
            return Err(StoreError::FailedPrecondition {
                action: format!("overwrite bundle {name:?}"),
                reason: format!("it is not the head of channel {channel:?}"),
            });
        }
    }
    for (package, channel) in &channels {
        let mut graph = persist::load_channel_graph(tx, package, channel)?;
        graph.remove(name);
        persist::write_channel_graph(tx, &graph)?;
    }
    persist::remove_bundle_row(tx, name)?;
    Ok(())
}

pub(crate) fn insert_bundle_rows(tx: &Transaction<'_>, bundle: &Bundle) -> Result<()> {
    let version = bundle.version()?.to_string();
    let skip_range = bundle.skip_range()?.map(|r| r.as_str().to_string());
    let path = bundle.bundle_image.clone().unwrap_or_default();
    let objects = serde_json::Value::Array(
        bundle
            .objects()
            .iter()
            .map(|o| serde_json::from_str(o))
            .collect::<std::result::Result<Vec<_>, _>>()?,
    );

    tx.execute(
        r#"
        INSERT INTO operatorbundle
            (name, csv, bundle, bundlepath, version, skiprange, replaces, skips,
             substitutesfor, digest)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            bundle.name,
            bundle.csv_json(),
            objects.to_string(),
            path,
            version,
            skip_range.unwrap_or_default(),
            bundle.replaces(),
            bundle.skips().join(","),
            bundle.substitutes_for().unwrap_or_default(),
            bundle.digest(),
        ],
    )?;

    for api in bundle.provided_apis() {
        tx.execute(
            "INSERT OR IGNORE INTO api (group_name, version, kind, plural)
             VALUES (?1, ?2, ?3, ?4)",
            params![api.group, api.version, api.kind, api.plural],
        )?;
        tx.execute(
            "INSERT INTO api_provider
                 (group_name, version, kind, operatorbundle_name,
                  operatorbundle_version, operatorbundle_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![api.group, api.version, api.kind, bundle.name, version, path],
        )?;
    }
    for api in bundle.required_apis() {
        tx.execute(
            "INSERT OR IGNORE INTO api (group_name, version, kind, plural)
             VALUES (?1, ?2, ?3, ?4)",
            params![api.group, api.version, api.kind, api.plural],
        )?;
        tx.execute(
            "INSERT INTO api_requirer
                 (group_name, version, kind, operatorbundle_name,
                  operatorbundle_version, operatorbundle_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![api.group, api.version, api.kind, bundle.name, version, path],
        )?;
    }

    for property in bundle.properties() {
        tx.execute(
            "INSERT INTO properties
                 (type, value, operatorbundle_name, operatorbundle_version,
                  operatorbundle_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![property.type_, property.value_json(), bundle.name, version, path],
        )?;
    }
    // the legacy dependencies view keeps the declared shape
    for dependency in bundle.dependencies() {
        tx.execute(
            "INSERT INTO dependencies
                 (type, value, operatorbundle_name, operatorbundle_version,
                  operatorbundle_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                dependency.type_,
                dependency.value.to_string(),
                bundle.name,
                version,
                path
            ],
        )?;
    }
    for image in bundle.images() {
        tx.execute(
            "INSERT INTO related_image (image, operatorbundle_name) VALUES (?1, ?2)",
            params![image, bundle.name],
        )?;
    }
    Ok(())
}

/// Place `bundle` by substitution: it takes `target`'s position in every
/// channel the target occupies. Returns the channels handled this way.
fn substitute_bundle(
    tx: &Transaction<'_>,
    bundle: &Bundle,
    target: &str,
    report: &mut AddReport,
) -> Result<Vec<String>> {
    if !bundle_exists(tx, target)? {
        return Err(StoreError::InvalidSubstitution {
            bundle: bundle.name.clone(),
            target: target.to_string(),
            reason: "target does not exist".to_string(),
        });
    }
    let target_package = persist::package_of_bundle(tx, target)?;
    if target_package.as_deref() != Some(bundle.package.as_str()) {
        return Err(StoreError::InvalidSubstitution {
            bundle: bundle.name.clone(),
            target: target.to_string(),
            reason: format!(
                "target belongs to package {:?}, not {:?}",
                target_package.unwrap_or_default(),
                bundle.package
            ),
        });
    }

    let target_version: String = tx.query_row(
        "SELECT version FROM operatorbundle WHERE name = ?1",
        [target],
        |row| row.get(0),
    )?;
    let version = bundle.version()?;
    if let Ok(old) = opcat_core::version::parse_version(&target_version) {
        if !same_base_version(&old, &version) {
            let warning = format!(
                "bundle {} substitutes for {} across versions ({} -> {})",
                bundle.name, target, old, version
            );
            tracing::warn!("{warning}");
            report.warnings.push(warning);
        }
    }

    let channels = persist::channels_of_bundle(tx, target)?;
    let mut placed = Vec::new();
    for (package, channel) in channels {
        let mut graph = persist::load_channel_graph(tx, &package, &channel)?;
        graph.substitute(target, declared_node(bundle)?)?;
        persist::write_channel_graph(tx, &graph)?;
        placed.push(channel);
    }
    Ok(placed)
}

fn declared_node(bundle: &Bundle) -> Result<Node> {
    Ok(Node::new(bundle.name.clone(), bundle.version()?)
        .with_replaces(bundle.replaces().map(String::from))
        .with_skips(bundle.skips().iter().cloned()))
}

/// First add of a package elects the default channel: the declared
/// annotation wins, otherwise the channel whose head carries the highest
/// version. Once set it is never silently re-elected.
fn elect_default_channel(tx: &Transaction<'_>, bundle: &Bundle) -> Result<()> {
    let current: Option<String> = tx.query_row(
        "SELECT default_channel FROM package WHERE name = ?1",
        [&bundle.package],
        |row| row.get(0),
    )?;
    if current.map(|c| !c.is_empty()).unwrap_or(false) {
        return Ok(());
    }

    let channels = persist::channels_of_package(tx, &bundle.package)?;
    let elected = match &bundle.default_channel {
        Some(declared) if channels.iter().any(|(name, _)| name == declared) => {
            Some(declared.clone())
        }
        _ => {
            let mut best: Option<(String, semver::Version)> = None;
            for (channel, head) in &channels {
                let head_version: String = tx.query_row(
                    "SELECT version FROM operatorbundle WHERE name = ?1",
                    [head],
                    |row| row.get(0),
                )?;
                let head_version = opcat_core::version::parse_version(&head_version)?;
                let better = match &best {
                    Some((_, incumbent)) => {
                        opcat_core::version::order_versions(&head_version, incumbent)
                            == std::cmp::Ordering::Greater
                    }
                    None => true,
                };
                if better {
                    best = Some((channel.clone(), head_version));
                }
            }
            best.map(|(channel, _)| channel)
        }
    };

    if let Some(channel) = elected {
        tx.execute(
            "UPDATE package SET default_channel = ?1 WHERE name = ?2",
            params![channel, bundle.package],
        )?;
    }
    Ok(())
}
