//! Whole-package import
//!
//! The file-based catalog names its channel edges explicitly; loading one
//! must not re-derive them through an update mode. This entry point takes
//! a fully-specified package (bundles plus per-channel edges) and persists
//! it verbatim, subject to the same invariant checks as any other
//! mutation.

use rusqlite::params;

use opcat_core::Bundle;

use crate::db::Store;
use crate::error::{Result, StoreError};
use crate::graph::{ChannelGraph, Node};
use crate::invariants;
use crate::persist;

/// One channel's explicit edge list.
#[derive(Debug, Clone, Default)]
pub struct ImportChannel {
    pub name: String,
    pub entries: Vec<ImportEntry>,
}

/// One bundle's position in an imported channel.
#[derive(Debug, Clone, Default)]
pub struct ImportEntry {
    pub bundle: String,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
}

/// A package ready to import: bundles, channels with explicit edges, and
/// the tombstones that legitimize dangling references.
pub struct ImportPackage {
    pub name: String,
    pub default_channel: Option<String>,
    pub description: Option<String>,
    pub channels: Vec<ImportChannel>,
    pub bundles: Vec<Bundle>,
    pub deprecated: Vec<String>,
}

impl Store {
    /// Import one package in a single transaction.
    pub fn import_package(&self, package: &ImportPackage) -> Result<()> {
        self.with_writer(|tx| {
            tx.execute(
                "INSERT INTO package (name, default_channel, description)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                     default_channel = excluded.default_channel,
                     description = excluded.description",
                params![package.name, package.default_channel, package.description],
            )?;

            for bundle in &package.bundles {
                if bundle.package != package.name {
                    return Err(StoreError::FailedPrecondition {
                        action: format!("import package {:?}", package.name),
                        reason: format!(
                            "bundle {:?} declares package {:?}",
                            bundle.name, bundle.package
                        ),
                    });
                }
                crate::add::insert_bundle_rows(tx, bundle)?;
            }

            for channel in &package.channels {
                let mut nodes = Vec::new();
                for entry in &channel.entries {
                    let bundle = package
                        .bundles
                        .iter()
                        .find(|b| b.name == entry.bundle)
                        .ok_or_else(|| StoreError::not_found("bundle", &entry.bundle))?;
                    nodes.push(
                        Node::new(entry.bundle.clone(), bundle.version()?)
                            .with_replaces(entry.replaces.clone())
                            .with_skips(entry.skips.iter().cloned()),
                    );
                }
                let graph = ChannelGraph::from_nodes(&package.name, &channel.name, nodes);
                graph.validate()?;
                persist::write_channel_graph(tx, &graph)?;
            }

            for name in &package.deprecated {
                tx.execute(
                    "INSERT OR IGNORE INTO deprecated (operatorbundle_name) VALUES (?1)",
                    [name],
                )?;
            }

            invariants::check(tx)?;
            Ok(())
        })
    }
}
