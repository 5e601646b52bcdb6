//! Deprecation with truncation
//!
//! Deprecating a bundle writes its tombstone, then truncates: the bundle
//! and everything it transitively replaces leave their channels, and leave
//! the store once no channel references them. Survivors that replaced a
//! removed bundle keep a NULL edge. The tombstone row has no foreign key
//! and outlives the removal.

use std::collections::BTreeSet;

use rusqlite::{OptionalExtension, Transaction};

use crate::db::Store;
use crate::error::{Result, StoreError};
use crate::invariants;
use crate::persist;

#[derive(Debug, Clone, Default)]
pub struct DeprecateOptions {
    /// Permit deprecating the head of every channel of a package, which
    /// cascades the whole package away.
    pub allow_package_removal: bool,
}

impl Store {
    /// Deprecate one bundle by name. Deprecating an already-deprecated
    /// name is a no-op.
    pub fn deprecate_bundle(&self, name: &str, opts: &DeprecateOptions) -> Result<()> {
        self.with_writer(|tx| {
            let already: bool = tx
                .query_row(
                    "SELECT 1 FROM deprecated WHERE operatorbundle_name = ?1",
                    [name],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if already {
                return Ok(());
            }

            let exists: bool = tx
                .query_row("SELECT 1 FROM operatorbundle WHERE name = ?1", [name], |_| {
                    Ok(())
                })
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::not_found("bundle", name));
            }

            let package = persist::package_of_bundle(tx, name)?
                .ok_or_else(|| StoreError::not_found("package of bundle", name))?;

            tx.execute(
                "INSERT INTO deprecated (operatorbundle_name) VALUES (?1)",
                [name],
            )?;
            // the property rides on the bundle row and goes away with it;
            // the tombstone row above is what persists
            tx.execute(
                "INSERT INTO properties (type, value, operatorbundle_name) VALUES ('olm.deprecated', '{}', ?1)",
                [name],
            )?;

            let package_channels = persist::channels_of_package(tx, &package)?;
            let heads_everything = !package_channels.is_empty()
                && package_channels.iter().all(|(_, head)| head == name);
            if heads_everything {
                if !opts.allow_package_removal {
                    return Err(StoreError::FailedPrecondition {
                        action: format!("deprecate {name:?}"),
                        reason: format!(
                            "it heads every channel of package {package:?}; pass AllowPackageRemoval to drop the package"
                        ),
                    });
                }
                persist::remove_package(tx, &package)?;
                invariants::check(tx)?;
                return Ok(());
            }

            truncate(tx, &package, name)?;
            invariants::check(tx)?;
            Ok(())
        })
    }
}

/// Remove `name` and its transitive replaces closure from every channel it
/// occupies, then from the store where unreferenced.
fn truncate(tx: &Transaction<'_>, package: &str, name: &str) -> Result<()> {
    let channels = persist::channels_of_bundle(tx, name)?;
    let mut touched: BTreeSet<String> = BTreeSet::new();
    let default_channel: Option<String> = tx
        .query_row(
            "SELECT default_channel FROM package WHERE name = ?1",
            [package],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    for (channel_package, channel) in &channels {
        let mut graph = persist::load_channel_graph(tx, channel_package, channel)?;
        for member in graph.descendants(name) {
            graph.remove(&member);
            touched.insert(member);
        }
        if graph.is_empty() && default_channel.as_deref() == Some(channel.as_str()) {
            return Err(StoreError::FailedPrecondition {
                action: format!("deprecate {name:?}"),
                reason: format!("it would empty the default channel {channel:?}"),
            });
        }
        persist::write_channel_graph(tx, &graph)?;
    }
    touched.insert(name.to_string());

    let mut removed = Vec::new();
    for member in touched {
        let still_referenced: bool = tx
            .query_row(
                "SELECT 1 FROM channel_entry WHERE operatorbundle_name = ?1 LIMIT 1",
                [&member],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !still_referenced {
            persist::remove_bundle_row(tx, &member)?;
            removed.push(member);
        }
    }
    persist::clear_dangling_references(tx, &removed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deprecate_missing_bundle_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .deprecate_bundle("ghost.v1.0.0", &DeprecateOptions::default())
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
