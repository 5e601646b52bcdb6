//! Pruning
//!
//! Two flavors: dropping bundles no channel head can reach, and dropping
//! whole packages outside a keep set. Both run in one transaction and
//! re-check the store invariants before committing.

use std::collections::BTreeSet;

use crate::db::Store;
use crate::error::Result;
use crate::invariants;
use crate::persist;

impl Store {
    /// Remove every bundle not reachable from any channel head via
    /// replaces or skips. Returns the removed names.
    pub fn prune_stranded(&self) -> Result<Vec<String>> {
        self.with_writer(|tx| {
            // in-channel bundles are reachable from their head by the graph
            // invariant, so stranded means out of every channel
            let stranded: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT name FROM operatorbundle
                     WHERE name NOT IN (SELECT operatorbundle_name FROM channel_entry)
                     ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            for name in &stranded {
                persist::remove_bundle_row(tx, name)?;
            }
            persist::clear_dangling_references(tx, &stranded)?;
            drop_empty_packages(tx)?;
            invariants::check(tx)?;
            Ok(stranded)
        })
    }

    /// Remove every package not in `keep`, cascading bundles, channels and
    /// entries. Returns the removed package names.
    pub fn prune_packages(&self, keep: &BTreeSet<String>) -> Result<Vec<String>> {
        self.with_writer(|tx| {
            let all: Vec<String> = {
                let mut stmt = tx.prepare("SELECT name FROM package ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            let doomed: Vec<String> = all.into_iter().filter(|p| !keep.contains(p)).collect();
            for package in &doomed {
                persist::remove_package(tx, package)?;
            }
            invariants::check(tx)?;
            Ok(doomed)
        })
    }

    /// Remove one package and everything it owns.
    pub fn remove_package(&self, name: &str) -> Result<()> {
        self.with_writer(|tx| {
            persist::remove_package(tx, name)?;
            invariants::check(tx)?;
            Ok(())
        })
    }
}

fn drop_empty_packages(tx: &rusqlite::Transaction<'_>) -> Result<()> {
    tx.execute(
        "DELETE FROM package
         WHERE NOT EXISTS (SELECT 1 FROM channel c WHERE c.package_name = package.name)",
        [],
    )?;
    Ok(())
}
