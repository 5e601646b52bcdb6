//! Prune command - keep only the named packages

use std::collections::BTreeSet;
use std::path::Path;

use console::style;

use opcat_store::Store;

use crate::error::Result;

pub fn run(database: &Path, keep: &[String]) -> Result<()> {
    let store = Store::open(database)?;
    let keep: BTreeSet<String> = keep.iter().cloned().collect();
    let removed = store.prune_packages(&keep)?;

    if removed.is_empty() {
        println!("{} nothing to prune", style("→").blue());
    } else {
        for package in &removed {
            println!("  {} pruned package {package}", style("✓").green());
        }
    }
    Ok(())
}
