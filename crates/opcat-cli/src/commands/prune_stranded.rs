//! Prune-stranded command - drop bundles no channel head reaches

use std::path::Path;

use console::style;

use opcat_store::Store;

use crate::error::Result;

pub fn run(database: &Path) -> Result<()> {
    let store = Store::open(database)?;
    let removed = store.prune_stranded()?;

    if removed.is_empty() {
        println!("{} no stranded bundles", style("→").blue());
    } else {
        for bundle in &removed {
            println!("  {} removed stranded bundle {bundle}", style("✓").green());
        }
    }
    Ok(())
}
