//! Rm command - remove packages

use std::path::Path;

use console::style;

use opcat_store::Store;

use crate::error::Result;

pub fn run(database: &Path, packages: &[String]) -> Result<()> {
    let store = Store::open(database)?;
    for package in packages {
        store.remove_package(package)?;
        println!("  {} removed package {package}", style("✓").green());
    }

    let stats = store.stats()?;
    println!(
        "{} catalog now holds {} package(s), {} bundle(s)",
        style("→").blue(),
        stats.packages,
        stats.bundles
    );
    Ok(())
}
