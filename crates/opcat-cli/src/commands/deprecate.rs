//! Deprecate command - tombstone bundles and truncate their history

use std::path::Path;

use console::style;

use opcat_store::{DeprecateOptions, Store};

use crate::error::Result;

pub fn run(database: &Path, bundles: &[String], allow_package_removal: bool) -> Result<()> {
    let store = Store::open(database)?;
    let options = DeprecateOptions {
        allow_package_removal,
    };
    for bundle in bundles {
        store.deprecate_bundle(bundle, &options)?;
        println!("  {} deprecated {bundle}", style("✓").green());
    }
    Ok(())
}
