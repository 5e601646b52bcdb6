//! Migrate command - run schema migrations

use std::path::Path;

use console::style;

use opcat_store::Store;

use crate::error::Result;

pub fn run(database: &Path, down_to: Option<i64>) -> Result<()> {
    // opening read-write replays every pending up migration
    let store = Store::open(database)?;
    if let Some(target) = down_to {
        store.migrate_down_to(target)?;
    }
    println!(
        "{} schema at version {}",
        style("✓").green(),
        store.schema_version()?
    );
    Ok(())
}
