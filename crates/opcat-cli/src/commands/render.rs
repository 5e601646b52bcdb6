//! Render command - export the store to the file-based catalog

use std::path::Path;

use console::style;

use opcat_declcfg::Format;
use opcat_store::Store;

use crate::error::{CliError, Result};

pub fn run(database: &Path, output: Option<&Path>, format: &str) -> Result<()> {
    let format = Format::parse(format)
        .ok_or_else(|| CliError::input(format!("unknown output format {format:?}")))?;
    let store = Store::open_read_only(database)?;
    let config = opcat_declcfg::render(&store)?;

    match output {
        Some(dir) => {
            opcat_declcfg::write_dir(&config, dir, format)?;
            println!(
                "{} rendered {} package(s) to {}",
                style("✓").green(),
                config.packages.len(),
                dir.display()
            );
        }
        None => {
            print!("{}", opcat_declcfg::to_string(&config, format)?);
        }
    }
    Ok(())
}
