//! Add command - ingest bundles

use std::path::Path;
use std::sync::Arc;

use console::style;
use indicatif::ProgressBar;

use opcat_registry::{CancelFlag, Director, DirectoryFetcher};
use opcat_store::{AddOptions, Store, UpdateMode};

use crate::commands::{build_validators, runtime};
use crate::error::{CliError, Result};

pub fn run(
    database: &Path,
    bundles: &[String],
    mode: &str,
    permissive: bool,
    overwrite_latest: bool,
    validators: &[String],
    validator_opts: &[String],
) -> Result<()> {
    let mode = UpdateMode::parse(mode)
        .ok_or_else(|| CliError::input(format!("unknown update mode {mode:?}")))?;
    let validators = build_validators(validators, validator_opts)?;
    let store = Arc::new(Store::open(database)?);

    let options = AddOptions {
        mode,
        permissive,
        overwrite_latest,
    };
    let director = Director::new(Arc::clone(&store), DirectoryFetcher, validators, options);

    let progress = ProgressBar::new_spinner();
    progress.set_message(format!("ingesting {} bundle(s)", bundles.len()));

    let cancel = CancelFlag::new();
    let outcome = runtime()?.block_on(async {
        // ctrl-c finishes the in-flight bundle, then stops the run
        let cancel_on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel_on_signal.cancel();
            }
        });
        director
            .add_all(bundles, &cancel)
            .await
            .map_err(CliError::from)
    })?;
    progress.finish_and_clear();

    for warning in &outcome.warnings {
        println!("  {} {warning}", style("⚠").yellow());
    }
    for added in &outcome.added {
        println!("  {} added {added}", style("✓").green());
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
