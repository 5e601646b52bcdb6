//! Subcommand implementations

pub mod add;
pub mod deprecate;
pub mod migrate;
pub mod prune;
pub mod prune_stranded;
pub mod render;
pub mod rm;
pub mod serve;
pub mod validate;

use opcat_validate::ValidatorSet;

use crate::error::{CliError, Result};

/// Assemble the validator suite from `--enable-validator` and
/// `--validator-opt key=value` flags.
pub(crate) fn build_validators(names: &[String], opts: &[String]) -> Result<ValidatorSet> {
    let mut builder = ValidatorSet::builder().with_required();
    for name in names {
        builder = builder.with_optional(name);
    }
    for opt in opts {
        let (key, value) = opt
            .split_once('=')
            .ok_or_else(|| CliError::input(format!("--validator-opt {opt:?} is not key=value")))?;
        builder = builder.option(key, value);
    }
    Ok(builder.build())
}

/// A current-thread runtime for the commands that drive async seams.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::from)
}
