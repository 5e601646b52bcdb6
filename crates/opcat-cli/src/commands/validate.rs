//! Validate command - bundles and file-based catalogs

use std::path::Path;

use console::style;

use opcat_core::Bundle;
use opcat_validate::{Severity, ValidationObject, ValidationReport};

use crate::commands::build_validators;
use crate::error::{CliError, Result};

pub fn run(path: &Path, validators: &[String], validator_opts: &[String]) -> Result<()> {
    let report = if path.join("metadata").join("annotations.yaml").exists() {
        validate_bundle(path, validators, validator_opts)?
    } else {
        validate_catalog(path)?
    };

    let mut errors = 0;
    let mut warnings = 0;
    for finding in &report.findings {
        match finding.level {
            Severity::Error => {
                errors += 1;
                println!("  {} {}: {}", style("✗").red(), finding.locator, finding.message);
            }
            Severity::Warning => {
                warnings += 1;
                println!("  {} {}: {}", style("⚠").yellow(), finding.locator, finding.message);
            }
            Severity::Info => {
                println!("  {} {}: {}", style("·").dim(), finding.locator, finding.message);
            }
        }
    }

    if errors > 0 {
        return Err(CliError::ValidationFailed { errors, warnings });
    }
    println!(
        "{} {} is valid ({warnings} warning(s))",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

fn validate_bundle(
    path: &Path,
    validators: &[String],
    validator_opts: &[String],
) -> Result<ValidationReport> {
    let bundle = Bundle::from_dir(path)?;
    let suite = build_validators(validators, validator_opts)?;
    Ok(suite.run(&[ValidationObject::Bundle(&bundle)]))
}

fn validate_catalog(path: &Path) -> Result<ValidationReport> {
    let config = opcat_declcfg::load_path(path)?;
    Ok(opcat_declcfg::validate(&config))
}
