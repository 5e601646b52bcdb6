//! CLI error type with exit code handling
//!
//! One error enum for the whole binary, mapped to the contractual exit
//! codes in `exit_codes`.

use miette::Diagnostic;
use thiserror::Error;

use opcat_registry::RegistryError;
use opcat_store::StoreError;

use crate::exit_codes;

#[derive(Error, Diagnostic, Debug)]
pub enum CliError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Registry(RegistryError),

    #[error("{0}")]
    Catalog(#[from] opcat_declcfg::CatalogError),

    #[error("{0}")]
    Core(#[from] opcat_core::CoreError),

    #[error("validation failed with {errors} error(s) and {warnings} warning(s)")]
    ValidationFailed { errors: usize, warnings: usize },

    #[error("{0}")]
    Input(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Store(store) => Self::Store(store),
            other => Self::Registry(other),
        }
    }
}

impl CliError {
    /// Map the error to its contractual exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Store(StoreError::BundleAlreadyPresent(_)) => {
                exit_codes::BUNDLE_ALREADY_PRESENT
            }
            CliError::Store(StoreError::PackageVersionAlreadyPresent { .. }) => {
                exit_codes::PACKAGE_VERSION_ALREADY_PRESENT
            }
            _ => exit_codes::ERROR,
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_exit_codes() {
        let dup = CliError::Store(StoreError::BundleAlreadyPresent("b".into()));
        assert_eq!(dup.exit_code(), 2);

        let version = CliError::Store(StoreError::PackageVersionAlreadyPresent {
            package: "p".into(),
            channel: "stable".into(),
            version: "1.0.0".into(),
        });
        assert_eq!(version.exit_code(), 3);

        let generic = CliError::input("bad flag");
        assert_eq!(generic.exit_code(), 1);
    }

    #[test]
    fn test_registry_wrapped_store_error_keeps_code() {
        let err: CliError =
            RegistryError::from(StoreError::BundleAlreadyPresent("b".into())).into();
        assert_eq!(err.exit_code(), 2);
    }
}
