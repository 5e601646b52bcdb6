//! Ingest orchestration
//!
//! fetch -> validate -> add, one bundle at a time. Writers are never
//! interrupted mid-transaction; the cancellation flag is honored between
//! bundles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use opcat_core::Bundle;
use opcat_store::{AddOptions, Store, StoreError};
use opcat_validate::{Finding, ValidationObject, ValidatorSet};

use crate::error::{RegistryError, Result};
use crate::fetch::BundleFetcher;

/// Cooperative cancellation between bundles of a multi-bundle ingest.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What one ingest run did.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub added: Vec<String>,
    pub warnings: Vec<String>,
    pub findings: Vec<Finding>,
}

/// Drives fetch -> validate -> add for a set of bundle references.
pub struct Director<F> {
    store: Arc<Store>,
    fetcher: F,
    validators: ValidatorSet,
    options: AddOptions,
}

impl<F: BundleFetcher> Director<F> {
    pub fn new(store: Arc<Store>, fetcher: F, validators: ValidatorSet, options: AddOptions) -> Self {
        Self {
            store,
            fetcher,
            validators,
            options,
        }
    }

    /// Ingest every reference, failing fast: the first bad bundle aborts
    /// the run (already-committed bundles stay, each add is its own
    /// transaction).
    pub async fn add_all(&self, references: &[String], cancel: &CancelFlag) -> Result<IngestOutcome> {
        let mut outcome = IngestOutcome::default();
        for reference in references {
            if cancel.is_cancelled() {
                return Err(RegistryError::Cancelled {
                    completed: outcome.added.len(),
                });
            }
            self.add_one(reference, &mut outcome).await?;
        }
        Ok(outcome)
    }

    async fn add_one(&self, reference: &str, outcome: &mut IngestOutcome) -> Result<()> {
        let fetched = self.fetcher.fetch(reference).await?;
        let bundle = Bundle::from_dir(&fetched.directory)?.with_image(&fetched.reference);

        let report = self.validators.run(&[ValidationObject::Bundle(&bundle)]);
        for finding in report.warnings() {
            tracing::warn!(bundle = %bundle.name, "{}: {}", finding.locator, finding.message);
        }
        if report.has_errors() {
            let errors = report.errors().count();
            if !self.options.permissive {
                outcome.findings.extend(report.findings);
                return Err(RegistryError::ValidationFailed(errors));
            }
            for finding in report.errors() {
                tracing::warn!(
                    bundle = %bundle.name,
                    "permissive mode, downgrading: {}", finding.message
                );
            }
        }
        outcome.findings.extend(report.findings);

        let store = Arc::clone(&self.store);
        let options = self.options.clone();
        let name = bundle.name.clone();
        let report = tokio::task::spawn_blocking(move || store.add_bundle(&bundle, &options))
            .await
            .map_err(|e| RegistryError::Store(StoreError::Io(std::io::Error::other(e))))?
            .map_err(RegistryError::from)?;

        outcome.warnings.extend(report.warnings);
        outcome.added.push(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DirectoryFetcher;
    use std::path::Path;

    fn write_bundle(root: &Path, name: &str, version: &str) {
        std::fs::create_dir_all(root.join("manifests")).unwrap();
        std::fs::create_dir_all(root.join("metadata")).unwrap();
        std::fs::write(
            root.join("manifests/csv.yaml"),
            format!(
                r#"
apiVersion: operators.coreos.com/v1alpha1
kind: ClusterServiceVersion
metadata:
  name: {name}
spec:
  version: {version}
  installModes:
  - type: AllNamespaces
    supported: true
"#
            ),
        )
        .unwrap();
        std::fs::write(
            root.join("metadata/annotations.yaml"),
            r#"
annotations:
  operators.operatorframework.io.bundle.package.v1: foo
  operators.operatorframework.io.bundle.channels.v1: stable
"#,
        )
        .unwrap();
    }

    fn director() -> (Director<DirectoryFetcher>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let director = Director::new(
            Arc::clone(&store),
            DirectoryFetcher,
            ValidatorSet::default_set(),
            AddOptions::default(),
        );
        (director, store)
    }

    #[tokio::test]
    async fn test_ingest_one_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "foo.v1.0.0", "1.0.0");

        let (director, store) = director();
        let outcome = director
            .add_all(
                &[dir.path().to_string_lossy().into_owned()],
                &CancelFlag::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.added, ["foo.v1.0.0"]);
        assert_eq!(store.stats().unwrap().bundles, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "foo.v1.0.0", "1.0.0");

        let (director, store) = director();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = director
            .add_all(&[dir.path().to_string_lossy().into_owned()], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Cancelled { completed: 0 }));
        assert_eq!(store.stats().unwrap().bundles, 0);
    }
}
