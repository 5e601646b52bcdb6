//! Bundle fetching seam
//!
//! Pulling images and unpacking layers is someone else's job; the
//! registry only needs "reference in, manifest directory out". The
//! directory fetcher covers local content and tests; container-backed
//! implementations live with the tooling that owns image access.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{RegistryError, Result};

/// A fetched bundle: where it came from and where its manifests sit.
#[derive(Debug, Clone)]
pub struct FetchedBundle {
    pub reference: String,
    pub directory: PathBuf,
}

#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Resolve `reference` to a bundle manifest directory.
    async fn fetch(&self, reference: &str) -> Result<FetchedBundle>;
}

/// Treats the reference as a local bundle directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryFetcher;

#[async_trait]
impl BundleFetcher for DirectoryFetcher {
    async fn fetch(&self, reference: &str) -> Result<FetchedBundle> {
        let directory = PathBuf::from(reference);
        if !directory.is_dir() {
            return Err(RegistryError::Fetch {
                reference: reference.to_string(),
                message: "not a directory".to_string(),
            });
        }
        Ok(FetchedBundle {
            reference: reference.to_string(),
            directory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let fetched = DirectoryFetcher
            .fetch(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(fetched.directory, dir.path());

        let err = DirectoryFetcher.fetch("/no/such/bundle").await.unwrap_err();
        assert!(matches!(err, RegistryError::Fetch { .. }));
    }
}
