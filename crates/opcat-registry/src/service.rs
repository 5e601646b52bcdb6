//! Store-backed registry service
//!
//! Database work runs on blocking tasks so RPC handlers never pin a
//! runtime worker on I/O. Handlers hold no locks across await points; a
//! dropped future abandons its query.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;

use opcat_store::{BundlePayload, ChannelEntryInfo, PackageSummary, Store, StoreError};

use crate::api::Registry;
use crate::error::{RegistryError, Result};
use crate::health::HealthStatus;
use crate::suggest;

/// A registry serving straight from a catalog store.
#[derive(Clone)]
pub struct StoreRegistry {
    store: Arc<Store>,
}

impl StoreRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> std::result::Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let joined = tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| RegistryError::Store(StoreError::Io(std::io::Error::other(e))))?;
        joined.map_err(RegistryError::from)
    }

    /// Attach a "did you mean" to a package-not-found error.
    async fn suggest_package(&self, error: RegistryError) -> RegistryError {
        let RegistryError::NotFound {
            kind: "package",
            name,
            suggestion: None,
        } = error
        else {
            return error;
        };
        let candidates = self
            .blocking(|store| store.list_packages())
            .await
            .unwrap_or_default();
        let suggestion = suggest::closest(&name, candidates.iter().map(String::as_str));
        RegistryError::NotFound {
            kind: "package",
            name,
            suggestion,
        }
    }
}

#[async_trait]
impl Registry for StoreRegistry {
    async fn list_packages(&self) -> Result<Vec<String>> {
        self.blocking(|store| store.list_packages()).await
    }

    async fn get_package(&self, name: &str) -> Result<PackageSummary> {
        let name = name.to_string();
        match self.blocking(move |store| store.get_package(&name)).await {
            Err(e) => Err(self.suggest_package(e).await),
            ok => ok,
        }
    }

    async fn get_bundle(
        &self,
        package: &str,
        channel: &str,
        name: &str,
    ) -> Result<BundlePayload> {
        let (package, channel, name) =
            (package.to_string(), channel.to_string(), name.to_string());
        self.blocking(move |store| store.get_bundle(&package, &channel, &name))
            .await
    }

    async fn get_bundle_by_name(&self, name: &str) -> Result<BundlePayload> {
        let name = name.to_string();
        self.blocking(move |store| store.get_bundle_by_name(&name))
            .await
    }

    async fn get_bundle_for_channel(
        &self,
        package: &str,
        channel: &str,
    ) -> Result<BundlePayload> {
        let (package, channel) = (package.to_string(), channel.to_string());
        match self
            .blocking(move |store| store.get_bundle_for_channel(&package, &channel))
            .await
        {
            Err(e) => Err(self.suggest_package(e).await),
            ok => ok,
        }
    }

    async fn get_bundle_that_replaces(
        &self,
        current: &str,
        package: &str,
        channel: &str,
    ) -> Result<BundlePayload> {
        let (current, package, channel) =
            (current.to_string(), package.to_string(), channel.to_string());
        self.blocking(move |store| store.get_bundle_that_replaces(&current, &package, &channel))
            .await
    }

    async fn get_default_bundle_that_provides(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<BundlePayload> {
        let (group, version, kind) = (group.to_string(), version.to_string(), kind.to_string());
        self.blocking(move |store| {
            store.get_default_bundle_that_provides(&group, &version, &kind)
        })
        .await
    }

    async fn get_channel_entries_that_provide(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<Vec<ChannelEntryInfo>> {
        let (group, version, kind) = (group.to_string(), version.to_string(), kind.to_string());
        self.blocking(move |store| {
            store.get_channel_entries_that_provide(&group, &version, &kind)
        })
        .await
    }

    async fn list_bundles(&self) -> Result<BundleStream> {
        // bounded: the consumer's pace throttles the producer
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            for payload in store.list_bundles() {
                let item = payload.map_err(RegistryError::from);
                if tx.blocking_send(item).is_err() {
                    // consumer hung up; stop producing
                    break;
                }
            }
        });
        Ok(BundleStream { rx })
    }

    async fn health_check(&self) -> HealthStatus {
        match self.blocking(|store| store.stats()).await {
            Ok(_) => HealthStatus::Serving,
            Err(e) => {
                tracing::warn!("health check failed: {e}");
                HealthStatus::NotServing
            }
        }
    }
}

/// The lazy bundle sequence handed to `ListBundles` consumers.
pub struct BundleStream {
    rx: tokio::sync::mpsc::Receiver<Result<BundlePayload>>,
}

impl BundleStream {
    pub async fn next(&mut self) -> Option<Result<BundlePayload>> {
        self.rx.recv().await
    }
}

impl futures::Stream for BundleStream {
    type Item = Result<BundlePayload>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StoreRegistry {
        StoreRegistry::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_empty_store_serves() {
        let registry = registry();
        assert!(registry.health_check().await.is_serving());
        assert!(registry.list_packages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_has_code() {
        let registry = registry();
        let err = registry.get_package("ghost").await.unwrap_err();
        assert_eq!(err.code(), crate::error::RpcCode::NotFound);
    }

    #[tokio::test]
    async fn test_list_bundles_stream_terminates() {
        let registry = registry();
        let mut stream = registry.list_bundles().await.unwrap();
        assert!(stream.next().await.is_none());
    }
}
