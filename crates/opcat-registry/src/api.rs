//! The registry query surface
//!
//! One service, a fixed operation set, every result a fully materialized
//! bundle payload. Implementations must be Send + Sync so the dispatch
//! loop can fan requests out onto tasks; a caller cancels a query by
//! dropping its future.

use async_trait::async_trait;

use opcat_store::{BundlePayload, ChannelEntryInfo, PackageSummary};

use crate::error::Result;
use crate::health::HealthStatus;
use crate::service::BundleStream;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Every package name in the catalog.
    async fn list_packages(&self) -> Result<Vec<String>>;

    /// Package identity, channel list and default channel.
    async fn get_package(&self, name: &str) -> Result<PackageSummary>;

    /// The matching bundle within a channel.
    async fn get_bundle(&self, package: &str, channel: &str, name: &str)
    -> Result<BundlePayload>;

    /// A bundle by name alone, channels or not (substituted-out bundles
    /// stay reachable this way).
    async fn get_bundle_by_name(&self, name: &str) -> Result<BundlePayload>;

    /// The channel's head bundle.
    async fn get_bundle_for_channel(&self, package: &str, channel: &str)
    -> Result<BundlePayload>;

    /// The unique bundle whose replaces or skips covers `current`.
    async fn get_bundle_that_replaces(
        &self,
        current: &str,
        package: &str,
        channel: &str,
    ) -> Result<BundlePayload>;

    /// Among providers of the API, the default-channel head of the owning
    /// package, ties broken by highest version.
    async fn get_default_bundle_that_provides(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<BundlePayload>;

    /// Every channel position providing the API.
    async fn get_channel_entries_that_provide(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<Vec<ChannelEntryInfo>>;

    /// A lazy, finite sequence of every (channel, bundle) position. The
    /// consumer's pace throttles the producer.
    async fn list_bundles(&self) -> Result<BundleStream>;

    async fn health_check(&self) -> HealthStatus;
}
