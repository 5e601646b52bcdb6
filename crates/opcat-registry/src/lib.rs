//! Opcat Registry - the query service over a catalog store
//!
//! This crate owns the RPC-shaped surface (`Registry`), its store-backed
//! implementation, the health check, the `BundleFetcher` seam and the
//! ingest director that drives fetch -> validate -> add.

pub mod api;
pub mod director;
pub mod error;
pub mod fetch;
pub mod health;
pub mod service;
mod suggest;

pub use api::Registry;
pub use director::{CancelFlag, Director, IngestOutcome};
pub use error::{RegistryError, Result, RpcCode};
pub use fetch::{BundleFetcher, DirectoryFetcher, FetchedBundle};
pub use health::HealthStatus;
pub use service::{BundleStream, StoreRegistry};
