//! Opcat Store - the single-file catalog store
//!
//! An embedded SQLite database holding packages, channels, bundles, their
//! upgrade graph and their API/property relations, together with:
//! - the graph builder integrating new bundles under the three update modes
//! - the deprecator/pruner maintaining the graph under removal
//! - the read surface the query service is built on
//!
//! Writes serialize behind a single writer handle; every mutation runs in
//! one transaction and re-checks the store invariants before committing.

pub mod add;
pub mod db;
pub mod deprecate;
pub mod error;
pub mod graph;
pub mod import;
pub mod invariants;
pub mod migrations;
mod persist;
pub mod prune;
pub mod query;

pub use add::{AddOptions, AddReport};
pub use db::{OpenMode, Store};
pub use deprecate::DeprecateOptions;
pub use error::StoreError;
pub use import::{ImportChannel, ImportEntry, ImportPackage};
pub use graph::{ChannelGraph, MAX_CHAIN_DEPTH, Node, UpdateMode};
pub use query::{
    BundleIterator, BundlePayload, ChannelEntryInfo, ChannelSummary, PackageSummary, StoreStats,
};
