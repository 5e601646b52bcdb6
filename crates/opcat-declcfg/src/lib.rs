//! Opcat Declcfg - the file-based catalog
//!
//! The declarative, text-format equivalent of the relational store: a
//! stream of typed records (`olm.package`, `olm.channel`, `olm.bundle`,
//! `olm.deprecations`) readable as concatenated JSON or YAML documents in
//! any interleaving. The migration from the relational form is one-way
//! (`render`); `populate` exists so a rendered catalog can seed a fresh
//! store.

pub mod error;
pub mod read;
pub mod render;
pub mod types;
pub mod validate;
pub mod write;

pub use error::CatalogError;
pub use read::{load_path, load_str};
pub use render::{populate, render};
pub use types::{
    BundleRecord, ChannelEntry, ChannelRecord, DeclarativeConfig, DeprecationEntry,
    DeprecationRef, DeprecationsRecord, Icon, OtherRecord, PackageRecord, RelatedImage,
};
pub use validate::validate;
pub use write::{Format, to_string, write_dir};
