//! Opcat Core - foundational types for the operator catalog registry
//!
//! This crate provides the types shared by the rest of Opcat:
//! - `Bundle`: one installable operator version loaded from a manifest directory
//! - `Manifest`: a tagged view over the heterogeneous Kubernetes objects a bundle carries
//! - `ClusterServiceVersion` / `CrdManifest`: the two manifest kinds the graph cares about
//! - `Property`: typed, JSON-encoded key/values attached to a bundle
//! - `ApiKey`: the interned (group, version, kind, plural) identity of a served API

pub mod annotations;
pub mod api;
pub mod bundle;
pub mod crd;
pub mod csv;
pub mod error;
pub mod manifest;
pub mod package;
pub mod property;
pub mod version;

pub use annotations::{Annotations, AnnotationsFile};
pub use api::ApiKey;
pub use bundle::Bundle;
pub use crd::CrdManifest;
pub use csv::ClusterServiceVersion;
pub use error::CoreError;
pub use manifest::Manifest;
pub use package::{PackageChannel, PackageManifest};
pub use property::{Dependency, Property, property_types};
pub use version::SkipRange;
