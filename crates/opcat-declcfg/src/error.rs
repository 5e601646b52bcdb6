//! Catalog error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog path not found: {0}")]
    NotFound(PathBuf),

    #[error("document in {path} has no schema field")]
    MissingSchema { path: String },

    #[error("failed to parse document in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("catalog validation failed with {errors} error(s)")]
    Invalid { errors: usize },

    #[error("bundle {bundle:?} carries no usable manifest objects")]
    NoObjects { bundle: String },

    #[error(transparent)]
    Core(#[from] opcat_core::CoreError),

    #[error(transparent)]
    Store(#[from] opcat_store::StoreError),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
