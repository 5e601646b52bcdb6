//! Core error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("bundle directory not found: {path}")]
    BundleNotFound { path: String },

    #[error("invalid bundle at {path}: {message}")]
    InvalidBundle { path: String, message: String },

    #[error("bundle has no metadata/annotations.yaml: {0}")]
    MissingAnnotations(PathBuf),

    #[error("bundle has no ClusterServiceVersion manifest: {0}")]
    MissingCsv(PathBuf),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        source: semver::Error,
    },

    #[error("invalid skip range {range:?}: {message}")]
    InvalidSkipRange { range: String, message: String },

    #[error("manifest {name:?} is missing field {field}")]
    MissingField { name: String, field: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
