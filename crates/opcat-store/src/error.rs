//! Store error types
//!
//! The variants mirror the failure kinds the engine distinguishes: file
//! format problems surfaced before SQLite sees the file, invariant
//! violations rolled back during ingest, and not-found results at the query
//! surface.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// File header invalid: bad magic, impossible page size.
    #[error("store file is corrupt: {0}")]
    Corruption(String),

    /// Format newer than this reader supports, or an encoding it refuses.
    #[error("store file is incompatible: {0}")]
    Incompatible(String),

    /// A rollback journal without an active writer; recovery is the
    /// caller's responsibility.
    #[error("hot rollback journal present at {0}; run recovery before opening")]
    HotJournal(String),

    #[error("bundle {0:?} already present")]
    BundleAlreadyPresent(String),

    #[error("package {package:?} already has a bundle at version {version} in channel {channel:?}")]
    PackageVersionAlreadyPresent {
        package: String,
        channel: String,
        version: String,
    },

    #[error("adding bundle {0:?} would create a replaces cycle")]
    Cycle(String),

    #[error("channel {channel:?} of package {package:?} would have no single head: {heads:?}")]
    MultipleHeads {
        package: String,
        channel: String,
        heads: Vec<String>,
    },

    #[error("bundle {bundle:?} replaces {target:?}, which is not in channel {channel:?}")]
    MissingReplacesTarget {
        bundle: String,
        target: String,
        channel: String,
    },

    #[error("bundle {bundle:?} substitutes for {target:?}: {reason}")]
    InvalidSubstitution {
        bundle: String,
        target: String,
        reason: String,
    },

    #[error("skip range of {bundle:?} includes its own version {version}")]
    SelfSkippingRange { bundle: String, version: String },

    #[error("chain in channel {channel:?} exceeds the maximum depth")]
    ChainTooDeep { channel: String },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("no bundle replaces {0:?}")]
    NoReplacement(String),

    #[error("cannot {action}: {reason}")]
    FailedPrecondition { action: String, reason: String },

    #[error("store invariant violated: {0}")]
    InvariantViolation(String),

    #[error("store is locked by another writer")]
    Busy,

    #[error("migration {0} is unknown to this build")]
    UnknownMigration(i64),

    #[error(transparent)]
    Core(#[from] opcat_core::CoreError),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode stored JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether the error denotes an absent row rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::NoReplacement(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
