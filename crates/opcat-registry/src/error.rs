//! Registry error types and their RPC code mapping

use thiserror::Error;

use opcat_store::StoreError;

/// The error codes the RPC surface promises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcCode {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    FailedPrecondition,
    Internal,
    Unavailable,
    Cancelled,
}

impl std::fmt::Display for RpcCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{kind} {name:?} not found{}", suggestion_suffix(.suggestion))]
    NotFound {
        kind: &'static str,
        name: String,
        suggestion: Option<String>,
    },

    #[error("ingest was cancelled after {completed} bundle(s)")]
    Cancelled { completed: usize },

    #[error("validation failed: {0} error(s)")]
    ValidationFailed(usize),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Core(#[from] opcat_core::CoreError),

    #[error("fetch of {reference:?} failed: {message}")]
    Fetch { reference: String, message: String },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(candidate) => format!("; did you mean {candidate:?}?"),
        None => String::new(),
    }
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, name } => Self::NotFound {
                kind,
                name,
                suggestion: None,
            },
            other => Self::Store(other),
        }
    }
}

impl RegistryError {
    /// The code the transport reports for this error.
    pub fn code(&self) -> RpcCode {
        match self {
            Self::NotFound { .. } => RpcCode::NotFound,
            Self::Cancelled { .. } => RpcCode::Cancelled,
            Self::ValidationFailed(_) => RpcCode::InvalidArgument,
            Self::Fetch { .. } => RpcCode::Unavailable,
            Self::Core(_) => RpcCode::InvalidArgument,
            Self::Store(store) => match store {
                StoreError::BundleAlreadyPresent(_) => RpcCode::AlreadyExists,
                StoreError::PackageVersionAlreadyPresent { .. } => RpcCode::AlreadyExists,
                StoreError::NotFound { .. } | StoreError::NoReplacement(_) => RpcCode::NotFound,
                StoreError::Busy => RpcCode::Unavailable,
                StoreError::Cycle(_)
                | StoreError::MultipleHeads { .. }
                | StoreError::MissingReplacesTarget { .. }
                | StoreError::InvalidSubstitution { .. }
                | StoreError::SelfSkippingRange { .. }
                | StoreError::ChainTooDeep { .. }
                | StoreError::FailedPrecondition { .. }
                | StoreError::InvariantViolation(_) => RpcCode::FailedPrecondition,
                StoreError::Core(_) | StoreError::UnknownMigration(_) => RpcCode::InvalidArgument,
                StoreError::Corruption(_)
                | StoreError::Incompatible(_)
                | StoreError::HotJournal(_)
                | StoreError::Sqlite(_)
                | StoreError::Io(_)
                | StoreError::Json(_) => RpcCode::Internal,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == RpcCode::NotFound
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        let already = RegistryError::from(StoreError::BundleAlreadyPresent("b".into()));
        assert_eq!(already.code(), RpcCode::AlreadyExists);

        let missing = RegistryError::from(StoreError::not_found("bundle", "b"));
        assert_eq!(missing.code(), RpcCode::NotFound);

        let busy = RegistryError::from(StoreError::Busy);
        assert_eq!(busy.code(), RpcCode::Unavailable);
    }

    #[test]
    fn test_suggestion_in_message() {
        let err = RegistryError::NotFound {
            kind: "package",
            name: "etdc".into(),
            suggestion: Some("etcd".into()),
        };
        assert!(err.to_string().contains("did you mean \"etcd\"?"));
    }
}
