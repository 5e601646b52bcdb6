//! Exit codes - these are contracts for callers scripting the CLI

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// A bundle with the same name is already in the store (ingest)
pub const BUNDLE_ALREADY_PRESENT: i32 = 2;

/// The package already carries that version in a channel (ingest)
pub const PACKAGE_VERSION_ALREADY_PRESENT: i32 = 3;
