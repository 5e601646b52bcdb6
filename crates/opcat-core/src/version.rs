//! Semantic version helpers
//!
//! Upgrade annotations use the space-separated comparator form
//! (`>=1.0.0 <2.0.0`) while `semver::VersionReq` wants comma separation;
//! `SkipRange` owns that normalization and keeps the original spelling for
//! round-tripping.

use std::fmt;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A semantic-version range a bundle considers itself an upgrade for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SkipRange {
    raw: String,
    req: VersionReq,
}

impl SkipRange {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = normalize_range(raw);
        let req = VersionReq::parse(&normalized).map_err(|e| CoreError::InvalidSkipRange {
            range: raw.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            req,
        })
    }

    /// Whether the range contains `version`.
    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// The original spelling, as written in the bundle.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for SkipRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for SkipRange {
    type Error = CoreError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<SkipRange> for String {
    fn from(range: SkipRange) -> String {
        range.raw
    }
}

/// Rewrite space-separated comparators into VersionReq's comma form.
///
/// `>=1.0.0 <2.0.0` becomes `>=1.0.0, <2.0.0`; already comma-separated input
/// passes through unchanged.
fn normalize_range(raw: &str) -> String {
    if raw.contains(',') {
        return raw.to_string();
    }
    raw.split_whitespace().collect::<Vec<_>>().join(", ")
}

/// Parse a bundle version, surfacing the original string on failure.
pub fn parse_version(raw: &str) -> Result<Version> {
    Version::parse(raw.trim()).map_err(|e| CoreError::InvalidVersion {
        version: raw.to_string(),
        source: e,
    })
}

/// Compare two versions for channel ordering.
///
/// Build metadata never differentiates: `1.0.0+1` and `1.0.0+2` are equal
/// for ordering purposes, and the add modes reject the insertion instead of
/// picking one.
pub fn order_versions(a: &Version, b: &Version) -> std::cmp::Ordering {
    let strip = |v: &Version| Version {
        major: v.major,
        minor: v.minor,
        patch: v.patch,
        pre: v.pre.clone(),
        build: semver::BuildMetadata::EMPTY,
    };
    strip(a).cmp(&strip(b))
}

/// Whether two versions share the same identity up to build metadata.
pub fn same_base_version(a: &Version, b: &Version) -> bool {
    order_versions(a, b) == std::cmp::Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_separated_range() {
        let range = SkipRange::parse(">=1.0.0 <2.0.0").unwrap();
        assert!(range.matches(&Version::parse("1.5.0").unwrap()));
        assert!(!range.matches(&Version::parse("2.0.0").unwrap()));
        assert_eq!(range.as_str(), ">=1.0.0 <2.0.0");
    }

    #[test]
    fn test_comma_separated_range() {
        let range = SkipRange::parse(">=1.0.0, <2.0.0").unwrap();
        assert!(range.matches(&Version::parse("1.0.0").unwrap()));
    }

    #[test]
    fn test_invalid_range() {
        assert!(SkipRange::parse("not a range").is_err());
    }

    #[test]
    fn test_build_metadata_is_not_ordering() {
        let a = Version::parse("1.0.0+1").unwrap();
        let b = Version::parse("1.0.0+2").unwrap();
        assert_eq!(order_versions(&a, &b), std::cmp::Ordering::Equal);
        assert!(same_base_version(&a, &b));
    }

    #[test]
    fn test_prerelease_orders_below_release() {
        let pre = Version::parse("1.0.0-rc.1").unwrap();
        let rel = Version::parse("1.0.0").unwrap();
        assert_eq!(order_versions(&pre, &rel), std::cmp::Ordering::Less);
    }

    #[test]
    fn test_skip_range_serde_roundtrip() {
        let range: SkipRange = serde_json::from_str(r#"">=4.1.0 <4.9.0""#).unwrap();
        let back = serde_json::to_string(&range).unwrap();
        assert_eq!(back, r#"">=4.1.0 <4.9.0""#);
    }
}
