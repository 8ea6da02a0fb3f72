//! Step URIs
//!
//! Steps are named with URI-like strings:
//! - Data steps: `data://{channel}/{namespace}/{version}/{name}`
//!   (e.g., `data://garden/biodiversity/2024-01-25/cherry_blossom`)
//! - Private data steps: `data-private://...` (same shape)
//! - Snapshots: `snapshot://{namespace}/{version}/{file}`
//! - Exports: `export://{channel}/{namespace}/{version}/{name}`
//!
//! The version is always the second-to-last path segment. Two steps that only
//! differ in their version share an *identity* and are versions of each other.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StepUriError {
    #[error("Invalid step URI: expected '{{scheme}}://{{path}}', got '{0}'")]
    MissingScheme(String),

    #[error("Invalid step URI: empty path in '{0}'")]
    EmptyPath(String),

    #[error("Invalid step URI: '{0}' contains whitespace or a trailing ':'")]
    InvalidCharacters(String),

    #[error("Step '{0}' has no version segment")]
    Unversioned(String),
}

/// Version segment of a step URI
///
/// Ordered so that `latest` sorts after every dated version, and dated
/// versions sort after free-form ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepVersion {
    /// Free-form version (e.g., `2023`, `v2`)
    Other(String),
    /// ISO date version (e.g., `2024-01-25`)
    Date(NaiveDate),
    /// The moving `latest` version
    Latest,
}

impl StepVersion {
    fn rank(&self) -> u8 {
        match self {
            StepVersion::Other(_) => 0,
            StepVersion::Date(_) => 1,
            StepVersion::Latest => 2,
        }
    }

    /// Version for a step created on the given day
    pub fn dated(date: NaiveDate) -> Self {
        StepVersion::Date(date)
    }
}

impl Ord for StepVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (StepVersion::Date(a), StepVersion::Date(b)) => a.cmp(b),
            (StepVersion::Other(a), StepVersion::Other(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for StepVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for StepVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepVersion::Other(s) => write!(f, "{}", s),
            StepVersion::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            StepVersion::Latest => write!(f, "latest"),
        }
    }
}

impl FromStr for StepVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "latest" {
            return Ok(StepVersion::Latest);
        }
        Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(StepVersion::Date)
            .unwrap_or_else(|_| StepVersion::Other(s.to_string())))
    }
}

/// A parsed step URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepUri {
    scheme: String,
    segments: Vec<String>,
}

impl StepUri {
    /// Returns the scheme (e.g., `data`, `snapshot`)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the path segments after `://`
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns true for steps built by the ETL (`data://`, `data-private://`)
    pub fn is_data_step(&self) -> bool {
        self.scheme == "data" || self.scheme == "data-private"
    }

    /// Returns the version segment, if the path is long enough to carry one
    pub fn version(&self) -> Option<StepVersion> {
        if self.segments.len() < 3 {
            return None;
        }
        self.segments[self.segments.len() - 2].parse().ok()
    }

    /// Returns the URI with the version segment replaced by `"*"`
    ///
    /// Steps sharing an identity are versions of the same dataset.
    pub fn identity(&self) -> String {
        let mut segments = self.segments.clone();
        if segments.len() >= 3 {
            let idx = segments.len() - 2;
            segments[idx] = "*".to_string();
        }
        format!("{}://{}", self.scheme, segments.join("/"))
    }

    /// Returns a copy of this URI pointing to another version
    pub fn with_version(&self, version: &StepVersion) -> Result<StepUri, StepUriError> {
        if self.segments.len() < 3 {
            return Err(StepUriError::Unversioned(self.to_string()));
        }
        let mut segments = self.segments.clone();
        let idx = segments.len() - 2;
        segments[idx] = version.to_string();
        Ok(StepUri {
            scheme: self.scheme.clone(),
            segments,
        })
    }
}

impl fmt::Display for StepUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.segments.join("/"))
    }
}

impl FromStr for StepUri {
    type Err = StepUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.chars().any(char::is_whitespace) || s.ends_with(':') {
            return Err(StepUriError::InvalidCharacters(s.to_string()));
        }

        let (scheme, path) = s
            .split_once("://")
            .ok_or_else(|| StepUriError::MissingScheme(s.to_string()))?;

        if scheme.is_empty() {
            return Err(StepUriError::MissingScheme(s.to_string()));
        }

        let segments: Vec<String> = path
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(str::to_string)
            .collect();

        if segments.is_empty() {
            return Err(StepUriError::EmptyPath(s.to_string()));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            segments,
        })
    }
}

impl TryFrom<String> for StepUri {
    type Error = StepUriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StepUri> for String {
    fn from(uri: StepUri) -> Self {
        uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_data_step() {
        let uri: StepUri = "data://garden/biodiversity/2024-01-25/cherry_blossom"
            .parse()
            .unwrap();
        assert_eq!(uri.scheme(), "data");
        assert_eq!(uri.segments().len(), 4);
        assert!(uri.is_data_step());
        assert_eq!(
            uri.version(),
            Some(StepVersion::Date(NaiveDate::from_ymd_opt(2024, 1, 25).unwrap()))
        );
    }

    #[test]
    fn parse_snapshot_step() {
        let uri: StepUri = "snapshot://biodiversity/2024-01-25/cherry_blossom.csv"
            .parse()
            .unwrap();
        assert_eq!(uri.scheme(), "snapshot");
        assert!(!uri.is_data_step());
        assert!(matches!(uri.version(), Some(StepVersion::Date(_))));
    }

    #[test]
    fn display_roundtrip() {
        let s = "data-private://meadow/un/latest/population";
        let uri: StepUri = s.parse().unwrap();
        assert_eq!(uri.to_string(), s);
        assert_eq!(uri.version(), Some(StepVersion::Latest));
    }

    #[test]
    fn invalid_uris() {
        assert!(matches!(
            "meadow_a".parse::<StepUri>(),
            Err(StepUriError::MissingScheme(_))
        ));
        assert!(matches!(
            "data://".parse::<StepUri>(),
            Err(StepUriError::EmptyPath(_))
        ));
        assert!(matches!(
            "data://garden/x y".parse::<StepUri>(),
            Err(StepUriError::InvalidCharacters(_))
        ));
        assert!(matches!(
            "data://garden/x:".parse::<StepUri>(),
            Err(StepUriError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn identity_ignores_version() {
        let a: StepUri = "data://garden/x/2023-01-01/y".parse().unwrap();
        let b: StepUri = "data://garden/x/2024-06-30/y".parse().unwrap();
        let c: StepUri = "data://meadow/x/2024-06-30/y".parse().unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity(), "data://garden/x/*/y");
    }

    #[test]
    fn with_version_replaces_segment() {
        let uri: StepUri = "data://garden/x/2023-01-01/y".parse().unwrap();
        let new = uri
            .with_version(&StepVersion::dated(NaiveDate::from_ymd_opt(2024, 2, 3).unwrap()))
            .unwrap();
        assert_eq!(new.to_string(), "data://garden/x/2024-02-03/y");

        let short: StepUri = "github://owner/repo".parse().unwrap();
        assert!(matches!(
            short.with_version(&StepVersion::Latest),
            Err(StepUriError::Unversioned(_))
        ));
    }

    #[test]
    fn version_ordering() {
        let old: StepVersion = "2022-12-31".parse().unwrap();
        let new: StepVersion = "2023-01-01".parse().unwrap();
        let latest: StepVersion = "latest".parse().unwrap();
        let other: StepVersion = "2023".parse().unwrap();

        assert!(old < new);
        assert!(new < latest);
        assert!(other < old);
    }

    #[test]
    fn serde_as_string() {
        let uri: StepUri = "data://garden/x/2023-01-01/y".parse().unwrap();
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, "\"data://garden/x/2023-01-01/y\"");
        let back: StepUri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uri);
    }
}
