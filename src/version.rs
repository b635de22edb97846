use crate::error::{Result, WizError};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Sentinel used when a definition does not declare a version.
pub const UNKNOWN_VALUE: &str = "unknown";

/// Definition version: a concrete, sortable version or the `unknown` sentinel.
///
/// `Unknown` is incomparable to concrete versions; a registry entry must not
/// mix both forms under one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Version {
    Concrete(semver::Version),
    Unknown,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed == UNKNOWN_VALUE {
            return Ok(Version::Unknown);
        }
        parse_relaxed(trimmed)
            .map(Version::Concrete)
            .ok_or_else(|| WizError::InvalidVersion(input.to_string()))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Version::Unknown)
    }

    pub fn as_concrete(&self) -> Option<&semver::Version> {
        match self {
            Version::Concrete(version) => Some(version),
            Version::Unknown => None,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::Unknown
    }
}

impl PartialOrd for Version {
    /// Concrete versions follow semver order; `Unknown` only compares to
    /// itself.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Version::Concrete(left), Version::Concrete(right)) => Some(left.cmp(right)),
            (Version::Unknown, Version::Unknown) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Concrete(version) => write!(f, "{version}"),
            Version::Unknown => write!(f, "{UNKNOWN_VALUE}"),
        }
    }
}

impl FromStr for Version {
    type Err = WizError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(de::Error::custom)
    }
}

/// Parse a version, accepting shorthand like `1`, `1.2` or `1.2.3rc1`.
///
/// Missing components are zero-filled and a trailing alphanumeric suffix
/// becomes a pre-release segment, so that `1.2rc1` orders before `1.2`.
pub fn parse_relaxed(input: &str) -> Option<semver::Version> {
    if let Ok(version) = semver::Version::parse(input) {
        return Some(version);
    }

    let mut prefix = String::new();
    let mut suffix = String::new();
    for (idx, ch) in input.char_indices() {
        if ch.is_ascii_digit() || ch == '.' {
            prefix.push(ch);
        } else {
            suffix = input[idx..].to_string();
            break;
        }
    }
    if prefix.is_empty() {
        return None;
    }

    let mut parts: Vec<&str> = prefix
        .trim_matches('.')
        .split('.')
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    let prefix_norm = parts.join(".");
    let suffix_norm = suffix
        .trim_start_matches(|c| c == '-' || c == '_' || c == '.')
        .to_ascii_lowercase();
    let candidate = if suffix_norm.is_empty() {
        prefix_norm
    } else {
        format!("{prefix_norm}-{suffix_norm}")
    };
    semver::Version::parse(&candidate).ok()
}
