//! Host version gate.
//!
//! Manifests may declare a minimum host version. Versions are compared as
//! `major.minor.patch` after normalization:
//!
//! - leading `v` / `V` marker is stripped (`v1.2` → `1.2`)
//! - any trailing qualifier after `-` or `+` is stripped (`1.2.0-beta` → `1.2.0`)
//! - missing segments default to 0 (`1.0` → `1.0.0`)
//! - an empty or absent requirement means `1.0.0`

use std::cmp::Ordering;
use std::fmt;

/// Requirement assumed when a manifest does not declare one.
pub const DEFAULT_REQUIREMENT: &str = "1.0.0";

/// Normalized `major.minor.patch` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse leniently; never fails.
    ///
    /// Non-numeric segments count as 0, and so does anything past the
    /// third segment's digits.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix(['v', 'V'])
            .unwrap_or(trimmed);
        let core = trimmed
            .split(['-', '+'])
            .next()
            .unwrap_or_default();

        let mut parts = core.split('.').map(leading_number);
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }

    /// Parse a requirement, treating empty / absent as [`DEFAULT_REQUIREMENT`].
    pub fn requirement(input: Option<&str>) -> Self {
        match input.map(str::trim) {
            Some(s) if !s.is_empty() => Self::parse(s),
            _ => Self::parse(DEFAULT_REQUIREMENT),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn leading_number(segment: &str) -> u64 {
    let digits: String = segment
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

/// Check whether a host satisfies a manifest's minimum version.
pub fn is_compatible(required: Option<&str>, host: &str) -> bool {
    Version::requirement(required).cmp(&Version::parse(host)) != Ordering::Greater
}
