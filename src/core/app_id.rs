//! Case-insensitive application identifier.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Application identifier from a manifest.
///
/// Keeps the manifest spelling for display and compares case-insensitively,
/// so `calc`, `Calc` and `CALC` name the same registry entry.
#[derive(Debug, Clone)]
pub struct AppId {
    display: String,
    key: String,
}

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        let display = id.into().trim().to_string();
        let key = display.to_ascii_lowercase();
        Self { display, key }
    }

    /// Manifest spelling.
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Normalized lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// Check whether a compiled unit name belongs to this app.
    ///
    /// Matches the bare id and any `<id>_<suffix>` generation name, but not
    /// ids that merely share a prefix (`CALCULATOR` is not `CALC`).
    pub fn owns_unit(&self, unit_name: &str) -> bool {
        if self.key.is_empty() {
            return false;
        }
        let (Some(head), Some(tail)) = (
            unit_name.get(..self.key.len()),
            unit_name.get(self.key.len()..),
        ) else {
            return false;
        };
        head.eq_ignore_ascii_case(&self.key) && (tail.is_empty() || tail.starts_with('_'))
    }
}

impl PartialEq for AppId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for AppId {}

impl Hash for AppId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<&str> for AppId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
