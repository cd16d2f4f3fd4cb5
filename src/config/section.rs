//! Configuration sections of `hotdesk.toml`.

use std::path::PathBuf;

use serde::Deserialize;

use super::{ConfigDiagnostics, FieldPath};
use crate::core::Priority;
use crate::reload::DEBOUNCE_MS;

/// Longest accepted host tick.
const MAX_TICK_MS: u64 = 1000;

// ============================================================================
// [runtime]
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Root holding one directory per app.
    pub apps_dir: PathBuf,
    /// Version reported to `minHostVersion` checks. Defaults to the crate
    /// version.
    pub host_version: Option<String>,
    /// Compile into discardable arenas so replaced generations are freed.
    pub releasable_units: bool,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            apps_dir: "apps".into(),
            host_version: None,
            releasable_units: true,
        }
    }
}

impl RuntimeSection {
    const HOST_VERSION: FieldPath = FieldPath::new("runtime.host_version");

    pub fn host_version(&self) -> &str {
        self.host_version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"))
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.host_version().trim().is_empty() {
            diag.error_with_hint(Self::HOST_VERSION, "must not be empty", "remove it to use the built-in version");
        }
    }
}

// ============================================================================
// [reload]
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReloadSection {
    pub enable: bool,
    pub debounce_ms: u64,
}

impl Default for ReloadSection {
    fn default() -> Self {
        Self {
            enable: true,
            debounce_ms: DEBOUNCE_MS,
        }
    }
}

impl ReloadSection {
    const DEBOUNCE_MS: FieldPath = FieldPath::new("reload.debounce_ms");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.debounce_ms == 0 {
            diag.error(Self::DEBOUNCE_MS, "must be greater than 0");
        }
    }
}

// ============================================================================
// [scheduler]
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub tick_ms: u64,
    pub default_priority: Priority,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            default_priority: Priority::Normal,
        }
    }
}

impl SchedulerSection {
    const TICK_MS: FieldPath = FieldPath::new("scheduler.tick_ms");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.tick_ms == 0 {
            diag.error(Self::TICK_MS, "must be greater than 0");
        } else if self.tick_ms > MAX_TICK_MS {
            diag.error_with_hint(
                Self::TICK_MS,
                format!("{} ms is longer than {} ms", self.tick_ms, MAX_TICK_MS),
                "16 gives roughly 60 ticks per second",
            );
        }
    }
}

// ============================================================================
// [crash]
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrashSection {
    /// Report directory, `~` is expanded.
    pub dir: PathBuf,
}

impl Default for CrashSection {
    fn default() -> Self {
        Self {
            dir: "~/.hotdesk/crashes".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(RuntimeSection::default().apps_dir, PathBuf::from("apps"));
        assert_eq!(RuntimeSection::default().host_version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(ReloadSection::default().debounce_ms, 300);
        assert_eq!(SchedulerSection::default().default_priority, Priority::Normal);
    }

    #[test]
    fn test_validation() {
        let mut diag = ConfigDiagnostics::new();
        ReloadSection { enable: true, debounce_ms: 0 }.validate(&mut diag);
        SchedulerSection { tick_ms: 5000, ..Default::default() }.validate(&mut diag);
        RuntimeSection { host_version: Some(" ".into()), ..Default::default() }.validate(&mut diag);

        let fields: Vec<_> = diag.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["reload.debounce_ms", "scheduler.tick_ms", "runtime.host_version"]);
    }
}
