//! Host configuration from `hotdesk.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section.rs   # [runtime] [reload] [scheduler] [crash]
//! ├── types/       # ConfigError, FieldPath, ConfigHandle
//! ├── util.rs      # config discovery, path expansion
//! └── mod.rs       # HostConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section       | Purpose                                         |
//! |---------------|-------------------------------------------------|
//! | `[runtime]`   | Apps root, host version, releasable units       |
//! | `[reload]`    | Hot reload switch and debounce delay            |
//! | `[scheduler]` | Tick length and default process priority        |
//! | `[crash]`     | Crash report directory                          |
//!
//! Every field is optional. Without a config file the defaults apply,
//! rooted at the current directory.

mod section;
mod types;
mod util;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::Priority;
use crate::log;
use crate::utils::path::normalize_path;

pub use section::{CrashSection, ReloadSection, RuntimeSection, SchedulerSection};
pub use types::{ConfigDiagnostics, ConfigError, ConfigHandle, FieldPath};
use util::{expand_path, find_config_file};

pub const CONFIG_FILE: &str = "hotdesk.toml";

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub apps_dir: Option<PathBuf>,
    pub reload: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub tick_ms: Option<u64>,
    pub default_priority: Option<Priority>,
    pub crash_dir: Option<PathBuf>,
}

// ============================================================================
// root configuration
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    /// Absolute path to the config file, which may not exist
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory relative paths resolve against
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(skip)]
    pub overrides: ConfigOverrides,

    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub reload: ReloadSection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub crash: CrashSection,
}

impl HostConfig {
    /// Load the config at `path`, or search upward from cwd for
    /// `hotdesk.toml` when no path is given.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => match find_config_file(Path::new(CONFIG_FILE)) {
                Some(found) => Self::from_path(&found)?,
                None => Self::unconfigured(),
            },
        };

        config.overrides = overrides;
        config.apply_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults rooted at the current directory.
    fn unconfigured() -> Self {
        let root = normalize_path(Path::new("."));
        let mut config = Self {
            config_path: root.join(CONFIG_FILE),
            ..Self::default()
        };
        config.finalize(&root);
        config
    }

    /// Parse configuration from a TOML string, paths left as written.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse `path`, reporting unknown fields.
    pub(crate) fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (mut config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.config_path = normalize_path(path);
        let root = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.finalize(&root);
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        log!("warning"; "unknown fields in {}, ignoring:", path.display());
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    fn finalize(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        self.runtime.apps_dir = expand_path(&self.runtime.apps_dir, root);
        self.crash.dir = expand_path(&self.crash.dir, root);
    }

    // ========================================================================
    // cli overrides
    // ========================================================================

    /// Apply `self.overrides` on top of the file values.
    pub(crate) fn apply_overrides(&mut self) {
        let overrides = self.overrides.clone();
        let cwd = normalize_path(Path::new("."));

        if let Some(dir) = &overrides.apps_dir {
            self.runtime.apps_dir = expand_path(dir, &cwd);
        }
        if let Some(dir) = &overrides.crash_dir {
            self.crash.dir = expand_path(dir, &cwd);
        }
        Self::update_option(&mut self.reload.enable, overrides.reload.as_ref());
        Self::update_option(&mut self.reload.debounce_ms, overrides.debounce_ms.as_ref());
        Self::update_option(&mut self.scheduler.tick_ms, overrides.tick_ms.as_ref());
        Self::update_option(
            &mut self.scheduler.default_priority,
            overrides.default_priority.as_ref(),
        );
    }

    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // accessors
    // ========================================================================

    pub fn host_version(&self) -> &str {
        self.runtime.host_version()
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.reload.debounce_ms)
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        self.runtime.validate(&mut diag);
        self.reload.validate(&mut diag);
        self.scheduler.validate(&mut diag);
        diag.into_result().map_err(ConfigError::Diagnostics)
    }
}

// ============================================================================
// tests
// ============================================================================
