//! App manifest (`manifest.json`).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::core::AppId;

/// Manifest file name at the root of every app directory.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found: `{}`", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read manifest `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid manifest `{}`: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("manifest `{}` has an empty `{}`", .0.display(), .1)]
    EmptyField(PathBuf, &'static str),

    #[error("manifest `{}` declares appId `{}`; use letters, digits, `_`, `-` and `.`", .0.display(), .1)]
    InvalidId(PathBuf, String),
}

/// Check that `id` is usable as a single path component.
///
/// Ids name report and unit directories, so they may not start with `.`
/// or contain separators.
pub fn is_valid_app_id(id: &str) -> bool {
    let mut chars = id.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Parsed app manifest. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub app_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "defaults::icon")]
    pub icon: String,
    #[serde(default = "defaults::version")]
    pub version: String,
    #[serde(default)]
    pub entry_class: String,
    #[serde(default = "defaults::entry_method")]
    pub entry_method: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Optional libraries to link.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub min_host_version: Option<String>,
}

mod defaults {
    pub fn icon() -> String {
        "icon.png".into()
    }

    pub fn version() -> String {
        "1.0.0".into()
    }

    pub fn entry_method() -> String {
        "CreateWindow".into()
    }
}

impl Manifest {
    /// Read and validate `<dir>/manifest.json`.
    pub fn load(dir: &Path) -> Result<Self, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(ManifestError::NotFound(path));
        }
        let text = std::fs::read_to_string(&path).map_err(|e| ManifestError::Io(path.clone(), e))?;
        Self::parse(&text, &path)
    }

    /// Parse manifest text; `path` is used for error messages only.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ManifestError> {
        let mut manifest: Self =
            serde_json::from_str(text).map_err(|e| ManifestError::Parse(path.to_path_buf(), e))?;

        manifest.app_id = manifest.app_id.trim().to_string();
        manifest.entry_class = manifest.entry_class.trim().to_string();

        if manifest.app_id.is_empty() {
            return Err(ManifestError::EmptyField(path.to_path_buf(), "appId"));
        }
        if !is_valid_app_id(&manifest.app_id) {
            return Err(ManifestError::InvalidId(path.to_path_buf(), manifest.app_id));
        }
        if manifest.entry_class.is_empty() {
            return Err(ManifestError::EmptyField(path.to_path_buf(), "entryClass"));
        }
        if manifest.name.trim().is_empty() {
            manifest.name = manifest.app_id.clone();
        }
        Ok(manifest)
    }

    pub fn id(&self) -> AppId {
        AppId::from(self.app_id.as_str())
    }
}
