//! `hotdesk new`: scaffold an app directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::json;

use crate::log;
use crate::registry::manifest::{MANIFEST_FILE, is_valid_app_id};

const ENTRY_CLASS: &str = "Main";

const MAIN_TEMPLATE: &str = r#"type Main {
  fn CreateWindow(args) {
    let w = window("{title}", 480, 320);
    return w;
  }

  fn Update(dt) {
  }
}
"#;

/// Create `dir` with a manifest and a `Main.hd` entry.
///
/// The id defaults to the directory name, upper-cased. The directory must
/// not exist yet.
pub fn new_app(dir: &Path, id: Option<&str>) -> Result<()> {
    if dir.exists() {
        bail!(
            "Directory '{}' already exists.\n\
             Choose a different name or remove the existing directory.",
            dir.display()
        );
    }

    let id = match id {
        Some(id) => id.trim().to_string(),
        None => default_id(dir),
    };
    if id.is_empty() {
        bail!("cannot derive an app id from '{}', pass --id", dir.display());
    }
    if !is_valid_app_id(&id) {
        bail!("invalid app id '{id}': use letters, digits, '_', '-' and '.'");
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory '{}'", dir.display()))?;

    let manifest = json!({
        "appId": id,
        "name": id,
        "version": "1.0.0",
        "entryClass": ENTRY_CLASS,
        "entryMethod": "CreateWindow",
        "permissions": [],
        "dependencies": [],
    });
    let manifest_path = dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)? + "\n")
        .with_context(|| format!("Failed to write '{}'", manifest_path.display()))?;

    let main_path = dir.join(format!("{ENTRY_CLASS}.hd"));
    fs::write(&main_path, MAIN_TEMPLATE.replace("{title}", &id))
        .with_context(|| format!("Failed to write '{}'", main_path.display()))?;

    log!("new"; "created {} in {}", id, dir.display());
    Ok(())
}

fn default_id(dir: &Path) -> String {
    dir.file_name()
        .map(|name| {
            name.to_string_lossy()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                .collect()
        })
        .unwrap_or_default()
}
