//! `hotdesk check`: diagnostics for an app directory.
//!
//! Nothing is registered or watched. The sources go through the compiler in
//! validate mode; when they are clean the unit is compiled once more to
//! confirm the manifest's entry point exists.

use std::path::Path;

use anyhow::{Result, bail};

use crate::compiler::{SourceCompiler, has_errors};
use crate::config::HostConfig;
use crate::registry::WindowFactory;
use crate::registry::manifest::Manifest;
use crate::registry::sources;
use crate::utils::plural::plural_count;
use crate::{debug_do, log};

pub fn check_app(config: &HostConfig, dir: &Path) -> Result<()> {
    let manifest = Manifest::load(dir)?;
    let id = manifest.id();
    let sources = sources::gather(dir)?;
    if sources.is_empty() {
        bail!("no `.{}` source files in `{}`", sources::SOURCE_EXT, dir.display());
    }

    let compiler = SourceCompiler::new(config.host_version());
    let diagnostics = compiler.validate(&sources, Some(&manifest));
    for diagnostic in &diagnostics {
        eprintln!("{diagnostic}");
    }
    if has_errors(&diagnostics) {
        bail!("{} has {}", id, plural_count(diagnostics.iter().filter(|d| d.is_error()).count(), "error"));
    }

    let output = compiler.compile(&sources, id.as_str(), Some(&manifest));
    let Some(unit) = output.unit else {
        bail!("{} did not compile", id);
    };
    WindowFactory::resolve(&id, &unit, &manifest)?;

    debug_do! {
        for name in unit.type_names() {
            log!("check"; "type {}", name);
        }
    }
    log!(
        "check";
        "{} ok: {}, entry `{}.{}`",
        id,
        plural_count(sources.len(), "file"),
        manifest.entry_class,
        manifest.entry_method
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn app(dir: &Path, program: &str) {
        fs::write(
            dir.join("manifest.json"),
            r#"{ "appId": "PAD", "entryClass": "Pad" }"#,
        )
        .unwrap();
        fs::write(dir.join("Pad.hd"), program).unwrap();
    }

    #[test]
    fn test_clean_app_passes() {
        let dir = tempfile::tempdir().unwrap();
        app(dir.path(), "type Pad { fn CreateWindow() { return window(\"Pad\"); } }");
        assert!(check_app(&HostConfig::default(), dir.path()).is_ok());
    }

    #[test]
    fn test_errors_and_missing_entry_fail() {
        let dir = tempfile::tempdir().unwrap();
        app(dir.path(), "type Pad { fn CreateWindow() { return nope(); } }");
        let err = check_app(&HostConfig::default(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("1 error"));

        app(dir.path(), "type Pad { fn Open() { return window(\"Pad\"); } }");
        let err = check_app(&HostConfig::default(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("Pad.CreateWindow"));
    }
}
