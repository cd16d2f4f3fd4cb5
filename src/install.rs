//! Install and uninstall of app directories.
//!
//! Install copies an app directory into the apps root and loads it.
//! Uninstall terminates the app's processes, unregisters it (which stops
//! watching) and deletes its directory. Both hold the app's operation lock,
//! so a hot reload of the same app waits for the next drain.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{AppId, OperationLocks};
use crate::error::InstallError;
use crate::process::ProcessScheduler;
use crate::registry::AppRegistry;
use crate::registry::manifest::Manifest;
use crate::utils::plural::plural_count;
use crate::{debug, log};

/// Copy `source` into `apps_dir` and load it.
///
/// Files stay in place when the copied app fails to compile: it remains
/// registered and watched, so fixing the sources reloads it.
pub fn install(
    apps_dir: &Path,
    source: &Path,
    registry: &mut AppRegistry,
    locks: &OperationLocks,
) -> Result<AppId, InstallError> {
    let manifest =
        Manifest::load(source).map_err(|e| InstallError::NotAnApp(source.to_path_buf(), e))?;
    let id = manifest.id();

    let Some(_guard) = locks.try_lock(&id) else {
        return Err(InstallError::Busy(id));
    };

    let dir_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.key().to_string());
    let target = apps_dir.join(dir_name);
    if registry.is_registered(&id) || target.exists() {
        return Err(InstallError::AlreadyInstalled(id));
    }

    if let Err(e) = copy_dir(source, &target) {
        // leave no half-copied app behind
        let _ = fs::remove_dir_all(&target);
        return Err(e);
    }
    debug!("install"; "copied {} -> {}", source.display(), target.display());

    registry
        .try_load(&target)
        .map_err(|e| InstallError::LoadFailed(id.clone(), e))?;
    log!("install"; "{} installed at {}", id, target.display());
    Ok(id)
}

/// Remove an installed app. Returns the directory it was loaded from.
///
/// The directory is deleted only when it lives under `apps_dir`; apps
/// loaded from elsewhere are just unregistered.
pub fn uninstall(
    apps_dir: &Path,
    id: &AppId,
    registry: &mut AppRegistry,
    scheduler: &mut ProcessScheduler,
    locks: &OperationLocks,
) -> Result<PathBuf, InstallError> {
    let Some(_guard) = locks.try_lock(id) else {
        return Err(InstallError::Busy(id.clone()));
    };
    if !registry.is_registered(id) {
        return Err(InstallError::NotInstalled(id.clone()));
    }

    let stopped = scheduler.terminate_app(id);
    if stopped > 0 {
        debug!("install"; "stopped {} of {}", plural_count(stopped, "instance"), id);
    }
    let Some(dir) = registry.unregister(id) else {
        return Err(InstallError::NotInstalled(id.clone()));
    };

    if dir.starts_with(apps_dir) {
        fs::remove_dir_all(&dir).map_err(|e| InstallError::Remove(dir.clone(), e))?;
        log!("install"; "{} uninstalled, removed {}", id, dir.display());
    } else {
        log!("install"; "{} unregistered, kept {}", id, dir.display());
    }
    Ok(dir)
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), InstallError> {
    let copy_error = |source| InstallError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    fs::create_dir_all(to).map_err(copy_error)?;
    for entry in fs::read_dir(from).map_err(copy_error)? {
        let entry = entry.map_err(copy_error)?;
        let entry_path = entry.path();
        let dest_path = to.join(entry.file_name());

        if entry_path.is_dir() {
            copy_dir(&entry_path, &dest_path)?;
        } else {
            fs::copy(&entry_path, &dest_path).map_err(|source| InstallError::Copy {
                from: entry_path.clone(),
                to: dest_path.clone(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::compiler::SourceCompiler;
    use crate::core::Priority;
    use crate::registry::NoWatch;

    const PROGRAM: &str = r#"
type Clock.App {
    fn CreateWindow() { return window("Clock"); }
}
"#;

    fn write_source(root: &Path) -> PathBuf {
        let dir = root.join("clock");
        fs::create_dir_all(dir.join("ui")).unwrap();
        fs::write(
            dir.join("manifest.json"),
            r#"{ "appId": "CLOCK", "entryClass": "Clock.App" }"#,
        )
        .unwrap();
        fs::write(dir.join("ui/App.hd"), PROGRAM).unwrap();
        dir
    }

    fn registry() -> AppRegistry {
        AppRegistry::new(Arc::new(SourceCompiler::new("1.2.0")), Arc::new(NoWatch), true)
    }

    #[test]
    fn test_install_copies_and_loads() {
        let staging = tempfile::tempdir().unwrap();
        let apps = tempfile::tempdir().unwrap();
        let source = write_source(staging.path());
        let mut registry = registry();
        let locks = OperationLocks::new();

        let id = install(apps.path(), &source, &mut registry, &locks).unwrap();
        assert_eq!(id, AppId::from("clock"));
        assert!(apps.path().join("clock/ui/App.hd").is_file());
        assert!(registry.is_loaded(&id));
        assert_eq!(registry.directory_of(&id), Some(apps.path().join("clock").as_path()));

        let again = install(apps.path(), &source, &mut registry, &locks);
        assert!(matches!(again, Err(InstallError::AlreadyInstalled(_))));
    }

    #[test]
    fn test_install_rejects_non_app_and_busy() {
        let staging = tempfile::tempdir().unwrap();
        let apps = tempfile::tempdir().unwrap();
        let mut registry = registry();
        let locks = OperationLocks::new();

        let err = install(apps.path(), staging.path(), &mut registry, &locks).unwrap_err();
        assert!(matches!(err, InstallError::NotAnApp(..)));

        let source = write_source(staging.path());
        let _guard = locks.lock(&AppId::from("CLOCK"));
        let err = install(apps.path(), &source, &mut registry, &locks).unwrap_err();
        assert!(matches!(err, InstallError::Busy(_)));
        assert!(!apps.path().join("clock").exists());
    }

    #[test]
    fn test_install_broken_app_stays_registered() {
        let staging = tempfile::tempdir().unwrap();
        let apps = tempfile::tempdir().unwrap();
        let source = write_source(staging.path());
        fs::write(source.join("ui/App.hd"), "type Clock.App {").unwrap();
        let mut registry = registry();

        let err = install(apps.path(), &source, &mut registry, &OperationLocks::new()).unwrap_err();
        assert!(matches!(err, InstallError::LoadFailed(..)));
        assert!(registry.is_registered(&AppId::from("CLOCK")));
        assert!(!registry.is_loaded(&AppId::from("CLOCK")));
    }

    #[test]
    fn test_uninstall_stops_and_removes() {
        let staging = tempfile::tempdir().unwrap();
        let apps = tempfile::tempdir().unwrap();
        let source = write_source(staging.path());
        let mut registry = registry();
        let locks = OperationLocks::new();
        let id = install(apps.path(), &source, &mut registry, &locks).unwrap();

        let mut scheduler = ProcessScheduler::new(Priority::Normal);
        let pid = scheduler.start(id.clone(), None);
        let window = registry.create_window(&id, &[]).unwrap().unwrap();
        scheduler.open_window(pid, window);

        let dir = uninstall(apps.path(), &id, &mut registry, &mut scheduler, &locks).unwrap();
        assert!(!dir.exists());
        assert!(scheduler.process(pid).is_none());
        assert!(!registry.is_registered(&id));

        let err = uninstall(apps.path(), &id, &mut registry, &mut scheduler, &locks).unwrap_err();
        assert!(matches!(err, InstallError::NotInstalled(_)));
    }

    #[test]
    fn test_uninstall_keeps_foreign_directory() {
        let staging = tempfile::tempdir().unwrap();
        let apps = tempfile::tempdir().unwrap();
        let source = write_source(staging.path());
        let mut registry = registry();
        assert!(registry.load(&source));

        let id = AppId::from("CLOCK");
        let mut scheduler = ProcessScheduler::default();
        let dir = uninstall(apps.path(), &id, &mut registry, &mut scheduler, &OperationLocks::new()).unwrap();
        assert_eq!(dir, source);
        assert!(source.is_dir());
    }
}
