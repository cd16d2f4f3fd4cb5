//! Configuration utility functions.

use std::path::{Path, PathBuf};

/// Find config file by searching upward from current directory
///
/// Starts from cwd and walks up parent directories until finding `config_name`
/// Returns the absolute path to the config file if found
///
/// # Example
/// ```text
/// /home/user/desk/apps/calc/  ← cwd
/// /home/user/desk/hotdesk.toml ← found!
/// ```
pub fn find_config_file(config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(config_name))
        .find(|candidate| candidate.exists())
}

/// Expand `~` and resolve a relative path against `root`.
pub fn expand_path(path: &Path, root: &Path) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
    if expanded.is_relative() {
        root.join(expanded)
    } else {
        expanded
    }
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path() {
        let root = Path::new("/desk");
        assert_eq!(expand_path(Path::new("apps"), root), PathBuf::from("/desk/apps"));
        assert_eq!(expand_path(Path::new("/abs"), root), PathBuf::from("/abs"));

        let home = expand_path(Path::new("~/crashes"), root);
        assert!(!home.to_string_lossy().starts_with('~'));
        assert!(home.ends_with("crashes"));
    }

    #[test]
    fn test_find_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotdesk.toml");
        assert_eq!(find_config_file(&path), None);
        std::fs::write(&path, "").unwrap();
        assert_eq!(find_config_file(&path), Some(path));
    }
}
