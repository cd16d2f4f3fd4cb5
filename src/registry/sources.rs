//! Source discovery for app directories.

use std::io;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use crate::compiler::SourceText;
use crate::utils::path::relative_key;

/// Extension of app source files.
pub const SOURCE_EXT: &str = "hd";

pub fn is_source_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SOURCE_EXT)
}

/// Every `.hd` file under `dir`, sorted by path.
pub fn source_files(dir: &Path) -> Vec<PathBuf> {
    // the root itself may be hidden, so hidden entries are filtered below it
    let mut files: Vec<_> = WalkDir::new(dir)
        .skip_hidden(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|path| is_source_file(path) && !is_hidden_below(path, dir))
        .collect();
    files.sort();
    files
}

fn is_hidden_below(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Read every source file under `dir`, keyed by its path relative to `dir`.
pub fn gather(dir: &Path) -> io::Result<Vec<SourceText>> {
    source_files(dir)
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path)?;
            Ok(SourceText::new(relative_key(&path, dir), text))
        })
        .collect()
}
