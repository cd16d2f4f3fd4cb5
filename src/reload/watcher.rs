//! Per-app source watchers.
//!
//! Each watched app gets its own recursive notify watcher. The callback runs
//! on a notify thread and only forwards the app id to the debounce thread.

use std::path::Path;

use crossbeam::channel::Sender;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::core::AppId;
use crate::registry::sources::is_source_file;
use crate::{debug, log};

/// Messages consumed by the debounce thread.
#[derive(Debug)]
pub(super) enum Signal {
    Changed(AppId),
    Cancel(AppId),
    Clear,
    Shutdown,
}

/// Start a recursive watcher over `dir` reporting changes for `app`.
///
/// The watcher stops when the returned handle is dropped.
pub(super) fn watch_app(app: AppId, dir: &Path, tx: Sender<Signal>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_source_change(&event) => {
            debug!("watch"; "{}: {:?} {:?}", app, event.kind, event.paths);
            let _ = tx.send(Signal::Changed(app.clone()));
        }
        Ok(_) => {}
        Err(e) => log!("watch"; "{}: notify error: {}", app, e),
    })?;
    watcher.watch(dir, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Create, modify (content or rename) or remove touching a source file.
pub(super) fn is_source_change(event: &Event) -> bool {
    let kind_matters = match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        // mtime/atime/chmod noise
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    kind_matters
        && event
            .paths
            .iter()
            .any(|path| !is_temp_file(path) && is_source_file(path))
}

/// Editor artifacts: backups, swap files, dotfiles.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
