//! App registry.
//!
//! Maps each app id to its source directory, active generation and window
//! factory. Owned and mutated only by the owner thread.
//!
//! # Load
//!
//! ```text
//! manifest ─▶ record directory ─▶ gather .hd ─▶ watch ─▶ compile ─▶ factory
//!                                    │ none                 │ failure
//!                                    ▼                      ▼
//!                              forget directory     stay watched, no generation
//! ```
//!
//! A reload compiles under a fresh unit name and swaps the generation only
//! on success. The replaced generation stays alive for as long as windows
//! created from it remain open.

pub mod manifest;
pub mod sources;
mod window;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use rustc_hash::FxHashMap;

use crate::compiler::{CompiledUnit, Diagnostic, Fault, SourceCompiler, SourceText, UnitArena, code};
use crate::core::AppId;
use crate::error::LoadError;
use crate::process::{AppWindow, ProcessScheduler};
use crate::utils::hash;
use crate::utils::plural::plural_count;
use crate::{debug, log};

use manifest::Manifest;

pub use window::{ScriptWindow, WindowFactory};

/// Narrow view of the hot-reload coordinator used at load time.
pub trait SourceWatch {
    fn start_watching(&self, app: &AppId, dir: &Path);
    fn stop_watching(&self, app: &AppId);
}

/// Watch implementation for hosts without hot reload.
#[derive(Debug, Default)]
pub struct NoWatch;

impl SourceWatch for NoWatch {
    fn start_watching(&self, _: &AppId, _: &Path) {}
    fn stop_watching(&self, _: &AppId) {}
}

/// One compiled generation of an app.
struct Generation {
    unit: Arc<CompiledUnit>,
    factory: WindowFactory,
    /// Owner of the unit when loaded as releasable.
    arena: Option<UnitArena>,
}

impl Generation {
    /// Let go of the registry's hold, discarding the arena if any.
    ///
    /// The returned handle upgrades only while windows still use the unit.
    fn retire(self) -> Weak<CompiledUnit> {
        let handle = Arc::downgrade(&self.unit);
        if let Some(arena) = self.arena {
            arena.discard();
        }
        handle
    }
}

struct RegisteredApp {
    directory: PathBuf,
    manifest: Manifest,
    generation: Option<Generation>,
}

/// Result of a reload: success flag plus compiler output.
#[derive(Debug, Default)]
pub struct ReloadOutcome {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReloadOutcome {
    fn failed(error: &LoadError) -> Self {
        let diagnostics = match error.diagnostics() {
            [] => vec![Diagnostic::error(code::MANIFEST, error.to_string())],
            diags => diags.to_vec(),
        };
        Self {
            success: false,
            diagnostics,
        }
    }
}

pub struct AppRegistry {
    compiler: Arc<SourceCompiler>,
    watch: Arc<dyn SourceWatch>,
    releasable: bool,
    apps: FxHashMap<AppId, RegisteredApp>,
    /// Generations replaced by reload or unregister.
    retired: Vec<Weak<CompiledUnit>>,
    reloads: u64,
}

impl AppRegistry {
    pub fn new(compiler: Arc<SourceCompiler>, watch: Arc<dyn SourceWatch>, releasable: bool) -> Self {
        Self {
            compiler,
            watch,
            releasable,
            apps: FxHashMap::default(),
            retired: Vec::new(),
            reloads: 0,
        }
    }

    pub fn compiler(&self) -> &Arc<SourceCompiler> {
        &self.compiler
    }

    // ------------------------------------------------------------------
    // load
    // ------------------------------------------------------------------

    /// Load the app in `dir`. Failures are logged.
    pub fn load(&mut self, dir: &Path) -> bool {
        match self.try_load(dir) {
            Ok(id) => {
                debug!("load"; "{} ready", id);
                true
            }
            Err(e) => {
                log!("load"; "{}", e);
                false
            }
        }
    }

    /// Load the app in `dir`, returning the reason on failure.
    pub fn try_load(&mut self, dir: &Path) -> Result<AppId, LoadError> {
        let manifest = Manifest::load(dir)?;
        let id = manifest.id();

        if self.is_loaded(&id) {
            debug!("load"; "{} already loaded", id);
            return Ok(id);
        }

        self.apps.insert(
            id.clone(),
            RegisteredApp {
                directory: dir.to_path_buf(),
                manifest: manifest.clone(),
                generation: None,
            },
        );

        let sources = match sources::gather(dir) {
            Ok(sources) if !sources.is_empty() => sources,
            result => {
                self.apps.remove(&id);
                return Err(match result {
                    Err(e) => LoadError::Io(dir.to_path_buf(), e),
                    Ok(_) => LoadError::NoSources(dir.to_path_buf()),
                });
            }
        };

        self.watch.start_watching(&id, dir);

        // first generation takes the bare id unless a live unit still holds it
        let unit_name = if self.compiler.is_name_live(id.as_str()) {
            self.next_unit_name(&id, &sources)
        } else {
            id.as_str().to_string()
        };

        let (generation, _) = self.build(&id, &manifest, &sources, &unit_name)?;
        log!("load"; "{} ({} files)", id, sources.len());
        if let Some(app) = self.apps.get_mut(&id) {
            app.generation = Some(generation);
        }
        Ok(id)
    }

    /// Load every immediate subdirectory of `root`. Returns how many loaded.
    pub fn load_all(&mut self, root: &Path) -> usize {
        let mut dirs: Vec<_> = match std::fs::read_dir(root) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect(),
            Err(e) => {
                log!("load"; "cannot read apps directory {}: {}", root.display(), e);
                return 0;
            }
        };
        dirs.sort();
        dirs.iter().filter(|dir| self.load(dir)).count()
    }

    fn build(
        &self,
        id: &AppId,
        manifest: &Manifest,
        sources: &[SourceText],
        unit_name: &str,
    ) -> Result<(Generation, Vec<Diagnostic>), LoadError> {
        let arena = self.releasable.then(UnitArena::new);
        let output = match &arena {
            Some(arena) => self.compiler.compile_into(arena, sources, unit_name, Some(manifest)),
            None => self.compiler.compile(sources, unit_name, Some(manifest)),
        };

        let Some(unit) = output.unit else {
            return Err(LoadError::Compile {
                app: id.clone(),
                diagnostics: output.diagnostics,
            });
        };
        for warning in &output.diagnostics {
            log!("compile"; "{}", warning);
        }

        let factory = WindowFactory::resolve(id, &unit, manifest)?;
        let generation = Generation {
            unit,
            factory,
            arena,
        };
        Ok((generation, output.diagnostics))
    }

    /// Fresh `<id>_<8 hex>` name for a new generation.
    fn next_unit_name(&mut self, id: &AppId, sources: &[SourceText]) -> String {
        loop {
            self.reloads += 1;
            let mut seed = format!("{}:{}", id.key(), self.reloads);
            for source in sources {
                seed.push_str(&source.path);
                seed.push_str(&source.text);
            }
            let name = format!("{}_{}", id, hash::fingerprint(&seed));
            if !self.compiler.is_name_live(&name) {
                return name;
            }
        }
    }

    // ------------------------------------------------------------------
    // reload
    // ------------------------------------------------------------------

    /// Recompile an app from its directory.
    ///
    /// Running instances are terminated first. On failure the previous
    /// generation and factory stay in place.
    pub fn reload(&mut self, id: &AppId, scheduler: &mut ProcessScheduler) -> ReloadOutcome {
        match self.try_reload(id, scheduler) {
            Ok(diagnostics) => ReloadOutcome {
                success: true,
                diagnostics,
            },
            Err(e) => {
                log!("reload"; "{}", e);
                ReloadOutcome::failed(&e)
            }
        }
    }

    fn try_reload(&mut self, id: &AppId, scheduler: &mut ProcessScheduler) -> Result<Vec<Diagnostic>, LoadError> {
        let Some(dir) = self.directory_of(id).map(Path::to_path_buf) else {
            return Err(LoadError::NotRegistered(id.clone()));
        };

        let stopped = scheduler.terminate_app(id);
        if stopped > 0 {
            debug!("reload"; "stopped {} of {}", plural_count(stopped, "instance"), id);
        }

        let manifest = Manifest::load(&dir)?;
        if manifest.id() != *id {
            return Err(LoadError::IdChanged {
                expected: id.clone(),
                found: manifest.id(),
            });
        }

        let sources = sources::gather(&dir).map_err(|e| LoadError::Io(dir.clone(), e))?;
        if sources.is_empty() {
            return Err(LoadError::NoSources(dir));
        }

        let unit_name = self.next_unit_name(id, &sources);
        let (generation, warnings) = self.build(id, &manifest, &sources, &unit_name)?;

        let Some(app) = self.apps.get_mut(id) else {
            return Err(LoadError::NotRegistered(id.clone()));
        };
        app.manifest = manifest;
        if let Some(old) = app.generation.replace(generation) {
            self.retired.push(old.retire());
        }
        self.prune_retired();

        log!("reload"; "{} -> {}", id, unit_name);
        Ok(warnings)
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    /// Registered and holding a usable generation.
    pub fn is_loaded(&self, id: &AppId) -> bool {
        self.apps.get(id).is_some_and(|app| app.generation.is_some())
    }

    pub fn is_registered(&self, id: &AppId) -> bool {
        self.apps.contains_key(id)
    }

    pub fn directory_of(&self, id: &AppId) -> Option<&Path> {
        self.apps.get(id).map(|app| app.directory.as_path())
    }

    pub fn manifest_of(&self, id: &AppId) -> Option<&Manifest> {
        self.apps.get(id).map(|app| &app.manifest)
    }

    pub fn factory(&self, id: &AppId) -> Option<&WindowFactory> {
        self.apps.get(id)?.generation.as_ref().map(|g| &g.factory)
    }

    /// Name of the active unit.
    pub fn unit_name(&self, id: &AppId) -> Option<&str> {
        self.apps.get(id)?.generation.as_ref().map(|g| g.unit.name())
    }

    /// Registered ids in a stable order.
    pub fn registered_ids(&self) -> Vec<AppId> {
        let mut ids: Vec<_> = self.apps.keys().cloned().collect();
        ids.sort_by(|a, b| a.key().cmp(b.key()));
        ids
    }

    /// Create a window through the app's factory.
    ///
    /// `Ok(None)` covers an unknown app, an app without a generation and an
    /// entry that returned something other than a window.
    pub fn create_window(&self, id: &AppId, args: &[String]) -> Result<Option<Box<dyn AppWindow>>, Fault> {
        let Some(factory) = self.factory(id) else {
            log!("launch"; "{} is not loaded", id);
            return Ok(None);
        };
        Ok(factory
            .create(args)?
            .map(|window| Box::new(window) as Box<dyn AppWindow>))
    }

    /// Forget an app entirely. Returns its directory.
    pub fn unregister(&mut self, id: &AppId) -> Option<PathBuf> {
        let app = self.apps.remove(id)?;
        self.watch.stop_watching(id);
        if let Some(generation) = app.generation {
            self.retired.push(generation.retire());
        }
        self.prune_retired();
        Some(app.directory)
    }

    /// Replaced generations that some window still keeps alive.
    pub fn retired_alive(&mut self) -> usize {
        self.prune_retired();
        self.retired.len()
    }

    fn prune_retired(&mut self) {
        self.retired.retain(|unit| unit.strong_count() > 0);
    }
}
