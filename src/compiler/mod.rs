//! Source compilation for app programs.
//!
//! Turns a set of named `.hd` source texts into an executable
//! [`CompiledUnit`] or a list of diagnostics. Compilation never panics or
//! errors outward: every failure is reported as a [`Diagnostic`].
//!
//! Pipeline: version gate → lex/parse each file → link reference sets →
//! resolve and check → claim the unit name → hand the unit to its owner.

pub mod ast;
pub mod diagnostic;
pub mod fault;
pub mod interp;
pub mod lexer;
pub mod library;
pub mod parser;
pub mod resolve;
pub mod unit;
pub mod value;
pub mod version;


use std::sync::{Arc, Weak};

use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::registry::manifest::Manifest;
use crate::{debug, log};

pub use diagnostic::{Diagnostic, code, has_errors, render};
pub use fault::{Fault, FaultKind, Frame};
pub use interp::{ExecEnv, WindowState};
pub use library::ReferenceSet;
pub use unit::{CompiledUnit, EntryPoint, UnitArena};
pub use value::{Value, WindowSpec};

/// One source file handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    /// Path relative to the app root, used in diagnostics.
    pub path: String,
    pub text: String,
}

impl SourceText {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Result of a compile request.
#[derive(Debug, Default)]
pub struct CompileOutput {
    pub unit: Option<Arc<CompiledUnit>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutput {
    fn rejected(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            unit: None,
            diagnostics,
        }
    }

    pub fn is_success(&self) -> bool {
        self.unit.is_some()
    }
}

/// Where a successfully compiled unit is kept.
enum Strategy<'a> {
    /// Kept by the compiler for the life of the host.
    Resident,
    /// Held by a caller-provided arena.
    Releasable(&'a UnitArena),
    /// Discarded after checking.
    Validate,
}

/// Compiles app sources into units.
pub struct SourceCompiler {
    references: ReferenceSet,
    host_version: String,
    /// Unit names in use, keyed case-insensitively.
    live: Mutex<FxHashMap<String, Weak<CompiledUnit>>>,
    resident: Mutex<Vec<Arc<CompiledUnit>>>,
}

impl SourceCompiler {
    pub fn new(host_version: impl Into<String>) -> Self {
        Self::with_references(ReferenceSet::default(), host_version)
    }

    pub fn with_references(references: ReferenceSet, host_version: impl Into<String>) -> Self {
        Self {
            references,
            host_version: host_version.into(),
            live: Mutex::new(FxHashMap::default()),
            resident: Mutex::new(Vec::new()),
        }
    }

    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    /// Compile into a resident unit.
    pub fn compile(&self, sources: &[SourceText], unit_name: &str, manifest: Option<&Manifest>) -> CompileOutput {
        self.run(sources, unit_name, manifest, Strategy::Resident)
    }

    /// Compile into a unit owned by `arena`.
    pub fn compile_into(
        &self,
        arena: &UnitArena,
        sources: &[SourceText],
        unit_name: &str,
        manifest: Option<&Manifest>,
    ) -> CompileOutput {
        self.run(sources, unit_name, manifest, Strategy::Releasable(arena))
    }

    /// Run every check of a compile without producing a unit.
    pub fn validate(&self, sources: &[SourceText], manifest: Option<&Manifest>) -> Vec<Diagnostic> {
        self.run(sources, "", manifest, Strategy::Validate).diagnostics
    }

    /// Compile on a worker thread. The owner polls the receiver.
    pub fn compile_in_background(
        self: &Arc<Self>,
        sources: Vec<SourceText>,
        unit_name: String,
        manifest: Option<Manifest>,
    ) -> Receiver<CompileOutput> {
        let (tx, rx) = channel::bounded(1);
        let compiler = Arc::clone(self);
        std::thread::spawn(move || {
            let output = compiler.compile(&sources, &unit_name, manifest.as_ref());
            // receiver may have been dropped; the unit is still resident
            let _ = tx.send(output);
        });
        rx
    }

    /// Check whether a live unit holds `name`.
    pub fn is_name_live(&self, name: &str) -> bool {
        self.live
            .lock()
            .get(&name.to_ascii_lowercase())
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    fn run(
        &self,
        sources: &[SourceText],
        unit_name: &str,
        manifest: Option<&Manifest>,
        strategy: Strategy<'_>,
    ) -> CompileOutput {
        if let Some(manifest) = manifest
            && !version::is_compatible(manifest.min_host_version.as_deref(), &self.host_version)
        {
            let required = version::Version::requirement(manifest.min_host_version.as_deref());
            return CompileOutput::rejected(vec![Diagnostic::error(
                code::VERSION,
                format!(
                    "`{}` requires host version {required} or newer (running {})",
                    manifest.app_id, self.host_version
                ),
            )]);
        }

        if sources.is_empty() {
            return CompileOutput::rejected(vec![Diagnostic::error(
                code::NO_SOURCES,
                "no source files to compile",
            )]);
        }

        let mut diagnostics = Vec::new();
        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            match parser::parse_file(&source.path, &source.text) {
                Ok(file) => files.push(file),
                Err(diag) => diagnostics.push(diag),
            }
        }
        if has_errors(&diagnostics) {
            return CompileOutput::rejected(diagnostics);
        }

        let requested = manifest.map(|m| m.dependencies.as_slice()).unwrap_or_default();
        let builtins = self.references.link(requested);
        let (program, resolve_diags) = resolve::build_program(files, &builtins);
        diagnostics.extend(resolve_diags);
        if has_errors(&diagnostics) {
            return CompileOutput::rejected(diagnostics);
        }

        let (linked, unknown): (Vec<String>, Vec<String>) = requested
            .iter()
            .cloned()
            .partition(|name| self.references.optional_names().any(|known| known == name.trim()));
        diagnostics.extend(unknown.iter().map(|name| {
            Diagnostic::warning(
                code::UNKNOWN_LIBRARY,
                format!("dependency `{name}` is not a library this host provides; ignored"),
            )
        }));

        let arena = match strategy {
            Strategy::Validate => return CompileOutput::rejected(diagnostics),
            Strategy::Resident => None,
            Strategy::Releasable(arena) => Some(arena),
        };

        let unit = Arc::new(CompiledUnit::new(unit_name, program, linked));
        if let Err(diag) = self.claim_name(&unit) {
            diagnostics.push(diag);
            return CompileOutput::rejected(diagnostics);
        }

        match arena {
            Some(arena) => arena.adopt(&unit),
            None => self.resident.lock().push(Arc::clone(&unit)),
        }

        debug!("compile"; "unit `{}` ready ({} files)", unit_name, sources.len());
        CompileOutput {
            unit: Some(unit),
            diagnostics,
        }
    }

    /// Register the unit's name, failing if a live unit already holds it.
    fn claim_name(&self, unit: &Arc<CompiledUnit>) -> Result<(), Diagnostic> {
        let name = unit.name();
        if name.trim().is_empty() {
            return Err(Diagnostic::error(code::UNIT_NAME, "unit name must not be empty"));
        }

        let mut live = self.live.lock();
        live.retain(|_, weak| weak.strong_count() > 0);

        let key = name.to_ascii_lowercase();
        if live.contains_key(&key) {
            log!("compile"; "unit name `{}` is already loaded", name);
            return Err(Diagnostic::error(
                code::UNIT_NAME,
                format!("a unit named `{name}` is already loaded"),
            ));
        }
        live.insert(key, Arc::downgrade(unit));
        Ok(())
    }
}
