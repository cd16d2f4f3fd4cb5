//! Compiled units and the arena that owns releasable ones.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::fault::Fault;
use super::interp::{ExecEnv, Interpreter};
use super::resolve::Program;
use super::value::Value;

/// An immutable, executable program image.
///
/// A unit is never mutated after compilation. A reload produces a new unit
/// under a new name; old units stay alive as long as something holds them.
pub struct CompiledUnit {
    name: Arc<str>,
    program: Program,
    /// Optional libraries this unit was linked against.
    linked: Vec<String>,
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("name", &self.name)
            .field("types", &self.program.types.len())
            .field("linked", &self.linked)
            .finish()
    }
}

/// A resolved `Type.Method` inside a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    type_index: usize,
    method_index: usize,
    pub arity: usize,
}

impl CompiledUnit {
    pub(super) fn new(name: &str, program: Program, linked: Vec<String>) -> Self {
        Self {
            name: Arc::from(name),
            program,
            linked,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(super) fn program(&self) -> &Program {
        &self.program
    }

    pub fn linked(&self) -> &[String] {
        &self.linked
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.program.types.iter().map(|ty| ty.name.as_str())
    }

    /// Look up a method by its type's full name.
    pub fn find_entry_point(&self, type_name: &str, method: &str) -> Option<EntryPoint> {
        let type_index = self.program.find_type(type_name)?;
        let method_index = self.program.find_method(type_index, method)?;
        let arity = self.program.types[type_index].methods[method_index].params.len();
        Some(EntryPoint {
            type_index,
            method_index,
            arity,
        })
    }

    /// Run an entry point. `args` must match its arity.
    pub fn invoke(&self, entry: EntryPoint, args: Vec<Value>, env: &mut ExecEnv<'_>) -> Result<Value, Fault> {
        if args.len() != entry.arity {
            return Err(Fault::host(format!(
                "entry point expects {} argument(s), got {}",
                entry.arity,
                args.len()
            )));
        }
        Interpreter::new(self, env).call(entry.type_index, entry.method_index, args)
    }
}

/// Owner of releasable units.
///
/// Units compiled into an arena live until the arena is discarded and every
/// other holder (open windows, factories) has let go.
#[derive(Debug, Default)]
pub struct UnitArena {
    units: Mutex<Vec<Arc<CompiledUnit>>>,
}

impl UnitArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn adopt(&self, unit: &Arc<CompiledUnit>) {
        self.units.lock().push(Arc::clone(unit));
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the arena's hold on its units.
    ///
    /// The returned handles let the caller observe when each unit is
    /// actually reclaimed.
    pub fn discard(self) -> Vec<Weak<CompiledUnit>> {
        self.units
            .into_inner()
            .iter()
            .map(Arc::downgrade)
            .collect()
    }
}
