//! Window factories and script-backed windows.

use std::sync::Arc;
use std::time::Duration;

use crate::compiler::{CompiledUnit, EntryPoint, ExecEnv, Fault, Value, WindowState};
use crate::core::AppId;
use crate::error::LoadError;
use crate::process::AppWindow;
use crate::{debug, log};

use super::manifest::Manifest;

/// Per-frame hook names looked up on the entry type.
const UPDATE_METHOD: &str = "Update";
const DRAW_METHOD: &str = "Draw";

/// Creates windows from a generation's entry point.
///
/// Holds its unit alive: a factory (and every window it made) keeps the
/// generation usable after a newer one replaces it.
#[derive(Debug, Clone)]
pub struct WindowFactory {
    app: AppId,
    unit: Arc<CompiledUnit>,
    entry: EntryPoint,
    entry_class: String,
    entry_method: String,
}

impl WindowFactory {
    /// Resolve `entryClass.entryMethod` on `unit`.
    ///
    /// A one-parameter entry receives the launch arguments as a list; a
    /// zero-parameter entry is called without them. Anything else is
    /// rejected at load time.
    pub fn resolve(app: &AppId, unit: &Arc<CompiledUnit>, manifest: &Manifest) -> Result<Self, LoadError> {
        let entry_name = format!("{}.{}", manifest.entry_class, manifest.entry_method);
        let Some(entry) = unit.find_entry_point(&manifest.entry_class, &manifest.entry_method) else {
            return Err(LoadError::MissingEntry {
                app: app.clone(),
                entry: entry_name,
            });
        };
        if entry.arity > 1 {
            return Err(LoadError::UnsupportedArity {
                app: app.clone(),
                entry: entry_name,
                arity: entry.arity,
            });
        }

        Ok(Self {
            app: app.clone(),
            unit: Arc::clone(unit),
            entry,
            entry_class: manifest.entry_class.clone(),
            entry_method: manifest.entry_method.clone(),
        })
    }

    pub fn unit(&self) -> &Arc<CompiledUnit> {
        &self.unit
    }

    /// Invoke the entry point.
    ///
    /// `Ok(None)` means the entry ran but did not return a window. A fault
    /// raised by the entry is returned for crash reporting.
    pub fn create(&self, args: &[String]) -> Result<Option<ScriptWindow>, Fault> {
        let call_args = if self.entry.arity == 1 {
            vec![Value::List(args.iter().map(Value::str).collect())]
        } else {
            Vec::new()
        };

        let mut env = ExecEnv::default();
        let result = self.unit.invoke(self.entry, call_args, &mut env);
        log_output(&self.app, env.output);

        let value = result?;
        let type_name = value.type_name();
        let Some(spec) = value.into_window() else {
            log!("launch"; "{}: `{}.{}` returned {} instead of a window",
                self.app, self.entry_class, self.entry_method, type_name);
            return Ok(None);
        };

        let hook = |name: &str, max_arity: usize| {
            self.unit
                .find_entry_point(&self.entry_class, name)
                .filter(|entry| entry.arity <= max_arity)
        };

        Ok(Some(ScriptWindow {
            app: self.app.clone(),
            unit: Arc::clone(&self.unit),
            state: WindowState::new(spec),
            update: hook(UPDATE_METHOD, 1),
            draw: hook(DRAW_METHOD, 0),
            closed: false,
        }))
    }
}

/// A window whose behaviour is app code.
pub struct ScriptWindow {
    app: AppId,
    unit: Arc<CompiledUnit>,
    state: WindowState,
    update: Option<EntryPoint>,
    draw: Option<EntryPoint>,
    closed: bool,
}

impl ScriptWindow {
    pub fn unit_name(&self) -> &str {
        self.unit.name()
    }

    pub fn width(&self) -> u32 {
        self.state.spec.width
    }

    pub fn height(&self) -> u32 {
        self.state.spec.height
    }

    fn run(&mut self, entry: EntryPoint, args: Vec<Value>) -> Result<(), Fault> {
        let mut env = ExecEnv::with_window(&mut self.state);
        let result = self.unit.invoke(entry, args, &mut env);
        log_output(&self.app, env.output);
        result.map(|_| ())
    }
}

impl AppWindow for ScriptWindow {
    fn title(&self) -> &str {
        &self.state.spec.title
    }

    fn is_visible(&self) -> bool {
        self.state.spec.visible && !self.closed
    }

    fn update(&mut self, dt: Duration) -> Result<(), Fault> {
        let Some(entry) = self.update else {
            return Ok(());
        };
        let args = match entry.arity {
            0 => Vec::new(),
            _ => vec![Value::Number(dt.as_secs_f64())],
        };
        self.run(entry, args)
    }

    fn draw(&mut self) -> Result<(), Fault> {
        match self.draw {
            Some(entry) => self.run(entry, Vec::new()),
            None => Ok(()),
        }
    }

    fn close_requested(&self) -> bool {
        self.state.close_requested
    }

    fn close(&mut self) {
        self.closed = true;
        debug!("window"; "{} closed `{}` ({})", self.app, self.state.spec.title, self.unit.name());
    }
}

fn log_output(app: &AppId, output: Vec<String>) {
    for line in output {
        log!("app"; "{}: {}", app, line);
    }
}
