//! Cooperative process scheduler.
//!
//! Every running app instance is a [`Process`] owning one or more windows.
//! The owner thread calls [`ProcessScheduler::tick`] once per frame:
//!
//! ```text
//! Starting ──window──▶ Running ◀──visibility──▶ Background
//!                         │                        │
//!                         └──── last window ───────┴──▶ Terminated
//! ```
//!
//! Running processes update every tick. Background processes are throttled
//! by priority and receive the accumulated time when they flush.

mod window;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::compiler::Fault;
use crate::core::{AppId, Priority};
use crate::crash::CrashIsolator;
use crate::error::{HostFault, RuntimeError};
use crate::{debug, log};

pub use window::{AppWindow, ProcessId, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, no window yet
    Starting,
    /// At least one visible window
    Running,
    /// Windows open but none visible
    Background,
    Terminated,
}

impl ProcessState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Background => "background",
            Self::Terminated => "terminated",
        }
    }
}

/// Something a process holds only while alive (tray icon and the like).
struct Resource {
    name: String,
    release: Box<dyn FnOnce()>,
}

pub struct Process {
    id: ProcessId,
    app: AppId,
    state: ProcessState,
    priority: Priority,
    /// Background time not yet delivered to an update.
    accumulated: Duration,
    windows: Vec<(WindowId, Box<dyn AppWindow>)>,
    main_window: Option<WindowId>,
    resources: Vec<Resource>,
}

impl Process {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn app(&self) -> &AppId {
        &self.app
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    pub fn main_window(&self) -> Option<WindowId> {
        self.main_window
    }

    pub fn window(&self, id: WindowId) -> Option<&dyn AppWindow> {
        self.windows
            .iter()
            .find(|(wid, _)| *wid == id)
            .map(|(_, window)| window.as_ref())
    }

    fn has_visible_window(&self) -> bool {
        self.windows.iter().any(|(_, window)| window.is_visible())
    }

    /// Move between Running and Background after a visibility change.
    fn refresh_state(&mut self) {
        let next = match self.state {
            ProcessState::Terminated => return,
            _ if self.windows.is_empty() => return,
            _ if self.has_visible_window() => ProcessState::Running,
            _ => ProcessState::Background,
        };
        if next != self.state {
            debug!("process"; "{} {} {} -> {}", self.app, self.id, self.state.label(), next.label());
            self.state = next;
        }
    }

    /// How much time the next update receives, if one is due this tick.
    fn due(&mut self, dt: Duration) -> Option<Duration> {
        match self.state {
            ProcessState::Running => Some(std::mem::take(&mut self.accumulated) + dt),
            ProcessState::Background => {
                self.accumulated += dt;
                match self.priority.background_interval() {
                    Some(interval) if self.accumulated < interval => None,
                    _ => Some(std::mem::take(&mut self.accumulated)),
                }
            }
            ProcessState::Starting | ProcessState::Terminated => None,
        }
    }

    fn run_frame(&mut self, dt: Duration) -> Result<(), Fault> {
        for (_, window) in &mut self.windows {
            window.update(dt)?;
            if window.is_visible() {
                window.draw()?;
            }
        }
        Ok(())
    }

    /// Close everything and release resources. Idempotent.
    fn shut_down(&mut self) {
        for (_, mut window) in self.windows.drain(..) {
            window.close();
        }
        for resource in self.resources.drain(..) {
            debug!("process"; "{} released {}", self.id, resource.name);
            (resource.release)();
        }
        self.main_window = None;
        self.state = ProcessState::Terminated;
    }
}

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub updated: usize,
    pub throttled: usize,
    pub crashed: usize,
    pub closed: usize,
}

/// Owner of the live process table.
pub struct ProcessScheduler {
    processes: BTreeMap<ProcessId, Process>,
    default_priority: Priority,
    next_process: u64,
    next_window: u64,
}

impl Default for ProcessScheduler {
    fn default() -> Self {
        Self::new(Priority::default())
    }
}

impl ProcessScheduler {
    pub fn new(default_priority: Priority) -> Self {
        Self {
            processes: BTreeMap::new(),
            default_priority,
            next_process: 1,
            next_window: 1,
        }
    }

    /// Create a process in `Starting`. It runs once a window is opened.
    pub fn start(&mut self, app: AppId, priority: Option<Priority>) -> ProcessId {
        let id = ProcessId(self.next_process);
        self.next_process += 1;

        let priority = priority.unwrap_or(self.default_priority);
        debug!("process"; "start {} {} ({})", app, id, priority.label());
        self.processes.insert(
            id,
            Process {
                id,
                app,
                state: ProcessState::Starting,
                priority,
                accumulated: Duration::ZERO,
                windows: Vec::new(),
                main_window: None,
                resources: Vec::new(),
            },
        );
        id
    }

    /// Attach a window. The first window becomes the main window.
    pub fn open_window(&mut self, pid: ProcessId, window: Box<dyn AppWindow>) -> Option<WindowId> {
        let process = self.processes.get_mut(&pid)?;
        let id = WindowId(self.next_window);
        self.next_window += 1;

        process.windows.push((id, window));
        process.main_window.get_or_insert(id);
        process.refresh_state();
        Some(id)
    }

    /// Close one window. Closing the last window terminates the process.
    pub fn close_window(&mut self, pid: ProcessId, wid: WindowId) -> bool {
        let Some(process) = self.processes.get_mut(&pid) else {
            return false;
        };
        let Some(index) = process.windows.iter().position(|(id, _)| *id == wid) else {
            return false;
        };

        let (_, mut window) = process.windows.remove(index);
        window.close();

        if process.windows.is_empty() {
            self.terminate(pid);
            return true;
        }

        if process.main_window == Some(wid) {
            let promoted = process
                .windows
                .iter()
                .find(|(_, window)| window.is_visible())
                .or_else(|| process.windows.first())
                .map(|(id, _)| *id);
            debug!("process"; "{} main window {} -> {:?}", pid, wid, promoted);
            process.main_window = promoted;
        }
        process.refresh_state();
        true
    }

    /// Close every window, release resources and drop the process.
    pub fn terminate(&mut self, pid: ProcessId) -> bool {
        let Some(mut process) = self.processes.remove(&pid) else {
            return false;
        };
        process.shut_down();
        debug!("process"; "terminated {} {}", process.app, pid);
        true
    }

    /// Terminate every instance of an app. Returns how many were stopped.
    pub fn terminate_app(&mut self, app: &AppId) -> usize {
        let pids: Vec<_> = self.processes_of(app).collect();
        pids.into_iter().filter(|pid| self.terminate(*pid)).count()
    }

    pub fn set_priority(&mut self, pid: ProcessId, priority: Priority) -> bool {
        match self.processes.get_mut(&pid) {
            Some(process) => {
                process.priority = priority;
                true
            }
            None => false,
        }
    }

    /// Hold a background-only resource until the process terminates.
    pub fn attach_resource(
        &mut self,
        pid: ProcessId,
        name: impl Into<String>,
        release: impl FnOnce() + 'static,
    ) -> bool {
        match self.processes.get_mut(&pid) {
            Some(process) => {
                process.resources.push(Resource {
                    name: name.into(),
                    release: Box::new(release),
                });
                true
            }
            None => false,
        }
    }

    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    pub fn processes_of<'a>(&'a self, app: &'a AppId) -> impl Iterator<Item = ProcessId> + 'a {
        self.processes
            .values()
            .filter(move |process| &process.app == app)
            .map(|process| process.id)
    }

    pub fn live_count(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Advance every process by `dt`.
    ///
    /// Faults raised by app code are collected during the pass. A fault the
    /// isolator attributes to the process's own app crashes only that
    /// process, and one owned by another live app crashes that app's
    /// process instead. Every remaining fault is logged and returned
    /// together after the attributed ones have been handled.
    pub fn tick(&mut self, dt: Duration, isolator: &CrashIsolator) -> Result<TickStats, RuntimeError> {
        let mut stats = TickStats::default();
        let mut faults = Vec::new();
        let mut close_requests = Vec::new();

        for process in self.processes.values_mut() {
            process.refresh_state();
            let Some(elapsed) = process.due(dt) else {
                if process.state == ProcessState::Background {
                    stats.throttled += 1;
                }
                continue;
            };

            stats.updated += 1;
            if let Err(fault) = process.run_frame(elapsed) {
                faults.push((process.id, fault));
                continue;
            }

            close_requests.extend(
                process
                    .windows
                    .iter()
                    .filter(|(_, window)| window.close_requested())
                    .map(|(wid, _)| (process.id, *wid)),
            );
        }

        for (pid, wid) in close_requests {
            if self.close_window(pid, wid) {
                stats.closed += 1;
            }
        }

        let mut unattributed = Vec::new();
        for (pid, fault) in faults {
            let Some(app) = self.process(pid).map(|p| p.app.clone()) else {
                continue;
            };
            if isolator.is_app_fault(&fault, &app) {
                isolator.handle_app_fault(self, pid, &fault);
                stats.crashed += 1;
            } else if isolator.try_handle_any(&fault, self) {
                stats.crashed += 1;
            } else {
                log!("error"; "fault in {} {} is not attributable to an app: {}", app, pid, fault);
                unattributed.push(HostFault { pid, app, fault });
            }
        }

        if unattributed.is_empty() {
            Ok(stats)
        } else {
            Err(RuntimeError::HostFaults(unattributed))
        }
    }
}
