//! Crash isolation.
//!
//! A fault is attributed to an app when any of its frames ran in a unit
//! named after the app (`CALC`, `CALC_1a2b3c4d`). An attributed fault costs
//! the offending process only: a report is written, the user is notified
//! and the process is terminated. Nothing here fails outward.

mod notify;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compiler::Fault;
use crate::core::AppId;
use crate::log;
use crate::process::{ProcessId, ProcessScheduler};

pub use notify::{ConsoleNotifier, Notifier};
pub use report::CrashReport;

pub struct CrashIsolator {
    crash_dir: PathBuf,
    notifier: Arc<dyn Notifier>,
}

impl CrashIsolator {
    pub fn new(crash_dir: impl Into<PathBuf>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            crash_dir: crash_dir.into(),
            notifier,
        }
    }

    pub fn crash_dir(&self) -> &Path {
        &self.crash_dir
    }

    /// Check whether any frame of `fault` ran in one of `app`'s units.
    pub fn is_app_fault(&self, fault: &Fault, app: &AppId) -> bool {
        fault.any_unit(|unit| app.owns_unit(unit))
    }

    /// Attribute a fault to the first live process whose app owns it.
    ///
    /// Returns `false` when no process matches, leaving the fault to the
    /// caller.
    pub fn try_handle_any(&self, fault: &Fault, scheduler: &mut ProcessScheduler) -> bool {
        let owner = scheduler
            .processes()
            .find(|process| self.is_app_fault(fault, process.app()))
            .map(|process| process.id());

        match owner {
            Some(pid) => {
                self.handle_app_fault(scheduler, pid, fault);
                true
            }
            None => false,
        }
    }

    /// Report the crash and terminate `pid`.
    pub fn handle_app_fault(&self, scheduler: &mut ProcessScheduler, pid: ProcessId, fault: &Fault) {
        let Some(app) = scheduler.process(pid).map(|process| process.app().clone()) else {
            log!("crash"; "{} is gone, crash not handled: {}", pid, fault);
            return;
        };

        self.record(&app, Some(pid), fault);

        if !scheduler.terminate(pid) {
            log!("crash"; "failed to terminate {} {}", app, pid);
        }
    }

    /// Report a fault raised before the app had a process (launch).
    pub fn report_fault(&self, app: &AppId, fault: &Fault) -> Option<PathBuf> {
        self.record(app, None, fault)
    }

    fn record(&self, app: &AppId, pid: Option<ProcessId>, fault: &Fault) -> Option<PathBuf> {
        log!("crash"; "{} crashed: {}", app, fault);

        let report = CrashReport::new(app, pid, fault);
        let path = match report.write(&self.crash_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                log!("crash"; "cannot write report for {}: {}", app, e);
                None
            }
        };

        let summary = format!("{app} stopped: {}", fault);
        if let Err(e) = self.notifier.notify(&summary, path.as_deref()) {
            log!("crash"; "notification failed: {:#}", e);
        }
        path
    }
}
