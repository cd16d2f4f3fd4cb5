//! Runtime context and host loop.
//!
//! [`RuntimeContext`] is created once at startup and owns every component.
//! The thread that calls [`RuntimeContext::run`] is the owner thread: it
//! drains reloads, ticks processes and performs installs.
//!
//! ```text
//! ┌─────────── tick ───────────┐
//! │ drain reload queue          │  coordinator → registry (→ scheduler)
//! │ relaunch reloaded apps      │  registry → scheduler
//! │ tick processes              │  scheduler → isolator
//! │ poll hotdesk.toml (1/s)     │  config handle → coordinator
//! └─────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::compiler::SourceCompiler;
use crate::config::{ConfigHandle, HostConfig};
use crate::core::{AppId, OperationLocks, Priority, is_shutdown};
use crate::crash::{CrashIsolator, Notifier};
use crate::error::{InstallError, RuntimeError};
use crate::install;
use crate::logger::{status_detach, status_warning};
use crate::process::{ProcessId, ProcessScheduler, TickStats};
use crate::registry::AppRegistry;
use crate::reload::{DrainReport, HotReloadCoordinator};
use crate::utils::plural::plural_count;
use crate::{debug, log};

const CONFIG_POLL: Duration = Duration::from_secs(1);

/// What one host step did.
#[derive(Debug, Default)]
pub struct StepReport {
    pub reloads: DrainReport,
    pub relaunched: Vec<ProcessId>,
    pub tick: TickStats,
}

pub struct RuntimeContext {
    config: ConfigHandle,
    registry: AppRegistry,
    coordinator: Arc<HotReloadCoordinator>,
    scheduler: ProcessScheduler,
    isolator: CrashIsolator,
    locks: OperationLocks,
}

impl RuntimeContext {
    pub fn new(config: HostConfig, notifier: Arc<dyn Notifier>) -> Self {
        let compiler = Arc::new(SourceCompiler::new(config.host_version()));
        let coordinator = Arc::new(HotReloadCoordinator::new(config.debounce(), config.reload.enable));
        let registry = AppRegistry::new(
            compiler,
            coordinator.clone(),
            config.runtime.releasable_units,
        );
        let scheduler = ProcessScheduler::new(config.scheduler.default_priority);
        let isolator = CrashIsolator::new(config.crash.dir.clone(), notifier);

        Self {
            config: ConfigHandle::new(config),
            registry,
            coordinator,
            scheduler,
            isolator,
            locks: OperationLocks::new(),
        }
    }

    pub fn config(&self) -> Arc<HostConfig> {
        self.config.get()
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &ProcessScheduler {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &HotReloadCoordinator {
        &self.coordinator
    }

    pub fn isolator(&self) -> &CrashIsolator {
        &self.isolator
    }

    pub fn locks(&self) -> &OperationLocks {
        &self.locks
    }

    fn apps_dir(&self) -> PathBuf {
        self.config.get().runtime.apps_dir.clone()
    }

    // ========================================================================
    // apps
    // ========================================================================

    /// Load every app under the configured apps root.
    pub fn load_apps(&mut self) -> usize {
        let apps_dir = self.apps_dir();
        let loaded = self.registry.load_all(&apps_dir);
        log!("host"; "{} loaded from {}", plural_count(loaded, "app"), apps_dir.display());
        loaded
    }

    /// Start a process for `app` with one window from its factory.
    ///
    /// A fault raised by the factory is reported as a crash of the app; no
    /// process is left behind in that case.
    pub fn launch(&mut self, app: &AppId, args: &[String], priority: Option<Priority>) -> Option<ProcessId> {
        let window = match self.registry.create_window(app, args) {
            Ok(Some(window)) => window,
            Ok(None) => return None,
            Err(fault) => {
                self.isolator.report_fault(app, &fault);
                return None;
            }
        };

        let pid = self.scheduler.start(app.clone(), priority);
        self.scheduler.open_window(pid, window);
        log!("launch"; "{} {}", app, pid);
        Some(pid)
    }

    pub fn install(&mut self, source: &Path) -> Result<AppId, InstallError> {
        let apps_dir = self.apps_dir();
        install::install(&apps_dir, source, &mut self.registry, &self.locks)
    }

    pub fn uninstall(&mut self, app: &AppId) -> Result<PathBuf, InstallError> {
        let apps_dir = self.apps_dir();
        install::uninstall(&apps_dir, app, &mut self.registry, &mut self.scheduler, &self.locks)
    }

    // ========================================================================
    // host loop
    // ========================================================================

    /// One host tick: drain reloads, relaunch what they stopped, update.
    pub fn step(&mut self, dt: Duration) -> Result<StepReport, RuntimeError> {
        let running: FxHashSet<AppId> = self
            .scheduler
            .processes()
            .map(|process| process.app().clone())
            .collect();

        let reloads = self
            .coordinator
            .drain(&mut self.registry, &mut self.scheduler, &self.locks);

        // a reload stops every instance; bring back one for apps that were up
        let mut relaunched = Vec::new();
        for app in reloads.reloaded.iter().filter(|app| running.contains(*app)) {
            if let Some(pid) = self.launch(app, &[], None) {
                relaunched.push(pid);
            }
        }
        if !relaunched.is_empty() {
            status_detach();
        }

        let tick = self.scheduler.tick(dt, &self.isolator)?;
        Ok(StepReport {
            reloads,
            relaunched,
            tick,
        })
    }

    /// Pick up `hotdesk.toml` edits. Only the reload switch applies live.
    pub fn refresh_config(&self) -> bool {
        match self.config.reload() {
            Ok(true) => {
                let config = self.config.get();
                self.coordinator.set_enabled(config.reload.enable);
                log!("config"; "reloaded {}", config.config_path.display());
                status_detach();
                true
            }
            Ok(false) => false,
            Err(e) => {
                status_warning(&format!("config not applied: {e}"));
                false
            }
        }
    }

    /// Run until Ctrl+C, `limit` elapsed, or a host fault.
    ///
    /// Every process is terminated on the way out.
    pub fn run(&mut self, limit: Option<Duration>) -> Result<(), RuntimeError> {
        let started = Instant::now();
        let mut last_poll = started;
        let mut last_tick = started;

        let result = loop {
            if is_shutdown() || limit.is_some_and(|limit| started.elapsed() >= limit) {
                break Ok(());
            }

            let now = Instant::now();
            let dt = now - last_tick;
            last_tick = now;

            if let Err(e) = self.step(dt) {
                break Err(e);
            }

            if last_poll.elapsed() >= CONFIG_POLL {
                last_poll = Instant::now();
                self.refresh_config();
            }

            let tick = self.config.get().tick();
            if let Some(rest) = tick.checked_sub(now.elapsed()) {
                std::thread::sleep(rest);
            }
        };

        self.shutdown();
        result
    }

    /// Terminate every live process.
    pub fn shutdown(&mut self) {
        let pids: Vec<_> = self.scheduler.processes().map(|process| process.id()).collect();
        for pid in &pids {
            self.scheduler.terminate(*pid);
        }
        debug!(
            "host";
            "terminated {}, {} still referenced",
            plural_count(pids.len(), "instance"),
            plural_count(self.registry.retired_alive(), "retired unit")
        );
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use parking_lot::Mutex;

    use super::*;

    const PROGRAM: &str = r#"
type Clock.App {
    fn CreateWindow(args) {
        if len(args) > 0 && get(args, 0) == "boom" { fail("bad launch"); }
        return window("Clock");
    }
    fn Update(dt) {
        if dt > 10 { fail("clock skew"); }
    }
}
"#;

    #[derive(Default)]
    struct Recorder {
        summaries: Mutex<Vec<String>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, summary: &str, _report: Option<&Path>) -> anyhow::Result<()> {
            self.summaries.lock().push(summary.to_string());
            Ok(())
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        apps: PathBuf,
        crashes: PathBuf,
        notifier: Arc<Recorder>,
        ctx: RuntimeContext,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let apps = root.path().join("apps");
        let crashes = root.path().join("crashes");
        let clock = apps.join("clock");
        fs::create_dir_all(&clock).unwrap();
        fs::write(
            clock.join("manifest.json"),
            r#"{ "appId": "CLOCK", "entryClass": "Clock.App", "dependencies": ["list"] }"#,
        )
        .unwrap();
        fs::write(clock.join("App.hd"), PROGRAM).unwrap();

        let mut config = HostConfig::default();
        config.runtime.apps_dir = apps.clone();
        config.crash.dir = crashes.clone();
        config.reload.enable = false;

        let notifier = Arc::new(Recorder::default());
        let mut ctx = RuntimeContext::new(config, notifier.clone());
        assert_eq!(ctx.load_apps(), 1);
        Fixture {
            _root: root,
            apps,
            crashes,
            notifier,
            ctx,
        }
    }

    #[test]
    fn test_launch_and_step() {
        let mut f = fixture();
        let clock = AppId::from("CLOCK");
        let pid = f.ctx.launch(&clock, &[], None).unwrap();

        let report = f.ctx.step(Duration::from_millis(16)).unwrap();
        assert_eq!(report.tick.updated, 1);
        assert!(report.reloads.is_empty());
        assert_eq!(f.ctx.scheduler().process(pid).unwrap().app(), &clock);
    }

    #[test]
    fn test_launch_fault_writes_report_without_process() {
        let mut f = fixture();
        let clock = AppId::from("CLOCK");
        assert!(f.ctx.launch(&clock, &["boom".into()], None).is_none());
        assert!(f.ctx.scheduler().is_empty());

        assert_eq!(f.notifier.summaries.lock().len(), 1);
        assert!(f.crashes.join("CLOCK").is_dir());
    }

    #[test]
    fn test_update_fault_crashes_only_that_process() {
        let mut f = fixture();
        let clock = AppId::from("CLOCK");
        let first = f.ctx.launch(&clock, &[], None).unwrap();
        let second = f.ctx.launch(&clock, &[], None).unwrap();

        f.ctx.step(Duration::from_millis(16)).unwrap();
        // a 20 s frame trips the app's own guard in both instances
        let report = f.ctx.step(Duration::from_secs(20)).unwrap();
        assert_eq!(report.tick.crashed, 2);
        assert!(f.ctx.scheduler().process(first).is_none());
        assert!(f.ctx.scheduler().process(second).is_none());
        assert!(f.notifier.summaries.lock()[0].contains("clock skew"));
    }

    #[test]
    fn test_reload_relaunches_running_app() {
        let mut f = fixture();
        let clock = AppId::from("CLOCK");
        f.ctx.coordinator().set_enabled(true);
        let old = f.ctx.launch(&clock, &[], None).unwrap();

        fs::write(f.apps.join("clock/App.hd"), PROGRAM.replace("\"Clock\"", "\"Clock 2\"")).unwrap();
        f.ctx.coordinator().queue().push(clock.clone());

        let report = f.ctx.step(Duration::from_millis(16)).unwrap();
        assert_eq!(report.reloads.reloaded, vec![clock.clone()]);
        assert_eq!(report.relaunched.len(), 1);
        assert!(f.ctx.scheduler().process(old).is_none());

        let pid = report.relaunched[0];
        let process = f.ctx.scheduler().process(pid).unwrap();
        let wid = process.main_window().unwrap();
        assert_eq!(process.window(wid).unwrap().title(), "Clock 2");
    }

    #[test]
    fn test_install_and_uninstall_through_context() {
        let mut f = fixture();
        let staging = tempfile::tempdir().unwrap();
        let source = staging.path().join("alarm");
        fs::create_dir_all(&source).unwrap();
        fs::write(
            source.join("manifest.json"),
            r#"{ "appId": "ALARM", "entryClass": "Alarm" }"#,
        )
        .unwrap();
        fs::write(source.join("Alarm.hd"), "type Alarm { fn CreateWindow() { return window(\"Alarm\"); } }").unwrap();

        let alarm = f.ctx.install(&source).unwrap();
        assert!(f.apps.join("alarm").is_dir());
        f.ctx.launch(&alarm, &[], None).unwrap();

        f.ctx.uninstall(&alarm).unwrap();
        assert!(!f.apps.join("alarm").exists());
        assert!(f.ctx.scheduler().is_empty());
    }

    #[test]
    fn test_run_with_limit_shuts_down() {
        let mut f = fixture();
        f.ctx.launch(&AppId::from("CLOCK"), &[], None).unwrap();
        f.ctx.run(Some(Duration::from_millis(50))).unwrap();
        assert!(f.ctx.scheduler().is_empty());
    }
}
