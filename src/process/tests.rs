use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::compiler::{FaultKind, Frame};
use crate::crash::{CrashIsolator, Notifier};

const MS_50: Duration = Duration::from_millis(50);

/// Observable state shared between a test and its window.
#[derive(Default)]
struct WindowLog {
    updates: RefCell<Vec<Duration>>,
    draws: Cell<usize>,
    closed: Cell<bool>,
    visible: Cell<bool>,
    close_requested: Cell<bool>,
    fail_with: RefCell<Option<Fault>>,
}

struct TestWindow(Rc<WindowLog>);

impl AppWindow for TestWindow {
    fn title(&self) -> &str {
        "test"
    }

    fn is_visible(&self) -> bool {
        self.0.visible.get()
    }

    fn update(&mut self, dt: Duration) -> Result<(), Fault> {
        self.0.updates.borrow_mut().push(dt);
        match self.0.fail_with.borrow_mut().take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn draw(&mut self) -> Result<(), Fault> {
        self.0.draws.set(self.0.draws.get() + 1);
        Ok(())
    }

    fn close_requested(&self) -> bool {
        self.0.close_requested.get()
    }

    fn close(&mut self) {
        self.0.closed.set(true);
    }
}

fn window_log(visible: bool) -> Rc<WindowLog> {
    let log = Rc::new(WindowLog::default());
    log.visible.set(visible);
    log
}

struct Quiet;

impl Notifier for Quiet {
    fn notify(&self, _: &str, _: Option<&std::path::Path>) -> anyhow::Result<()> {
        Ok(())
    }
}

fn isolator(dir: &tempfile::TempDir) -> CrashIsolator {
    CrashIsolator::new(dir.path(), Arc::new(Quiet))
}

fn spawn(scheduler: &mut ProcessScheduler, app: &str, priority: Priority, log: &Rc<WindowLog>) -> ProcessId {
    let pid = scheduler.start(AppId::from(app), Some(priority));
    scheduler.open_window(pid, Box::new(TestWindow(log.clone())));
    pid
}

fn fault_in(unit: &str) -> Fault {
    let mut fault = Fault::new(FaultKind::Raised, "boom");
    fault.frames.push(Frame {
        unit: Arc::from(unit),
        type_name: "App".into(),
        method: "Update".into(),
        file: "App.hd".into(),
        line: 2,
    });
    fault
}

#[test]
fn test_lifecycle_follows_visibility() {
    let mut scheduler = ProcessScheduler::default();
    let pid = scheduler.start(AppId::from("CALC"), None);
    assert_eq!(scheduler.process(pid).unwrap().state(), ProcessState::Starting);

    let window = window_log(false);
    scheduler.open_window(pid, Box::new(TestWindow(window.clone())));
    assert_eq!(scheduler.process(pid).unwrap().state(), ProcessState::Background);

    let dir = tempfile::tempdir().unwrap();
    window.visible.set(true);
    scheduler.tick(MS_50, &isolator(&dir)).unwrap();
    assert_eq!(scheduler.process(pid).unwrap().state(), ProcessState::Running);
}

#[test]
fn test_running_updates_every_tick() {
    let dir = tempfile::tempdir().unwrap();
    let isolator = isolator(&dir);
    let mut scheduler = ProcessScheduler::default();
    let window = window_log(true);
    spawn(&mut scheduler, "CALC", Priority::Low, &window);

    for _ in 0..3 {
        scheduler.tick(MS_50, &isolator).unwrap();
    }
    assert_eq!(*window.updates.borrow(), vec![MS_50; 3]);
    assert_eq!(window.draws.get(), 3);
}

#[test]
fn test_low_priority_background_accumulates() {
    let dir = tempfile::tempdir().unwrap();
    let isolator = isolator(&dir);
    let mut scheduler = ProcessScheduler::default();
    let window = window_log(false);
    let pid = spawn(&mut scheduler, "CALC", Priority::Low, &window);

    let mut throttled = 0;
    for _ in 0..5 {
        throttled += scheduler.tick(MS_50, &isolator).unwrap().throttled;
    }

    let hundred = Duration::from_millis(100);
    assert_eq!(*window.updates.borrow(), vec![hundred, hundred]);
    assert_eq!(throttled, 3);
    assert_eq!(scheduler.process(pid).unwrap().accumulated(), MS_50);
    assert_eq!(window.draws.get(), 0);
}

#[test]
fn test_normal_and_high_background_rates() {
    let dir = tempfile::tempdir().unwrap();
    let isolator = isolator(&dir);
    let mut scheduler = ProcessScheduler::default();
    let normal = window_log(false);
    let high = window_log(false);
    spawn(&mut scheduler, "NORMAL", Priority::Normal, &normal);
    spawn(&mut scheduler, "HIGH", Priority::High, &high);

    let tick = Duration::from_millis(20);
    for _ in 0..4 {
        scheduler.tick(tick, &isolator).unwrap();
    }

    // 1/30 s is just over 33 ms: flushes after ticks 2 and 4
    assert_eq!(
        *normal.updates.borrow(),
        vec![Duration::from_millis(40), Duration::from_millis(40)]
    );
    assert_eq!(*high.updates.borrow(), vec![tick; 4]);
}

#[test]
fn test_background_time_carries_into_running() {
    let dir = tempfile::tempdir().unwrap();
    let isolator = isolator(&dir);
    let mut scheduler = ProcessScheduler::default();
    let window = window_log(false);
    spawn(&mut scheduler, "CALC", Priority::Low, &window);

    scheduler.tick(MS_50, &isolator).unwrap();
    window.visible.set(true);
    scheduler.tick(MS_50, &isolator).unwrap();

    assert_eq!(*window.updates.borrow(), vec![Duration::from_millis(100)]);
}

#[test]
fn test_closing_last_window_terminates() {
    let mut scheduler = ProcessScheduler::default();
    let first = window_log(true);
    let second = window_log(false);
    let pid = spawn(&mut scheduler, "CALC", Priority::Normal, &first);
    let extra = scheduler
        .open_window(pid, Box::new(TestWindow(second.clone())))
        .unwrap();
    let main = scheduler.process(pid).unwrap().main_window().unwrap();

    let released = Rc::new(Cell::new(false));
    let flag = released.clone();
    scheduler.attach_resource(pid, "tray", move || flag.set(true));

    assert!(scheduler.close_window(pid, main));
    assert!(first.closed.get());
    assert_eq!(scheduler.process(pid).unwrap().main_window(), Some(extra));
    assert_eq!(scheduler.process(pid).unwrap().state(), ProcessState::Background);
    assert!(!released.get());

    assert!(scheduler.close_window(pid, extra));
    assert!(second.closed.get());
    assert!(released.get());
    assert!(scheduler.process(pid).is_none());
    assert!(!scheduler.close_window(pid, extra));
}

#[test]
fn test_main_window_promotion_prefers_visible() {
    let mut scheduler = ProcessScheduler::default();
    let main = window_log(true);
    let hidden = window_log(false);
    let shown = window_log(true);
    let pid = spawn(&mut scheduler, "CALC", Priority::Normal, &main);
    scheduler.open_window(pid, Box::new(TestWindow(hidden)));
    let visible = scheduler.open_window(pid, Box::new(TestWindow(shown))).unwrap();

    let main_id = scheduler.process(pid).unwrap().main_window().unwrap();
    scheduler.close_window(pid, main_id);
    assert_eq!(scheduler.process(pid).unwrap().main_window(), Some(visible));
}

#[test]
fn test_app_close_request_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = ProcessScheduler::default();
    let window = window_log(true);
    let pid = spawn(&mut scheduler, "CALC", Priority::Normal, &window);

    window.close_requested.set(true);
    let stats = scheduler.tick(MS_50, &isolator(&dir)).unwrap();
    assert_eq!(stats.closed, 1);
    assert!(scheduler.process(pid).is_none());
}

#[test]
fn test_terminate_app_stops_every_instance() {
    let mut scheduler = ProcessScheduler::default();
    spawn(&mut scheduler, "CALC", Priority::Normal, &window_log(true));
    spawn(&mut scheduler, "calc", Priority::Normal, &window_log(true));
    let notes = spawn(&mut scheduler, "NOTES", Priority::Normal, &window_log(true));

    assert_eq!(scheduler.terminate_app(&AppId::from("Calc")), 2);
    assert_eq!(scheduler.live_count(), 1);
    assert!(scheduler.process(notes).is_some());
}

#[test]
fn test_app_fault_crashes_only_that_process() {
    let dir = tempfile::tempdir().unwrap();
    let isolator = isolator(&dir);
    let mut scheduler = ProcessScheduler::default();
    let calc = window_log(true);
    let notes = window_log(true);
    let calc_pid = spawn(&mut scheduler, "CALC", Priority::Normal, &calc);
    let notes_pid = spawn(&mut scheduler, "NOTES", Priority::Normal, &notes);

    *calc.fail_with.borrow_mut() = Some(fault_in("CALC_998877"));
    let stats = scheduler.tick(MS_50, &isolator).unwrap();

    assert_eq!(stats.crashed, 1);
    assert!(scheduler.process(calc_pid).is_none());
    assert!(calc.closed.get());
    assert!(scheduler.process(notes_pid).is_some());
    assert_eq!(notes.updates.borrow().len(), 1);
    assert!(dir.path().join("CALC").is_dir());
}

#[test]
fn test_foreign_fault_is_host_fault() {
    let dir = tempfile::tempdir().unwrap();
    let isolator = isolator(&dir);
    let mut scheduler = ProcessScheduler::default();
    let window = window_log(true);
    let pid = spawn(&mut scheduler, "CALCULATOR", Priority::Normal, &window);

    *window.fail_with.borrow_mut() = Some(fault_in("CALC"));
    let err = scheduler.tick(MS_50, &isolator).unwrap_err();

    let RuntimeError::HostFaults(faults) = err;
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].pid, pid);
    assert!(scheduler.process(pid).is_some());
}

#[test]
fn test_every_host_fault_of_a_tick_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let isolator = isolator(&dir);
    let mut scheduler = ProcessScheduler::default();
    let alpha = window_log(true);
    let beta = window_log(true);
    let alpha_pid = spawn(&mut scheduler, "ALPHA", Priority::Normal, &alpha);
    let beta_pid = spawn(&mut scheduler, "BETA", Priority::Normal, &beta);

    *alpha.fail_with.borrow_mut() = Some(Fault::host("alpha broke"));
    *beta.fail_with.borrow_mut() = Some(Fault::host("beta broke"));
    let err = scheduler.tick(MS_50, &isolator).unwrap_err();

    let text = err.to_string();
    assert!(text.starts_with("2 host faults"), "{text}");
    assert!(text.contains("alpha broke") && text.contains("beta broke"));

    let RuntimeError::HostFaults(faults) = err;
    let mut pids: Vec<_> = faults.iter().map(|fault| fault.pid).collect();
    pids.sort();
    let mut expected = vec![alpha_pid, beta_pid];
    expected.sort();
    assert_eq!(pids, expected);
}

#[test]
fn test_fault_owned_by_other_app_crashes_that_app() {
    let dir = tempfile::tempdir().unwrap();
    let isolator = isolator(&dir);
    let mut scheduler = ProcessScheduler::default();
    let host = window_log(true);
    let host_pid = spawn(&mut scheduler, "CALCULATOR", Priority::Normal, &host);
    let notes_pid = spawn(&mut scheduler, "NOTES", Priority::Normal, &window_log(true));

    *host.fail_with.borrow_mut() = Some(fault_in("NOTES_1a2b"));
    let stats = scheduler.tick(MS_50, &isolator).unwrap();

    assert_eq!(stats.crashed, 1);
    assert!(scheduler.process(notes_pid).is_none());
    assert!(scheduler.process(host_pid).is_some());
    assert!(dir.path().join("NOTES").is_dir());
}

#[test]
fn test_set_priority() {
    let mut scheduler = ProcessScheduler::new(Priority::Low);
    let pid = scheduler.start(AppId::from("CALC"), None);
    assert_eq!(scheduler.process(pid).unwrap().priority(), Priority::Low);
    assert!(scheduler.set_priority(pid, Priority::High));
    assert_eq!(scheduler.process(pid).unwrap().priority(), Priority::High);
    assert!(!scheduler.set_priority(ProcessId(999), Priority::High));
}
