//! Hot reload.
//!
//! ```text
//! notify thread ──Signal──▶ debounce thread ──push──▶ PendingReloadQueue
//!                                                         │
//!                              owner thread: drain ◀──────┘ ─▶ AppRegistry::reload
//! ```
//!
//! Per app: Idle → Debouncing → Queued → Idle. Watch callbacks never touch
//! the registry or the scheduler; every reload runs inside [`drain`] on the
//! owner thread, strictly in queue order.
//!
//! [`drain`]: HotReloadCoordinator::drain

mod debouncer;
mod queue;
mod watcher;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use notify::RecommendedWatcher;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::compiler::render;
use crate::core::{AppId, OperationLocks};
use crate::logger::{status_error, status_success};
use crate::process::ProcessScheduler;
use crate::registry::{AppRegistry, SourceWatch};
use crate::{debug, log};

use debouncer::Debouncer;
use watcher::Signal;

pub(crate) use debouncer::DEBOUNCE_MS;
pub use queue::PendingReloadQueue;

struct WatchState {
    enabled: bool,
    /// Every app asked to be watched, kept while disabled.
    tracked: FxHashMap<AppId, PathBuf>,
    /// Live watcher handles; dropping one stops it.
    watchers: FxHashMap<AppId, RecommendedWatcher>,
}

impl WatchState {
    fn attach(&mut self, app: &AppId, dir: &Path, tx: &Sender<Signal>) {
        match watcher::watch_app(app.clone(), dir, tx.clone()) {
            Ok(handle) => {
                debug!("watch"; "{}: watching {}", app, dir.display());
                self.watchers.insert(app.clone(), handle);
            }
            Err(e) => log!("watch"; "{}: cannot watch {}: {}", app, dir.display(), e),
        }
    }
}

/// What one [`HotReloadCoordinator::drain`] did.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub reloaded: Vec<AppId>,
    pub failed: Vec<AppId>,
    /// Busy with install or uninstall, queued again.
    pub deferred: Vec<AppId>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.reloaded.is_empty() && self.failed.is_empty() && self.deferred.is_empty()
    }
}

pub struct HotReloadCoordinator {
    delay: Duration,
    tx: Sender<Signal>,
    queue: Arc<PendingReloadQueue>,
    state: Mutex<WatchState>,
    worker: Option<JoinHandle<()>>,
}

impl HotReloadCoordinator {
    pub fn new(delay: Duration, enabled: bool) -> Self {
        let (tx, rx) = channel::unbounded();
        let queue = Arc::new(PendingReloadQueue::new());

        let worker = {
            let queue = Arc::clone(&queue);
            std::thread::Builder::new()
                .name("hotdesk-debounce".into())
                .spawn(move || debounce_loop(rx, delay, &queue))
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log!("watch"; "cannot start debounce thread: {}", e);
                None
            }
        };

        Self {
            delay,
            tx,
            queue,
            state: Mutex::new(WatchState {
                enabled,
                tracked: FxHashMap::default(),
                watchers: FxHashMap::default(),
            }),
            worker,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn queue(&self) -> &PendingReloadQueue {
        &self.queue
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn is_tracked(&self, app: &AppId) -> bool {
        self.state.lock().tracked.contains_key(app)
    }

    /// A watcher is currently attached for the app.
    pub fn is_watching(&self, app: &AppId) -> bool {
        self.state.lock().watchers.contains_key(app)
    }

    pub fn tracked_count(&self) -> usize {
        self.state.lock().tracked.len()
    }

    /// Turn hot reload on or off.
    ///
    /// Off drops every watcher, timer and queued reload. On re-watches the
    /// apps that are still tracked.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        if state.enabled == enabled {
            return;
        }
        state.enabled = enabled;

        if enabled {
            let tracked: Vec<_> = state
                .tracked
                .iter()
                .map(|(app, dir)| (app.clone(), dir.clone()))
                .collect();
            for (app, dir) in &tracked {
                state.attach(app, dir, &self.tx);
            }
            log!("watch"; "hot reload on ({} apps)", tracked.len());
        } else {
            state.watchers.clear();
            let _ = self.tx.send(Signal::Clear);
            self.queue.take_all();
            log!("watch"; "hot reload off");
        }
    }

    /// Feed a change for `app` as if its watcher had reported one.
    ///
    /// Ignored while disabled or for untracked apps.
    pub fn notify_changed(&self, app: &AppId) -> bool {
        let state = self.state.lock();
        if !state.enabled || !state.tracked.contains_key(app) {
            return false;
        }
        self.tx.send(Signal::Changed(app.clone())).is_ok()
    }

    /// Reload every queued app, oldest first. Owner thread only.
    ///
    /// An app whose operation lock is held is queued again for the next
    /// drain. Apps no longer tracked are dropped.
    pub fn drain(
        &self,
        registry: &mut AppRegistry,
        scheduler: &mut ProcessScheduler,
        locks: &OperationLocks,
    ) -> DrainReport {
        let mut report = DrainReport::default();

        for app in self.queue.take_all() {
            if !self.is_enabled() || !self.is_tracked(&app) {
                debug!("reload"; "{} no longer watched, skipped", app);
                continue;
            }
            let Some(_guard) = locks.try_lock(&app) else {
                debug!("reload"; "{} busy, retrying next drain", app);
                report.deferred.push(app);
                continue;
            };

            let started = Instant::now();
            let outcome = registry.reload(&app, scheduler);
            if outcome.success {
                status_success(&format!("reloaded {} in {:.0?}", app, started.elapsed()));
                report.reloaded.push(app);
            } else {
                status_error(&format!("reload failed: {}", app), &render(&outcome.diagnostics));
                report.failed.push(app);
            }
        }

        for app in &report.deferred {
            self.queue.push(app.clone());
        }
        report
    }
}

impl SourceWatch for HotReloadCoordinator {
    /// Track `dir` for `app`, replacing any previous watcher.
    fn start_watching(&self, app: &AppId, dir: &Path) {
        let mut state = self.state.lock();
        state.tracked.insert(app.clone(), dir.to_path_buf());
        state.watchers.remove(app);
        if state.enabled {
            state.attach(app, dir, &self.tx);
        }
    }

    fn stop_watching(&self, app: &AppId) {
        let mut state = self.state.lock();
        state.tracked.remove(app);
        if state.watchers.remove(app).is_some() {
            debug!("watch"; "{}: stopped watching", app);
        }
        let _ = self.tx.send(Signal::Cancel(app.clone()));
        self.queue.remove(app);
    }
}

impl Drop for HotReloadCoordinator {
    fn drop(&mut self) {
        self.state.get_mut().watchers.clear();
        let _ = self.tx.send(Signal::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Debounce thread: sleeps until the earliest timer, then queues due apps.
fn debounce_loop(rx: Receiver<Signal>, delay: Duration, queue: &PendingReloadQueue) {
    let mut debouncer = Debouncer::new(delay);

    loop {
        let signal = match debouncer.next_wait(Instant::now()) {
            Some(wait) => rx.recv_timeout(wait),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match signal {
            Ok(Signal::Changed(app)) => debouncer.touch(app, Instant::now()),
            Ok(Signal::Cancel(app)) => debouncer.cancel(&app),
            Ok(Signal::Clear) => debouncer.clear(),
            Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        for app in debouncer.take_due(Instant::now()) {
            if queue.push(app.clone()) {
                debug!("watch"; "{} queued for reload", app);
            }
        }
    }
}
