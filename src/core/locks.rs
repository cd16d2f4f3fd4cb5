//! Per-app operation locks.
//!
//! Reload, install and uninstall of the same app never overlap. Different
//! apps proceed independently.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RawMutex, lock_api::ArcMutexGuard};

use super::AppId;

/// Held for the duration of one operation on one app.
pub type OperationGuard = ArcMutexGuard<RawMutex, ()>;

#[derive(Debug, Clone, Default)]
pub struct OperationLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl OperationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, app: &AppId) -> Arc<Mutex<()>> {
        // clone out so the shard lock is released before waiting
        self.locks.entry(app.key().to_string()).or_default().clone()
    }

    /// Block until the app is free.
    pub fn lock(&self, app: &AppId) -> OperationGuard {
        self.slot(app).lock_arc()
    }

    /// Take the app's lock if nobody holds it.
    pub fn try_lock(&self, app: &AppId) -> Option<OperationGuard> {
        self.slot(app).try_lock_arc()
    }

    pub fn is_locked(&self, app: &AppId) -> bool {
        self.locks
            .get(app.key())
            .is_some_and(|slot| slot.is_locked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_app_excludes() {
        let locks = OperationLocks::new();
        let guard = locks.try_lock(&AppId::from("CALC")).unwrap();
        assert!(locks.is_locked(&AppId::from("calc")));
        assert!(locks.try_lock(&AppId::from("Calc")).is_none());
        assert!(locks.try_lock(&AppId::from("NOTES")).is_some());

        drop(guard);
        assert!(!locks.is_locked(&AppId::from("CALC")));
        assert!(locks.try_lock(&AppId::from("CALC")).is_some());
    }

    #[test]
    fn test_blocking_lock_waits_across_threads() {
        let locks = OperationLocks::new();
        let calc = AppId::from("CALC");
        let guard = locks.lock(&calc);

        let other = locks.clone();
        let id = calc.clone();
        let waiter = std::thread::spawn(move || {
            let _guard = other.lock(&id);
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.join().unwrap();
    }
}
