//! Pending reload queue.
//!
//! Deduplicated FIFO of app ids awaiting reload. Filled by the debounce
//! thread, drained only by the owner thread.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::core::AppId;

#[derive(Debug, Default)]
pub struct PendingReloadQueue {
    ids: Mutex<VecDeque<AppId>>,
}

impl PendingReloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue unless already present. Returns whether it was added.
    pub fn push(&self, app: AppId) -> bool {
        let mut ids = self.ids.lock();
        if ids.contains(&app) {
            return false;
        }
        ids.push_back(app);
        true
    }

    pub fn pop(&self) -> Option<AppId> {
        self.ids.lock().pop_front()
    }

    /// Take everything queued right now, in order.
    pub fn take_all(&self) -> Vec<AppId> {
        self.ids.lock().drain(..).collect()
    }

    pub fn remove(&self, app: &AppId) -> bool {
        let mut ids = self.ids.lock();
        let before = ids.len();
        ids.retain(|queued| queued != app);
        ids.len() != before
    }

    pub fn contains(&self, app: &AppId) -> bool {
        self.ids.lock().contains(app)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}
