use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::core::AppId;

pub(crate) const DEBOUNCE_MS: u64 = 300;

/// Pure debouncer: per-app timers, no threads, no clock.
///
/// Every change restarts the app's timer. An app becomes due once its
/// timer runs out, and its timer is then discarded.
pub(super) struct Debouncer {
    delay: Duration,
    deadlines: FxHashMap<AppId, Instant>,
}

impl Debouncer {
    pub(super) fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadlines: FxHashMap::default(),
        }
    }

    /// Record a change, restarting the app's timer.
    pub(super) fn touch(&mut self, app: AppId, now: Instant) {
        self.deadlines.insert(app, now + self.delay);
    }

    pub(super) fn cancel(&mut self, app: &AppId) {
        self.deadlines.remove(app);
    }

    pub(super) fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub(super) fn is_pending(&self, app: &AppId) -> bool {
        self.deadlines.contains_key(app)
    }

    /// Remove and return every due app, earliest deadline first.
    pub(super) fn take_due(&mut self, now: Instant) -> Vec<AppId> {
        let mut due: Vec<(Instant, AppId)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(app, deadline)| (*deadline, app.clone()))
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.key().cmp(b.1.key())));

        for (_, app) in &due {
            self.deadlines.remove(app);
        }
        due.into_iter().map(|(_, app)| app).collect()
    }

    /// Time until the earliest timer runs out, `None` when idle.
    pub(super) fn next_wait(&self, now: Instant) -> Option<Duration> {
        self.deadlines
            .values()
            .min()
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(DEBOUNCE_MS);

    #[test]
    fn test_burst_collapses_to_one() {
        let mut debouncer = Debouncer::new(DELAY);
        let start = Instant::now();
        let calc = AppId::from("CALC");

        for i in 0..5 {
            debouncer.touch(calc.clone(), start + Duration::from_millis(i * 50));
        }
        // last touch at 200 ms: not due until 500 ms
        assert!(debouncer.take_due(start + Duration::from_millis(450)).is_empty());
        assert_eq!(debouncer.take_due(start + Duration::from_millis(500)), vec![calc.clone()]);
        assert!(!debouncer.is_pending(&calc));
        assert!(debouncer.take_due(start + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_spaced_events_fire_separately() {
        let mut debouncer = Debouncer::new(DELAY);
        let start = Instant::now();
        let calc = AppId::from("CALC");

        let mut fired = 0;
        for i in 0..3 {
            let at = start + Duration::from_millis(i * 1000);
            debouncer.touch(calc.clone(), at);
            fired += debouncer.take_due(at + DELAY).len();
        }
        assert_eq!(fired, 3);
    }

    #[test]
    fn test_due_order_and_wait() {
        let mut debouncer = Debouncer::new(DELAY);
        let start = Instant::now();
        assert_eq!(debouncer.next_wait(start), None);

        debouncer.touch(AppId::from("B"), start + Duration::from_millis(10));
        debouncer.touch(AppId::from("A"), start + Duration::from_millis(20));
        assert_eq!(debouncer.next_wait(start), Some(Duration::from_millis(310)));

        let due = debouncer.take_due(start + Duration::from_secs(1));
        assert_eq!(due, vec![AppId::from("B"), AppId::from("A")]);
    }

    #[test]
    fn test_cancel_and_clear() {
        let mut debouncer = Debouncer::new(DELAY);
        let start = Instant::now();
        debouncer.touch(AppId::from("A"), start);
        debouncer.touch(AppId::from("B"), start);

        debouncer.cancel(&AppId::from("a"));
        assert_eq!(debouncer.take_due(start + DELAY), vec![AppId::from("B")]);

        debouncer.touch(AppId::from("C"), start);
        debouncer.clear();
        assert_eq!(debouncer.next_wait(start), None);
    }
}
