use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::alert::AlertId;

/// Last-trigger times per alert, under a lock of its own.
///
/// This lock is never held while calling into the store.
#[derive(Debug)]
pub(crate) struct CooldownTracker {
    window: Duration,
    last: Mutex<HashMap<AlertId, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<AlertId, DateTime<Utc>>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `now` for `id` if the window has elapsed since its last
    /// trigger (or it never fired). Returns whether the claim succeeded.
    pub(crate) fn try_claim(&self, id: &AlertId, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        if let Some(last) = entries.get(id) {
            if now - *last < self.window {
                return false;
            }
        }
        entries.insert(id.clone(), now);
        true
    }

    /// Removes entries older than twice the window. Returns how many went.
    pub(crate) fn purge(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window * 2;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, last| *last >= cutoff);
        before - entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_respects_window_boundary() {
        let tracker = CooldownTracker::new(Duration::seconds(30));
        let id = AlertId::from("a");
        let t0 = Utc::now();

        assert!(tracker.try_claim(&id, t0));
        assert!(!tracker.try_claim(&id, t0 + Duration::seconds(29)));
        assert!(tracker.try_claim(&id, t0 + Duration::seconds(30)));
        assert!(!tracker.try_claim(&id, t0 + Duration::seconds(31)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn alerts_cool_down_independently() {
        let tracker = CooldownTracker::new(Duration::seconds(30));
        let t0 = Utc::now();
        assert!(tracker.try_claim(&AlertId::from("a"), t0));
        assert!(tracker.try_claim(&AlertId::from("b"), t0));
    }

    #[test]
    fn purge_drops_entries_older_than_two_windows() {
        let tracker = CooldownTracker::new(Duration::seconds(30));
        let t0 = Utc::now();
        tracker.try_claim(&AlertId::from("old"), t0);
        tracker.try_claim(&AlertId::from("recent"), t0 + Duration::seconds(50));

        assert_eq!(tracker.purge(t0 + Duration::seconds(60)), 0);
        assert_eq!(tracker.purge(t0 + Duration::seconds(61)), 1);
        assert_eq!(tracker.len(), 1);
    }
}
