use crate::alert::AlertTrigger;
use crate::cancel::CancelToken;
use crate::error::ExecutionError;

use super::fanout::{FanOut, FanOutStats, Interest};
use super::inbox::Inbox;

/// Default capacity of the trigger bus ingress queue.
pub const DEFAULT_TRIGGER_QUEUE_CAPACITY: usize = 1_000;

/// Unfiltered fan-out of alert triggers: every subscriber sees every trigger.
#[derive(Debug)]
pub struct TriggerBus {
    fanout: FanOut<AlertTrigger>,
}

impl TriggerBus {
    /// Bus with the default ingress capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRIGGER_QUEUE_CAPACITY)
    }

    /// Bus whose ingress queue holds `queue_capacity` triggers (at least 1).
    #[must_use]
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            fanout: FanOut::new("trigger-bus", queue_capacity),
        }
    }

    /// Spawns the dispatch thread. Errors once the bus has been stopped.
    pub fn start(&self, cancel: &CancelToken) -> Result<(), ExecutionError> {
        self.fanout.start(cancel)
    }

    /// Closes every inbox and joins the dispatch thread.
    pub fn stop(&self) {
        self.fanout.stop();
    }

    /// Registers `id`; replaces any existing subscription with that id.
    pub fn subscribe(&self, id: &str, capacity: usize) -> Inbox<AlertTrigger> {
        self.fanout.subscribe(id, Interest::All, capacity)
    }

    /// Removes `id`. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.fanout.unsubscribe(id)
    }

    /// Queues a trigger for dispatch. Returns false if it was dropped.
    pub fn publish(&self, trigger: AlertTrigger) -> bool {
        self.fanout.publish(trigger)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.fanout.subscriber_count()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> FanOutStats {
        self.fanout.stats()
    }
}

impl Default for TriggerBus {
    fn default() -> Self {
        Self::new()
    }
}
