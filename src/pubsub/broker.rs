use crate::cancel::CancelToken;
use crate::error::ExecutionError;
use crate::tick::Tick;

use super::fanout::{FanOut, FanOutStats, Interest};
use super::inbox::Inbox;

/// Default capacity of the broker's ingress queue.
pub const DEFAULT_BROKER_QUEUE_CAPACITY: usize = 10_000;

/// Symbol-filtered fan-out of price ticks.
///
/// Each subscriber names the symbols it cares about and gets its own bounded
/// [`Inbox`]. `publish` never blocks: a full ingress queue drops the tick, and
/// a full inbox drops it for that subscriber only.
#[derive(Debug)]
pub struct TickBroker {
    fanout: FanOut<Tick>,
}

impl TickBroker {
    /// Broker with the default ingress capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROKER_QUEUE_CAPACITY)
    }

    /// Broker whose ingress queue holds `queue_capacity` ticks (at least 1).
    #[must_use]
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            fanout: FanOut::new("tick-broker", queue_capacity),
        }
    }

    /// Launches the dispatch thread. Idempotent while running; fails once the
    /// broker has been stopped.
    pub fn start(&self, cancel: &CancelToken) -> Result<(), ExecutionError> {
        self.fanout.start(cancel)
    }

    /// Halts dispatch and closes the queue and every inbox. Idempotent.
    pub fn stop(&self) {
        self.fanout.stop();
    }

    /// Registers `id` for ticks on `symbols`. An existing subscription under
    /// the same id is closed and replaced.
    pub fn subscribe<I, S>(&self, id: &str, symbols: I, capacity: usize) -> Inbox<Tick>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fanout.subscribe(id, Interest::symbols(symbols), capacity)
    }

    /// Closes and removes `id`. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.fanout.unsubscribe(id)
    }

    /// Replaces the symbol set of an existing subscriber without touching its
    /// inbox. Returns false if `id` is unknown.
    pub fn update_subscription<I, S>(&self, id: &str, symbols: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fanout.set_interest(id, Interest::symbols(symbols))
    }

    /// Queues a tick for dispatch. Returns false if it was dropped.
    pub fn publish(&self, tick: Tick) -> bool {
        self.fanout.publish(tick)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.fanout.subscriber_count()
    }

    /// Number of subscribers whose interest set contains `symbol`.
    #[must_use]
    pub fn subscriber_count_for_symbol(&self, symbol: &str) -> usize {
        self.fanout.subscriber_count_for(symbol)
    }

    /// Union of every subscriber's symbols, sorted.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<String> {
        self.fanout.interest_symbols()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> FanOutStats {
        self.fanout.stats()
    }
}

impl Default for TickBroker {
    fn default() -> Self {
        Self::new()
    }
}
