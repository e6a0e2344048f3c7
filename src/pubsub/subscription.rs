use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::alert::AlertTrigger;
use crate::tick::Tick;

use super::broker::TickBroker;
use super::inbox::Inbox;
use super::trigger_bus::TriggerBus;

/// A component that can drop a subscriber by id.
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: &str) -> bool;
}

impl Unsubscribe for TickBroker {
    fn unsubscribe(&self, id: &str) -> bool {
        TickBroker::unsubscribe(self, id)
    }
}

impl Unsubscribe for TriggerBus {
    fn unsubscribe(&self, id: &str) -> bool {
        TriggerBus::unsubscribe(self, id)
    }
}

/// An [`Inbox`] tied to its registration: dropping the guard unsubscribes.
///
/// Derefs to the inbox, so `recv`, `recv_timeout` and friends are available
/// directly.
pub struct Subscription<T> {
    inbox: Inbox<T>,
    source: Arc<dyn Unsubscribe>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(inbox: Inbox<T>, source: Arc<dyn Unsubscribe>) -> Self {
        Self { inbox, source }
    }

    /// Unsubscribes now rather than on drop.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Deref for Subscription<T> {
    type Target = Inbox<T>;

    fn deref(&self) -> &Self::Target {
        &self.inbox
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.source.unsubscribe(self.inbox.subscriber_id());
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriber_id", &self.inbox.subscriber_id())
            .field("buffered", &self.inbox.len())
            .finish_non_exhaustive()
    }
}

/// Live price watch.
pub type PriceSubscription = Subscription<Tick>;

/// Live trigger watch.
pub type TriggerSubscription = Subscription<AlertTrigger>;
