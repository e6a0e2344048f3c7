//! Generic bounded fan-out.
//!
//! A [`FanOut`] pairs a [`QueueWorker`] with a subscriber registry. The
//! dispatch thread takes the registry's read lock and `try_send`s each item
//! into every interested subscriber's bounded inbox; a full inbox drops the
//! item for that subscriber only. Subscribe/unsubscribe take the write lock.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::alert::AlertTrigger;
use crate::cancel::CancelToken;
use crate::error::ExecutionError;
use crate::tick::Tick;

use super::inbox::Inbox;
use super::worker::{Enqueue, Handler, QueueWorker};

/// Items that can be filtered by symbol.
pub(crate) trait Routed: Send + Sync + 'static {
    fn symbol(&self) -> &str;
}

impl Routed for Tick {
    fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Routed for AlertTrigger {
    fn symbol(&self) -> &str {
        &self.alert.symbol
    }
}

/// Which items a subscriber wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Interest {
    All,
    Symbols(HashSet<String>),
}

impl Interest {
    pub(crate) fn symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Symbols(symbols.into_iter().map(Into::into).collect())
    }

    fn matches(&self, symbol: &str) -> bool {
        match self {
            Self::All => true,
            Self::Symbols(set) => set.contains(symbol),
        }
    }
}

/// Point-in-time counters for a fan-out component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FanOutStats {
    pub running: bool,
    pub subscribers: usize,
    /// Items accepted but not yet dispatched.
    pub queued: usize,
    /// Items accepted onto the internal queue.
    pub published: u64,
    /// Items rejected because the internal queue was full or closed.
    pub dropped_at_ingress: u64,
    /// Successful per-subscriber deliveries.
    pub delivered: u64,
    /// Per-subscriber deliveries dropped on a full or abandoned inbox.
    pub dropped_deliveries: u64,
}

#[derive(Debug)]
struct Subscriber<T> {
    interest: Interest,
    tx: Sender<Arc<T>>,
}

#[derive(Debug)]
struct Registry<T> {
    closed: bool,
    subscribers: HashMap<String, Subscriber<T>>,
}

#[derive(Debug)]
struct Subscribers<T> {
    name: &'static str,
    registry: RwLock<Registry<T>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Routed> Subscribers<T> {
    // Critical sections only touch the map, so a poisoned lock still guards
    // a consistent registry.
    fn read(&self) -> RwLockReadGuard<'_, Registry<T>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry<T>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, id: &str, interest: Interest, capacity: usize) -> Inbox<T> {
        let (tx, rx) = bounded::<Arc<T>>(capacity.max(1));
        let mut registry = self.write();

        if registry.closed {
            drop(registry);
            warn!(component = self.name, subscriber = id, "subscribe on stopped component");
            return Inbox::new(id.to_string(), rx);
        }

        let previous = registry
            .subscribers
            .insert(id.to_string(), Subscriber { interest, tx });
        drop(registry);

        if previous.is_some() {
            debug!(component = self.name, subscriber = id, "replaced existing subscription");
        }
        Inbox::new(id.to_string(), rx)
    }

    fn unsubscribe(&self, id: &str) -> bool {
        self.write().subscribers.remove(id).is_some()
    }

    fn set_interest(&self, id: &str, interest: Interest) -> bool {
        match self.write().subscribers.get_mut(id) {
            Some(sub) => {
                sub.interest = interest;
                true
            }
            None => false,
        }
    }

    /// Drops every sender so each inbox disconnects once drained.
    fn close_all(&self) {
        let mut registry = self.write();
        registry.closed = true;
        registry.subscribers.clear();
    }

    fn fan_out(&self, item: &Arc<T>) {
        let registry = self.read();
        for (id, sub) in &registry.subscribers {
            if !sub.interest.matches(item.symbol()) {
                continue;
            }
            match sub.tx.try_send(Arc::clone(item)) {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(component = self.name, subscriber = %id, "inbox full, dropping");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(component = self.name, subscriber = %id, "inbox abandoned, dropping");
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.read().subscribers.len()
    }

    fn count_interested(&self, symbol: &str) -> usize {
        self.read()
            .subscribers
            .values()
            .filter(|s| s.interest.matches(symbol))
            .count()
    }

    fn symbols(&self) -> Vec<String> {
        let registry = self.read();
        let mut out = BTreeSet::new();
        for sub in registry.subscribers.values() {
            if let Interest::Symbols(set) = &sub.interest {
                out.extend(set.iter().cloned());
            }
        }
        out.into_iter().collect()
    }
}

struct Dispatch<T> {
    subscribers: Arc<Subscribers<T>>,
}

impl<T: Routed> Handler<Arc<T>> for Dispatch<T> {
    fn handle(&mut self, item: Arc<T>) {
        self.subscribers.fan_out(&item);
    }

    fn on_cancel(&mut self) {
        self.subscribers.close_all();
    }
}

/// Queue plus subscriber registry plus one dispatch thread.
#[derive(Debug)]
pub(crate) struct FanOut<T: Routed> {
    subscribers: Arc<Subscribers<T>>,
    worker: QueueWorker<Arc<T>>,
}

impl<T: Routed> FanOut<T> {
    pub(crate) fn new(name: &'static str, queue_capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Subscribers {
                name,
                registry: RwLock::new(Registry {
                    closed: false,
                    subscribers: HashMap::new(),
                }),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            worker: QueueWorker::new(name, queue_capacity),
        }
    }

    pub(crate) fn start(&self, cancel: &CancelToken) -> Result<(), ExecutionError> {
        self.worker.start(
            cancel,
            Dispatch {
                subscribers: Arc::clone(&self.subscribers),
            },
        )
    }

    pub(crate) fn stop(&self) {
        self.subscribers.close_all();
        self.worker.stop();
    }

    /// Returns whether the item was queued.
    pub(crate) fn publish(&self, item: T) -> bool {
        match self.worker.try_enqueue(Arc::new(item)) {
            Enqueue::Accepted => true,
            Enqueue::Full => {
                trace!(component = self.subscribers.name, "queue full, dropping");
                false
            }
            Enqueue::Closed => {
                trace!(component = self.subscribers.name, "queue closed, dropping");
                false
            }
        }
    }

    pub(crate) fn subscribe(&self, id: &str, interest: Interest, capacity: usize) -> Inbox<T> {
        self.subscribers.subscribe(id, interest, capacity)
    }

    pub(crate) fn unsubscribe(&self, id: &str) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub(crate) fn set_interest(&self, id: &str, interest: Interest) -> bool {
        self.subscribers.set_interest(id, interest)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn subscriber_count_for(&self, symbol: &str) -> usize {
        self.subscribers.count_interested(symbol)
    }

    pub(crate) fn interest_symbols(&self) -> Vec<String> {
        self.subscribers.symbols()
    }

    pub(crate) fn stats(&self) -> FanOutStats {
        FanOutStats {
            running: self.worker.is_running(),
            subscribers: self.subscribers.len(),
            queued: self.worker.queued(),
            published: self.worker.accepted(),
            dropped_at_ingress: self.worker.dropped(),
            delivered: self.subscribers.delivered.load(Ordering::Relaxed),
            dropped_deliveries: self.subscribers.dropped.load(Ordering::Relaxed),
        }
    }
}

impl<T: Routed> Drop for FanOut<T> {
    fn drop(&mut self) {
        self.subscribers.close_all();
    }
}
