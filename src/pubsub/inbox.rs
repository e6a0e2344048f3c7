use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{timeout_ms, ExecutionError, PriceWatchError, PriceWatchResult};

/// Receiving side of a subscription.
///
/// The inbox is bounded; when it is full the dispatcher drops new items for
/// this subscriber only. It becomes disconnected (after draining whatever is
/// buffered) once the subscription is removed, replaced, or the component is
/// stopped.
#[derive(Debug)]
pub struct Inbox<T> {
    subscriber_id: String,
    rx: Receiver<Arc<T>>,
}

impl<T> Inbox<T> {
    pub(crate) fn new(subscriber_id: String, rx: Receiver<Arc<T>>) -> Self {
        Self { subscriber_id, rx }
    }

    /// The subscriber id this inbox was registered under.
    #[must_use]
    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    /// Receive the next item (blocking).
    pub fn recv(&self) -> PriceWatchResult<Arc<T>> {
        self.rx.recv().map_err(|_| self.disconnected())
    }

    /// Receive the next item with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> PriceWatchResult<Arc<T>> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => PriceWatchError::Execution(ExecutionError::Timeout {
                duration_ms: timeout_ms(timeout),
            }),
            RecvTimeoutError::Disconnected => self.disconnected(),
        })
    }

    /// Next buffered item, if any. Never blocks.
    pub fn try_recv(&self) -> Option<Arc<T>> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drains everything currently buffered.
    pub fn drain(&self) -> Vec<Arc<T>> {
        self.rx.try_iter().collect()
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// The underlying channel, for use in a caller's own `select!`.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<Arc<T>> {
        &self.rx
    }

    fn disconnected(&self) -> PriceWatchError {
        PriceWatchError::Execution(ExecutionError::Disconnected {
            path: format!("inbox:{}", self.subscriber_id),
        })
    }
}
