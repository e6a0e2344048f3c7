//! Single-threaded queue worker.
//!
//! Owns a bounded ingress queue and, once started, one dedicated dispatch
//! thread that drains it in FIFO order. Producers enqueue with `try_send` and
//! are never blocked; a full or closed queue drops the item and bumps a
//! counter. The tick broker, the trigger bus and the rule engine are all
//! built on this.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::ExecutionError;

/// Per-item callback run on the dispatch thread.
pub(crate) trait Handler<T>: Send + 'static {
    fn handle(&mut self, item: T);

    /// Runs once if the loop exits because the cancel token fired.
    fn on_cancel(&mut self) {}
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Accepted,
    Full,
    Closed,
}

#[derive(Debug)]
struct Ingress<T> {
    tx: RwLock<Option<Sender<T>>>,
    running: AtomicBool,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl<T> Ingress<T> {
    /// Closes the queue. Returns true if this call closed it.
    fn close(&self) -> bool {
        self.running.store(false, Ordering::Release);
        let sender = self
            .tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        sender.is_some()
    }
}

#[derive(Debug)]
enum Lifecycle<T> {
    Idle(Receiver<T>),
    Running(JoinHandle<()>),
    Stopped,
}

#[derive(Debug)]
pub(crate) struct QueueWorker<T> {
    name: &'static str,
    capacity: usize,
    ingress: Arc<Ingress<T>>,
    lifecycle: Mutex<Lifecycle<T>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
}

impl<T: Send + 'static> QueueWorker<T> {
    pub(crate) fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded::<T>(capacity);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        Self {
            name,
            capacity,
            ingress: Arc::new(Ingress {
                tx: RwLock::new(Some(tx)),
                running: AtomicBool::new(false),
                accepted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            lifecycle: Mutex::new(Lifecycle::Idle(rx)),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
        }
    }

    /// Launches the dispatch thread. A second call while running is a no-op;
    /// a call after stop fails.
    pub(crate) fn start<H>(&self, cancel: &CancelToken, mut handler: H) -> Result<(), ExecutionError>
    where
        H: Handler<T>,
    {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let rx = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(rx) => rx,
            Lifecycle::Running(handle) => {
                *lifecycle = Lifecycle::Running(handle);
                return Ok(());
            }
            Lifecycle::Stopped => {
                return Err(ExecutionError::Stopped {
                    component: self.name.to_string(),
                });
            }
        };

        self.ingress.running.store(true, Ordering::Release);

        let ingress = Arc::clone(&self.ingress);
        let stop_rx = self.stop_rx.clone();
        let cancel_rx = cancel.listener();
        let name = self.name;

        let spawned = thread::Builder::new()
            .name(format!("pricewatch-{name}"))
            .spawn(move || {
                loop {
                    select! {
                        recv(rx) -> msg => match msg {
                            Ok(item) => {
                                if !ingress.running.load(Ordering::Acquire) {
                                    break;
                                }
                                handler.handle(item);
                            }
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => break,
                        recv(cancel_rx) -> _ => {
                            ingress.close();
                            handler.on_cancel();
                            debug!(component = name, "dispatch loop cancelled");
                            break;
                        }
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                *lifecycle = Lifecycle::Running(handle);
                info!(component = name, capacity = self.capacity, "dispatch loop started");
                Ok(())
            }
            Err(e) => {
                self.ingress.close();
                Err(ExecutionError::Spawn {
                    component: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Non-blocking enqueue; drops the item when the queue is full or closed.
    pub(crate) fn try_enqueue(&self, item: T) -> Enqueue {
        let guard = self.ingress.tx.read().unwrap_or_else(PoisonError::into_inner);
        let outcome = match guard.as_ref() {
            None => Enqueue::Closed,
            Some(tx) => match tx.try_send(item) {
                Ok(()) => Enqueue::Accepted,
                Err(TrySendError::Full(_)) => Enqueue::Full,
                Err(TrySendError::Disconnected(_)) => Enqueue::Closed,
            },
        };
        drop(guard);

        if outcome == Enqueue::Accepted {
            self.ingress.accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ingress.dropped.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Halts the dispatch loop and closes the queue. Idempotent; returns true
    /// only for the call that actually stopped the worker.
    pub(crate) fn stop(&self) -> bool {
        let closed_now = self.ingress.close();
        drop(
            self.stop_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handle = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(handle) => Some(handle),
                Lifecycle::Idle(_) | Lifecycle::Stopped => None,
            }
        };

        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        if closed_now {
            info!(component = self.name, "dispatch loop stopped");
        }
        closed_now
    }

    pub(crate) fn is_running(&self) -> bool {
        self.ingress.running.load(Ordering::Acquire)
    }

    /// Items currently waiting in the queue.
    pub(crate) fn queued(&self) -> usize {
        self.ingress
            .tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Sender::len)
    }

    pub(crate) fn accepted(&self) -> u64 {
        self.ingress.accepted.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.ingress.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Drop for QueueWorker<T> {
    fn drop(&mut self) {
        // Close channels so the thread exits on its own; do not join here.
        self.ingress.close();
        if let Ok(mut stop_tx) = self.stop_tx.lock() {
            stop_tx.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Forward(Sender<u32>);

    impl Handler<u32> for Forward {
        fn handle(&mut self, item: u32) {
            let _ = self.0.send(item);
        }
    }

    #[test]
    fn processes_items_in_fifo_order() {
        let worker = QueueWorker::<u32>::new("test-fifo", 16);
        let (out_tx, out_rx) = bounded(16);
        let cancel = CancelToken::new();

        for i in 0..10 {
            assert_eq!(worker.try_enqueue(i), Enqueue::Accepted);
        }
        worker.start(&cancel, Forward(out_tx)).unwrap();

        let got: Vec<u32> = (0..10)
            .map(|_| out_rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
        assert_eq!(worker.accepted(), 10);
        worker.stop();
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let worker = QueueWorker::<u32>::new("test-full", 2);
        assert_eq!(worker.try_enqueue(1), Enqueue::Accepted);
        assert_eq!(worker.try_enqueue(2), Enqueue::Accepted);
        assert_eq!(worker.try_enqueue(3), Enqueue::Full);
        assert_eq!(worker.queued(), 2);
        assert_eq!(worker.dropped(), 1);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let worker = QueueWorker::<u32>::new("test-idem", 4);
        let (out_tx, _out_rx) = bounded(4);
        let cancel = CancelToken::new();

        worker.start(&cancel, Forward(out_tx.clone())).unwrap();
        worker.start(&cancel, Forward(out_tx.clone())).unwrap();
        assert!(worker.is_running());

        assert!(worker.stop());
        assert!(!worker.stop());
        assert!(!worker.is_running());
        assert_eq!(worker.try_enqueue(7), Enqueue::Closed);

        let err = worker.start(&cancel, Forward(out_tx)).unwrap_err();
        assert!(matches!(err, ExecutionError::Stopped { .. }));
    }

    #[test]
    fn cancel_token_halts_loop_and_closes_queue() {
        struct Flag(Sender<()>);
        impl Handler<u32> for Flag {
            fn handle(&mut self, _item: u32) {}
            fn on_cancel(&mut self) {
                let _ = self.0.send(());
            }
        }

        let worker = QueueWorker::<u32>::new("test-cancel", 4);
        let (flag_tx, flag_rx) = bounded(1);
        let cancel = CancelToken::new();
        worker.start(&cancel, Flag(flag_tx)).unwrap();

        cancel.cancel();
        flag_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(!worker.is_running());
        assert_eq!(worker.try_enqueue(1), Enqueue::Closed);
        // Stop after cancellation is still fine.
        worker.stop();
    }
}
