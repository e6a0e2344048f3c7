use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::alert::AlertTrigger;
use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::pubsub::worker::{Enqueue, Handler, QueueWorker};
use crate::pubsub::TriggerBus;
use crate::storage::{AlertStore, StoreError};
use crate::tick::Tick;

use super::cooldown::CooldownTracker;

/// Default capacity of the engine's ingress queue.
pub const DEFAULT_ENGINE_QUEUE_CAPACITY: usize = 1_000;

/// Default minimum gap between two triggers of one alert.
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

/// What to do when an alert fires but the store no longer knows it
/// (deleted between evaluation and `mark_triggered`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Publish the trigger with the pre-deletion snapshot.
    #[default]
    Publish,
    /// Drop the trigger.
    Suppress,
}

/// Read-only engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct EngineStats {
    pub running: bool,
    pub cooldown_entries: usize,
    pub queued_ticks: usize,
    /// Ticks fully evaluated, whether or not anything fired.
    pub evaluated_ticks: u64,
    /// Ticks rejected at ingress.
    pub dropped_ticks: u64,
    pub triggers_emitted: u64,
    /// `mark_triggered` calls that failed inside the trigger path.
    pub mark_failures: u64,
}

struct Evaluator {
    store: Arc<dyn AlertStore>,
    bus: Arc<TriggerBus>,
    clock: Arc<dyn Clock>,
    cooldowns: CooldownTracker,
    orphan_policy: OrphanPolicy,
    evaluated: AtomicU64,
    triggers_emitted: AtomicU64,
    mark_failures: AtomicU64,
}

impl Evaluator {
    fn evaluate(&self, tick: &Tick) -> Vec<AlertTrigger> {
        let alerts = match self.store.get_enabled_by_symbol(&tick.symbol) {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(error = %e, symbol = %tick.symbol, "failed to load alerts for tick");
                self.evaluated.fetch_add(1, Ordering::Release);
                return Vec::new();
            }
        };

        let mut fired = Vec::new();
        for mut alert in alerts {
            if !alert.should_trigger(tick.price) {
                continue;
            }
            if !self.cooldowns.try_claim(&alert.id, self.clock.now()) {
                trace!(alert_id = %alert.id, "suppressed by cooldown");
                continue;
            }

            let timestamp = match self.store.mark_triggered(&alert.id) {
                Ok(at) => {
                    alert.last_trigger = Some(at);
                    at
                }
                Err(e) => {
                    self.mark_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, alert_id = %alert.id, "failed to mark alert as triggered");
                    if matches!(e, StoreError::AlertNotFound(_))
                        && self.orphan_policy == OrphanPolicy::Suppress
                    {
                        debug!(alert_id = %alert.id, "dropping trigger for deleted alert");
                        continue;
                    }
                    self.clock.now()
                }
            };

            info!(
                alert_id = %alert.id,
                symbol = %alert.symbol,
                comparator = %alert.comparator,
                threshold = alert.threshold,
                price = tick.price,
                "alert triggered"
            );

            let trigger = AlertTrigger::new(alert, tick.price, timestamp);
            self.bus.publish(trigger.clone());
            self.triggers_emitted.fetch_add(1, Ordering::Relaxed);
            fired.push(trigger);
        }
        self.evaluated.fetch_add(1, Ordering::Release);
        fired
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("clock", &self.clock)
            .field("cooldowns", &self.cooldowns)
            .field("orphan_policy", &self.orphan_policy)
            .field(
                "triggers_emitted",
                &self.triggers_emitted.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

struct Evaluate(Arc<Evaluator>);

impl Handler<Tick> for Evaluate {
    fn handle(&mut self, tick: Tick) {
        self.0.evaluate(&tick);
    }
}

/// Turns ticks into alert triggers.
///
/// Ticks are queued by [`RuleEngine::process_tick`] and evaluated one at a
/// time, in order, on a dedicated thread. For every enabled alert on the
/// tick's symbol that fires and is out of cooldown, the engine records the
/// trigger in the store and publishes an [`AlertTrigger`] to the bus.
#[derive(Debug)]
pub struct RuleEngine {
    evaluator: Arc<Evaluator>,
    worker: QueueWorker<Tick>,
}

impl RuleEngine {
    /// Engine reading time from the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>, bus: Arc<TriggerBus>, config: &EngineConfig) -> Self {
        Self::with_clock(store, bus, config, Arc::new(SystemClock))
    }

    /// Same as [`RuleEngine::new`], reading time from `clock`.
    #[must_use]
    pub fn with_clock(
        store: Arc<dyn AlertStore>,
        bus: Arc<TriggerBus>,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // Windows beyond chrono's range saturate to a century.
        let window = chrono::Duration::from_std(config.cooldown())
            .unwrap_or_else(|_| chrono::Duration::days(36_500));

        Self {
            evaluator: Arc::new(Evaluator {
                store,
                bus,
                clock,
                cooldowns: CooldownTracker::new(window),
                orphan_policy: config.orphan_policy,
                evaluated: AtomicU64::new(0),
                triggers_emitted: AtomicU64::new(0),
                mark_failures: AtomicU64::new(0),
            }),
            worker: QueueWorker::new("rule-engine", config.queue_capacity),
        }
    }

    /// Launches the evaluation thread. Idempotent while running.
    pub fn start(&self, cancel: &CancelToken) -> Result<(), ExecutionError> {
        self.worker.start(cancel, Evaluate(Arc::clone(&self.evaluator)))
    }

    /// Halts evaluation and closes the queue. Idempotent.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Queues a tick for evaluation without blocking. Returns false if the
    /// tick was dropped.
    pub fn process_tick(&self, tick: Tick) -> bool {
        match self.worker.try_enqueue(tick) {
            Enqueue::Accepted => true,
            Enqueue::Full => {
                warn!(
                    dropped = self.worker.dropped(),
                    "rule engine queue full, dropping tick"
                );
                false
            }
            Enqueue::Closed => {
                debug!("rule engine stopped, dropping tick");
                false
            }
        }
    }

    /// Evaluates `tick` on the calling thread, exactly as the dispatch loop
    /// would, and returns the triggers it emitted.
    pub fn evaluate_tick(&self, tick: &Tick) -> Vec<AlertTrigger> {
        self.evaluator.evaluate(tick)
    }

    /// Forgets cooldown entries older than twice the cooldown window.
    /// Returns the number removed.
    pub fn cleanup_cooldowns(&self) -> usize {
        let purged = self
            .evaluator
            .cooldowns
            .purge(self.evaluator.clock.now());
        debug!(purged, "cooldown cleanup");
        purged
    }

    /// Snapshot of the engine counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            running: self.worker.is_running(),
            cooldown_entries: self.evaluator.cooldowns.len(),
            queued_ticks: self.worker.queued(),
            evaluated_ticks: self.evaluator.evaluated.load(Ordering::Acquire),
            dropped_ticks: self.worker.dropped(),
            triggers_emitted: self.evaluator.triggers_emitted.load(Ordering::Relaxed),
            mark_failures: self.evaluator.mark_failures.load(Ordering::Relaxed),
        }
    }
}
