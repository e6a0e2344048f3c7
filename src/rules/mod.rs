//! Rule evaluation.
//!
//! The [`RuleEngine`] consumes ticks, evaluates the enabled alerts for each
//! tick's symbol, applies a per-alert cooldown and publishes triggers to the
//! [`TriggerBus`](crate::pubsub::TriggerBus). The cooldown map has its own
//! lock and is never held together with the store's.

mod cooldown;
/// Tick evaluation engine.
pub mod engine;

pub use engine::{
    EngineStats, OrphanPolicy, RuleEngine, DEFAULT_COOLDOWN_SECS, DEFAULT_ENGINE_QUEUE_CAPACITY,
};
