//! Publish/subscribe plumbing.
//!
//! Both fan-out components share one shape: a bounded ingress queue drained
//! by a single named dispatch thread, and a registry of bounded subscriber
//! inboxes behind a reader/writer lock. Nothing on the publish or dispatch
//! path ever blocks; overload is absorbed by dropping items.

/// Symbol-filtered tick fan-out.
pub mod broker;
mod fanout;
/// Subscriber inbox handle.
pub mod inbox;
/// Self-unsubscribing inbox guard.
pub mod subscription;
/// Unfiltered trigger fan-out.
pub mod trigger_bus;
pub(crate) mod worker;

pub use broker::{TickBroker, DEFAULT_BROKER_QUEUE_CAPACITY};
pub use fanout::FanOutStats;
pub use inbox::Inbox;
pub use subscription::{PriceSubscription, Subscription, TriggerSubscription};
pub use trigger_bus::{TriggerBus, DEFAULT_TRIGGER_QUEUE_CAPACITY};
