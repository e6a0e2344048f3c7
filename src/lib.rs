//! # PriceWatch - in-process price alert data plane
//!
//! PriceWatch ingests a stream of price ticks and lets clients watch live
//! prices for the symbols they pick and define threshold alerts that fire a
//! trigger event when crossed, with a per-alert cooldown against trigger spam.
//!
//! ## Core Components
//!
//! - **TickBroker**: symbol-filtered fan-out of ticks to bounded inboxes
//! - **AlertStore**: thread-safe alert registry indexed by symbol
//! - **RuleEngine**: evaluates ticks against enabled alerts, applies cooldown
//! - **TriggerBus**: unfiltered fan-out of alert triggers
//!
//! Every component runs its own dispatch thread fed by a bounded queue.
//! Publishing never blocks: overload drops items, per queue and per
//! subscriber, and is visible only through stats and logs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pricewatch::{Comparator, PriceWatch, PriceWatchConfig, Tick};
//!
//! let pw = PriceWatch::new(PriceWatchConfig::default())?;
//! pw.start()?;
//!
//! pw.create_alert("BTC", Comparator::Gt, 50_000.0, "breakout")?;
//! let triggers = pw.watch_triggers();
//!
//! pw.ingest(Tick::new("BTC", 50_001.0));
//! let fired = triggers.recv_timeout(std::time::Duration::from_secs(1))?;
//! assert_eq!(fired.alert.symbol, "BTC");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Models
pub mod alert;
pub mod tick;

// Runtime support
pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;

// Core components
pub mod pubsub;
pub mod rules;
pub mod storage;

// Collaborators
pub mod feed;
pub mod service;

pub use alert::{Alert, AlertId, AlertTrigger, AlertUpdate, Comparator};
pub use cancel::CancelToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PriceWatchConfig;
pub use error::{
    ConfigError, ExecutionError, PriceWatchError, PriceWatchResult, ValidationError,
};
pub use feed::MockFeed;
pub use pubsub::{FanOutStats, Inbox, Subscription, TickBroker, TriggerBus};
pub use rules::{EngineStats, OrphanPolicy, RuleEngine};
pub use service::PriceWatch;
pub use storage::{AlertStore, InMemoryAlertStore, StoreError};
pub use tick::Tick;
