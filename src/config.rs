//! Runtime configuration.
//!
//! Every struct is `#[serde(default)]`, so a JSON file only needs the keys it
//! overrides. Defaults reproduce the production tuning: a deep broker queue,
//! shallower engine and trigger queues, 100-slot subscriber inboxes, a 30s
//! cooldown purged every five minutes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pubsub::{DEFAULT_BROKER_QUEUE_CAPACITY, DEFAULT_TRIGGER_QUEUE_CAPACITY};
use crate::rules::{OrphanPolicy, DEFAULT_COOLDOWN_SECS, DEFAULT_ENGINE_QUEUE_CAPACITY};

/// Default capacity of a subscriber inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 100;

/// Longest accepted cooldown window (one year).
pub const MAX_COOLDOWN_SECS: u64 = 365 * 24 * 60 * 60;

/// Tick broker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Ingress queue depth; ticks beyond it are dropped.
    pub queue_capacity: usize,
    /// Inbox depth handed to each price watcher.
    pub inbox_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_BROKER_QUEUE_CAPACITY,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// Trigger bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct TriggerBusConfig {
    pub queue_capacity: usize,
    pub inbox_capacity: usize,
}

impl Default for TriggerBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_TRIGGER_QUEUE_CAPACITY,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// Rule engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ingress queue depth; ticks beyond it are dropped and logged.
    pub queue_capacity: usize,
    /// Minimum seconds between two triggers of the same alert.
    pub cooldown_secs: u64,
    /// How often the hosting process should purge stale cooldown entries.
    pub cleanup_interval_secs: u64,
    /// What to do with a trigger whose alert was deleted mid-evaluation.
    pub orphan_policy: OrphanPolicy,
}

impl EngineConfig {
    /// Cooldown window as a [`Duration`].
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Cleanup interval as a [`Duration`].
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_ENGINE_QUEUE_CAPACITY,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            cleanup_interval_secs: 300,
            orphan_policy: OrphanPolicy::default(),
        }
    }
}

/// Simulated feed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct FeedConfig {
    pub symbols: Vec<String>,
    pub tick_interval_ms: u64,
    /// Output channel depth; ticks beyond it are dropped.
    pub queue_capacity: usize,
}

impl FeedConfig {
    /// Tick interval as a [`Duration`].
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbols: ["BTC", "ETH", "ADA", "SOL", "DOT", "MATIC", "AVAX", "LINK"]
                .into_iter()
                .map(String::from)
                .collect(),
            tick_interval_ms: 200,
            queue_capacity: 1_000,
        }
    }
}

/// Complete configuration for a PriceWatch process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct PriceWatchConfig {
    pub broker: BrokerConfig,
    pub trigger_bus: TriggerBusConfig,
    pub engine: EngineConfig,
    pub feed: FeedConfig,
}

impl PriceWatchConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Rejects zero capacities and intervals, an empty feed symbol list and
    /// cooldowns above [`MAX_COOLDOWN_SECS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("broker.queue_capacity", self.broker.queue_capacity)?;
        non_zero("broker.inbox_capacity", self.broker.inbox_capacity)?;
        non_zero("trigger_bus.queue_capacity", self.trigger_bus.queue_capacity)?;
        non_zero("trigger_bus.inbox_capacity", self.trigger_bus.inbox_capacity)?;
        non_zero("engine.queue_capacity", self.engine.queue_capacity)?;
        non_zero("engine.cleanup_interval_secs", self.engine.cleanup_interval_secs)?;
        if self.engine.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(invalid(
                "engine.cooldown_secs",
                format!("must not exceed {MAX_COOLDOWN_SECS}"),
            ));
        }
        non_zero("feed.queue_capacity", self.feed.queue_capacity)?;
        non_zero("feed.tick_interval_ms", self.feed.tick_interval_ms)?;
        if self.feed.symbols.is_empty() {
            return Err(invalid("feed.symbols", "must list at least one symbol"));
        }
        if self.feed.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid("feed.symbols", "symbols must be non-empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn non_zero<T: Default + PartialEq>(field: &str, value: T) -> Result<(), ConfigError> {
    if value == T::default() {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}
