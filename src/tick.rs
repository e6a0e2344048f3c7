//! Price observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price observation for a symbol at a point in time.
///
/// Ticks are immutable once created. Fan-out components share one tick
/// between subscribers behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Trading symbol, e.g. `BTC`.
    pub symbol: String,
    /// Observed price.
    pub price: f64,
    /// When the observation was made.
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    /// Creates a tick stamped with the current wall-clock time.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self::at(symbol, price, Utc::now())
    }

    /// Creates a tick with an explicit timestamp.
    #[must_use]
    pub fn at(symbol: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp,
        }
    }
}
