//! Abstract storage trait for alert rules.
//!
//! The rule engine and the facade talk to the store only through
//! [`AlertStore`], so an alternative backend (for example a single-owner
//! actor) can be dropped in as long as it keeps the symbol index consistent
//! with the primary map.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::alert::{Alert, AlertId, AlertUpdate};

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No alert with this id.
    #[error("Alert not found: {0}")]
    AlertNotFound(AlertId),

    /// Create collided with an existing id.
    #[error("Alert already exists: {0}")]
    AlreadyExists(AlertId),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Storage trait for alert rules.
///
/// Every read returns owned snapshots; the only way to change stored state
/// is through the mutating methods below.
pub trait AlertStore: Send + Sync {
    /// Insert a new alert. Returns error if the id already exists.
    fn create(&self, alert: Alert) -> Result<(), StoreError>;

    /// Get an alert by id.
    fn get(&self, id: &AlertId) -> Result<Alert, StoreError>;

    /// Apply the supplied fields and return the updated alert.
    /// Re-indexes when the symbol changes.
    fn update(&self, id: &AlertId, update: &AlertUpdate) -> Result<Alert, StoreError>;

    /// Delete an alert by id.
    fn delete(&self, id: &AlertId) -> Result<(), StoreError>;

    /// All alerts.
    fn get_all(&self) -> Result<Vec<Alert>, StoreError>;

    /// All alerts indexed under `symbol`. Unknown symbols yield an empty list.
    fn get_by_symbol(&self, symbol: &str) -> Result<Vec<Alert>, StoreError>;

    /// Like [`AlertStore::get_by_symbol`] but only enabled alerts.
    fn get_enabled_by_symbol(&self, symbol: &str) -> Result<Vec<Alert>, StoreError>;

    /// Stamp `last_trigger` with the current time and return it.
    fn mark_triggered(&self, id: &AlertId) -> Result<DateTime<Utc>, StoreError>;

    /// Number of stored alerts.
    fn count(&self) -> Result<usize, StoreError>;

    /// Number of alerts indexed under `symbol`.
    fn count_by_symbol(&self, symbol: &str) -> Result<usize, StoreError>;

    /// Symbols that have at least one alert, sorted.
    fn active_symbols(&self) -> Result<Vec<String>, StoreError>;
}
