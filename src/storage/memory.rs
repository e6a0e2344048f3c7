//! In-memory storage backend.
//!
//! Thread-safe implementation of [`AlertStore`] guarded by a single
//! reader/writer lock over the primary map and the symbol index. Lock scope
//! never covers anything but map operations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::alert::{Alert, AlertId, AlertUpdate};
use crate::clock::{Clock, SystemClock};
use crate::storage::traits::{AlertStore, StoreError};

fn lock_err(context: &'static str) -> StoreError {
    StoreError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct AlertState {
    by_id: HashMap<AlertId, Alert>,
    // Insertion-ordered, no duplicates. Empty buckets are removed.
    by_symbol: HashMap<String, Vec<AlertId>>,
}

impl AlertState {
    fn index(&mut self, symbol: &str, id: &AlertId) {
        let bucket = self.by_symbol.entry(symbol.to_string()).or_default();
        if !bucket.contains(id) {
            bucket.push(id.clone());
        }
    }

    fn unindex(&mut self, symbol: &str, id: &AlertId) {
        let Some(bucket) = self.by_symbol.get_mut(symbol) else {
            return;
        };
        bucket.retain(|x| x != id);
        if bucket.is_empty() {
            self.by_symbol.remove(symbol);
        }
    }

    fn collect<F>(&self, symbol: &str, keep: F) -> Vec<Alert>
    where
        F: Fn(&Alert) -> bool,
    {
        let Some(ids) = self.by_symbol.get(symbol) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.by_id.get(id))
            .filter(|a| keep(a))
            .cloned()
            .collect()
    }
}

/// Thread-safe in-memory alert store.
#[derive(Debug)]
pub struct InMemoryAlertStore {
    state: RwLock<AlertState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryAlertStore {
    /// Create a new empty store reading wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new empty store that stamps triggers using `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(AlertState::default()),
            clock,
        }
    }
}

impl Default for InMemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertStore for InMemoryAlertStore {
    fn create(&self, alert: Alert) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("alert.create"))?;
        if state.by_id.contains_key(&alert.id) {
            return Err(StoreError::AlreadyExists(alert.id));
        }

        state.index(&alert.symbol, &alert.id);
        state.by_id.insert(alert.id.clone(), alert);
        Ok(())
    }

    fn get(&self, id: &AlertId) -> Result<Alert, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("alert.get"))?;
        state
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::AlertNotFound(id.clone()))
    }

    fn update(&self, id: &AlertId, update: &AlertUpdate) -> Result<Alert, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("alert.update"))?;
        let alert = state
            .by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::AlertNotFound(id.clone()))?;

        let old_symbol = alert.symbol.clone();
        let symbol_changed = alert.apply(update);
        let updated = alert.clone();

        if symbol_changed {
            state.unindex(&old_symbol, id);
            state.index(&updated.symbol, id);
        }
        Ok(updated)
    }

    fn delete(&self, id: &AlertId) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("alert.delete"))?;
        let prev = state
            .by_id
            .remove(id)
            .ok_or_else(|| StoreError::AlertNotFound(id.clone()))?;

        state.unindex(&prev.symbol, id);
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<Alert>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("alert.get_all"))?;
        Ok(state.by_id.values().cloned().collect())
    }

    fn get_by_symbol(&self, symbol: &str) -> Result<Vec<Alert>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("alert.get_by_symbol"))?;
        Ok(state.collect(symbol, |_| true))
    }

    fn get_enabled_by_symbol(&self, symbol: &str) -> Result<Vec<Alert>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("alert.get_enabled_by_symbol"))?;
        Ok(state.collect(symbol, |a| a.enabled))
    }

    fn mark_triggered(&self, id: &AlertId) -> Result<DateTime<Utc>, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().map_err(|_| lock_err("alert.mark_triggered"))?;
        let alert = state
            .by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::AlertNotFound(id.clone()))?;
        alert.last_trigger = Some(now);
        Ok(now)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("alert.count"))?;
        Ok(state.by_id.len())
    }

    fn count_by_symbol(&self, symbol: &str) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("alert.count_by_symbol"))?;
        Ok(state.by_symbol.get(symbol).map_or(0, Vec::len))
    }

    fn active_symbols(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("alert.active_symbols"))?;
        let mut symbols: Vec<String> = state.by_symbol.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}
