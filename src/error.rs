//! Error types for PriceWatch.
//!
//! All errors are strongly typed using thiserror. Overload (full queues,
//! full subscriber inboxes) is deliberately absent from this taxonomy: it is
//! a silent degradation policy, observable only through counters and logs.

use thiserror::Error;

use crate::storage::StoreError;

/// Request validation errors.
///
/// The core itself never re-validates; these are raised by the request-facing
/// helpers (`Alert::validate`, `AlertUpdate::validate`, the `PriceWatch` facade).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Symbol cannot be empty")]
    EmptySymbol,

    #[error("Threshold must be positive, got {value}")]
    NonPositiveThreshold {
        value: f64,
    },

    #[error("Comparator must be one of GT, GTE, LT, LTE, EQ")]
    UnspecifiedComparator,

    #[error("Alert id cannot be empty")]
    EmptyAlertId,

    #[error("Symbol set cannot be empty")]
    EmptySymbolSet,
}

/// Errors raised by the runtime machinery (dispatch threads, inboxes).
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Failed to spawn {component} dispatch thread: {message}")]
    Spawn {
        component: String,
        message: String,
    },

    #[error("{component} has been stopped and cannot be restarted")]
    Stopped {
        component: String,
    },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to read configuration: {0}")]
    Io(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

/// Top-level error type for PriceWatch.
#[derive(Debug, Error)]
pub enum PriceWatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl PriceWatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the operation referenced an unknown alert.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::AlertNotFound(_)))
    }

    /// Returns true if a create collided with an existing alert id.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::AlreadyExists(_)))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }
}

/// Result type alias for PriceWatch operations.
pub type PriceWatchResult<T> = Result<T, PriceWatchError>;

pub(crate) fn timeout_ms(timeout: std::time::Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertId;

    #[test]
    fn test_validation_error_threshold() {
        let err = ValidationError::NonPositiveThreshold { value: -1.5 };
        let msg = format!("{err}");
        assert!(msg.contains("-1.5"));
        assert!(msg.contains("positive"));
    }

    #[test]
    fn test_execution_error_timeout() {
        let err = ExecutionError::Timeout { duration_ms: 5000 };
        let msg = format!("{err}");
        assert!(msg.contains("5000ms"));
    }

    #[test]
    fn test_execution_error_stopped() {
        let err = ExecutionError::Stopped {
            component: "tick-broker".to_string(),
        };
        assert!(format!("{err}").contains("tick-broker"));
    }

    #[test]
    fn test_config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "engine.queue_capacity".to_string(),
            reason: "must be at least 1".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("engine.queue_capacity"));
        assert!(msg.contains("at least 1"));
    }

    #[test]
    fn test_error_from_store_not_found() {
        let err: PriceWatchError = StoreError::AlertNotFound(AlertId::from("a-1")).into();
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
        assert!(format!("{err}").contains("a-1"));
    }

    #[test]
    fn test_error_from_store_conflict() {
        let err: PriceWatchError = StoreError::AlreadyExists(AlertId::from("a-2")).into();
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_from_validation() {
        let err: PriceWatchError = ValidationError::EmptySymbol.into();
        assert!(err.is_validation());
        assert!(!err.is_execution());
    }

    #[test]
    fn test_error_internal() {
        let err = PriceWatchError::internal("unexpected state");
        assert!(format!("{err}").contains("unexpected state"));
    }

    #[test]
    fn test_timeout_ms_saturates() {
        assert_eq!(timeout_ms(std::time::Duration::from_millis(250)), 250);
        assert_eq!(timeout_ms(std::time::Duration::MAX), u64::MAX);
    }
}
