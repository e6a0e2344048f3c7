//! Alert rules, comparators and trigger events.
//!
//! An [`Alert`] compares a symbol's price against a threshold. Holders other
//! than the store only ever see cloned snapshots; the store is the single
//! place where an alert is mutated.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Unique identifier for an alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    /// Create a new random alert id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for AlertId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AlertId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Comparison applied between a tick price and an alert threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    /// Sentinel for "not provided"; never fires and fails validation.
    #[default]
    Unspecified,
    /// price > threshold
    Gt,
    /// price >= threshold
    Gte,
    /// price < threshold
    Lt,
    /// price <= threshold
    Lte,
    /// |price - threshold| < [`Comparator::EQ_EPSILON`]
    Eq,
}

impl Comparator {
    /// Absolute tolerance used by [`Comparator::Eq`].
    pub const EQ_EPSILON: f64 = 0.001;

    /// Evaluates `price <op> threshold`.
    #[must_use]
    pub fn evaluate(self, price: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => price > threshold,
            Self::Gte => price >= threshold,
            Self::Lt => price < threshold,
            Self::Lte => price <= threshold,
            Self::Eq => (price - threshold).abs() < Self::EQ_EPSILON,
            Self::Unspecified => false,
        }
    }

    /// Operator form, e.g. `>=`.
    #[must_use]
    pub const fn operator(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Unspecified => "unknown",
        }
    }

    /// Returns false for the unspecified sentinel.
    #[must_use]
    pub const fn is_specified(self) -> bool {
        !matches!(self, Self::Unspecified)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

impl FromStr for Comparator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GT" | ">" => Ok(Self::Gt),
            "GTE" | ">=" => Ok(Self::Gte),
            "LT" | "<" => Ok(Self::Lt),
            "LTE" | "<=" => Ok(Self::Lte),
            "EQ" | "==" | "=" => Ok(Self::Eq),
            _ => Err(ValidationError::UnspecifiedComparator),
        }
    }
}

/// A threshold rule on a symbol's price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub symbol: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub note: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trigger: Option<DateTime<Utc>>,
}

impl Alert {
    /// Creates an enabled, never-triggered alert with a fresh id.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        note: impl Into<String>,
    ) -> Self {
        Self::with_id(AlertId::new(), symbol, comparator, threshold, note)
    }

    /// Same as [`Alert::new`] with a caller-chosen id.
    #[must_use]
    pub fn with_id(
        id: AlertId,
        symbol: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            comparator,
            threshold,
            note: note.into(),
            enabled: true,
            last_trigger: None,
        }
    }

    /// Whether `price` satisfies this rule. Disabled alerts never fire.
    #[must_use]
    pub fn should_trigger(&self, price: f64) -> bool {
        self.enabled && self.comparator.evaluate(price, self.threshold)
    }

    /// Request-side checks: non-empty id and symbol, positive threshold,
    /// specified comparator.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyAlertId);
        }
        validate_symbol(&self.symbol)?;
        validate_comparator(self.comparator)?;
        validate_threshold(self.threshold)
    }

    /// Applies the fields present in `update`. Returns true when the symbol
    /// changed, in which case the caller must re-index.
    pub(crate) fn apply(&mut self, update: &AlertUpdate) -> bool {
        let symbol_changed = match &update.symbol {
            Some(symbol) if *symbol != self.symbol => {
                self.symbol.clone_from(symbol);
                true
            }
            _ => false,
        };
        if let Some(comparator) = update.comparator {
            self.comparator = comparator;
        }
        if let Some(threshold) = update.threshold {
            self.threshold = threshold;
        }
        if let Some(note) = &update.note {
            self.note.clone_from(note);
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        symbol_changed
    }
}

/// Partial update: only `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertUpdate {
    pub symbol: Option<String>,
    pub comparator: Option<Comparator>,
    pub threshold: Option<f64>,
    pub note: Option<String>,
    pub enabled: Option<bool>,
}

impl AlertUpdate {
    /// Empty update; applying it changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    #[must_use]
    pub fn comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }

    #[must_use]
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// True when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.symbol.is_none()
            && self.comparator.is_none()
            && self.threshold.is_none()
            && self.note.is_none()
            && self.enabled.is_none()
    }

    /// Validates only the supplied fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(symbol) = &self.symbol {
            validate_symbol(symbol)?;
        }
        if let Some(comparator) = self.comparator {
            validate_comparator(comparator)?;
        }
        if let Some(threshold) = self.threshold {
            validate_threshold(threshold)?;
        }
        Ok(())
    }
}

/// Emitted once per firing. Carries the alert as it was at trigger time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTrigger {
    pub alert: Alert,
    pub triggered_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl AlertTrigger {
    /// Trigger carrying a snapshot of `alert`.
    #[must_use]
    pub const fn new(alert: Alert, triggered_price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            alert,
            triggered_price,
            timestamp,
        }
    }
}

pub(crate) fn validate_symbol(symbol: &str) -> Result<(), ValidationError> {
    if symbol.trim().is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    Ok(())
}

fn validate_comparator(comparator: Comparator) -> Result<(), ValidationError> {
    if comparator.is_specified() {
        Ok(())
    } else {
        Err(ValidationError::UnspecifiedComparator)
    }
}

fn validate_threshold(threshold: f64) -> Result<(), ValidationError> {
    // NaN fails the comparison too.
    if threshold > 0.0 && threshold.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonPositiveThreshold { value: threshold })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(comparator: Comparator, threshold: f64, enabled: bool) -> Alert {
        let mut a = Alert::new("BTC", comparator, threshold, "");
        a.enabled = enabled;
        a
    }

    #[test]
    fn should_trigger_follows_comparator_semantics() {
        let cases = [
            (Comparator::Gt, 101.0, true),
            (Comparator::Gt, 100.0, false),
            (Comparator::Gte, 100.0, true),
            (Comparator::Gte, 99.99, false),
            (Comparator::Lt, 99.0, true),
            (Comparator::Lt, 100.0, false),
            (Comparator::Lte, 100.0, true),
            (Comparator::Lte, 100.01, false),
            (Comparator::Eq, 100.0, true),
            (Comparator::Eq, 100.0009, true),
            (Comparator::Eq, 99.9991, true),
            (Comparator::Eq, 100.002, false),
            (Comparator::Unspecified, 100.0, false),
        ];

        for (comparator, price, expected) in cases {
            let a = alert(comparator, 100.0, true);
            assert_eq!(
                a.should_trigger(price),
                expected,
                "{comparator:?} price={price} threshold=100"
            );
        }
    }

    #[test]
    fn disabled_alert_never_triggers() {
        for comparator in [
            Comparator::Gt,
            Comparator::Gte,
            Comparator::Lt,
            Comparator::Lte,
            Comparator::Eq,
        ] {
            let a = alert(comparator, 100.0, false);
            for price in [0.0, 99.0, 100.0, 101.0, f64::MAX] {
                assert!(!a.should_trigger(price));
            }
        }
    }

    #[test]
    fn new_alert_is_enabled_and_untriggered() {
        let a = Alert::new("AAPL", Comparator::Gt, 150.0, "Test alert");
        assert!(!a.id.as_str().is_empty());
        assert_eq!(a.symbol, "AAPL");
        assert_eq!(a.comparator, Comparator::Gt);
        assert!((a.threshold - 150.0).abs() < f64::EPSILON);
        assert_eq!(a.note, "Test alert");
        assert!(a.enabled);
        assert!(a.last_trigger.is_none());
    }

    #[test]
    fn new_alerts_get_distinct_ids() {
        let a = Alert::new("BTC", Comparator::Gt, 1.0, "");
        let b = Alert::new("BTC", Comparator::Gt, 1.0, "");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn comparator_display_and_parse() {
        let cases = [
            (Comparator::Gt, ">"),
            (Comparator::Gte, ">="),
            (Comparator::Lt, "<"),
            (Comparator::Lte, "<="),
            (Comparator::Eq, "=="),
            (Comparator::Unspecified, "unknown"),
        ];
        for (comparator, expected) in cases {
            assert_eq!(comparator.to_string(), expected);
        }

        assert_eq!("gte".parse::<Comparator>().unwrap(), Comparator::Gte);
        assert_eq!("<=".parse::<Comparator>().unwrap(), Comparator::Lte);
        assert_eq!(" EQ ".parse::<Comparator>().unwrap(), Comparator::Eq);
        assert_eq!(
            "between".parse::<Comparator>().unwrap_err(),
            ValidationError::UnspecifiedComparator
        );
    }

    #[test]
    fn comparator_serializes_as_upper_case_name() {
        let json = serde_json::to_string(&Comparator::Gte).unwrap();
        assert_eq!(json, "\"GTE\"");
        let back: Comparator = serde_json::from_str("\"LT\"").unwrap();
        assert_eq!(back, Comparator::Lt);
    }

    #[test]
    fn apply_touches_only_supplied_fields() {
        let mut a = Alert::new("BTC", Comparator::Gt, 100.0, "keep me");
        let changed = a.apply(&AlertUpdate::new().threshold(200.0).enabled(false));
        assert!(!changed);
        assert_eq!(a.symbol, "BTC");
        assert_eq!(a.comparator, Comparator::Gt);
        assert!((a.threshold - 200.0).abs() < f64::EPSILON);
        assert_eq!(a.note, "keep me");
        assert!(!a.enabled);

        assert!(a.apply(&AlertUpdate::new().symbol("ETH")));
        assert_eq!(a.symbol, "ETH");
        // Same symbol again is not a change.
        assert!(!a.apply(&AlertUpdate::new().symbol("ETH")));
    }

    #[test]
    fn validate_rejects_bad_requests() {
        let ok = Alert::new("BTC", Comparator::Gt, 1.0, "");
        assert!(ok.validate().is_ok());

        let empty_symbol = Alert::new("  ", Comparator::Gt, 1.0, "");
        assert_eq!(empty_symbol.validate(), Err(ValidationError::EmptySymbol));

        let zero = Alert::new("BTC", Comparator::Gt, 0.0, "");
        assert!(matches!(
            zero.validate(),
            Err(ValidationError::NonPositiveThreshold { .. })
        ));

        let nan = Alert::new("BTC", Comparator::Gt, f64::NAN, "");
        assert!(nan.validate().is_err());

        let unspecified = Alert::new("BTC", Comparator::Unspecified, 1.0, "");
        assert_eq!(
            unspecified.validate(),
            Err(ValidationError::UnspecifiedComparator)
        );

        let no_id = Alert::with_id(AlertId::from(""), "BTC", Comparator::Gt, 1.0, "");
        assert_eq!(no_id.validate(), Err(ValidationError::EmptyAlertId));
    }

    #[test]
    fn update_validate_checks_present_fields_only() {
        assert!(AlertUpdate::new().note("").validate().is_ok());
        assert!(AlertUpdate::new().enabled(false).validate().is_ok());
        assert_eq!(
            AlertUpdate::new().symbol("").validate(),
            Err(ValidationError::EmptySymbol)
        );
        assert!(AlertUpdate::new().threshold(-3.0).validate().is_err());
        assert!(AlertUpdate::new()
            .comparator(Comparator::Unspecified)
            .validate()
            .is_err());
        assert!(AlertUpdate::new().is_empty());
        assert!(!AlertUpdate::new().enabled(true).is_empty());
    }
}
