//! Price Alert Types
//!
//! Stateful one-shot rule engine. Every accepted price update for a symbol
//! is checked against the live set of user-defined conditions; a condition
//! that fires is permanently deactivated and never re-evaluated.
//!
//! # State machine
//!
//! `active → triggered` (terminal) or `active → deleted` (terminal). No
//! other transitions exist; in particular a triggered alert never becomes
//! active again.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use uuid::Uuid;

// =============================================================================
// Types
// =============================================================================

/// Direction of a price alert condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCondition {
    /// Fires when the current price is at or above the target.
    Above,
    /// Fires when the current price is at or below the target.
    Below,
}

impl AlertCondition {
    /// Boundary-inclusive condition check.
    #[must_use]
    pub fn is_satisfied(self, current: Decimal, target: Decimal) -> bool {
        match self {
            Self::Above => current >= target,
            Self::Below => current <= target,
        }
    }

    /// Get the condition name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

/// A user-defined one-shot price alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceAlert {
    /// Unique alert id.
    pub id: Uuid,
    /// Symbol the alert watches, e.g. `"APT/USD"`.
    pub symbol: String,
    /// Price the condition compares against.
    pub target_price: Decimal,
    /// Fire direction.
    pub condition: AlertCondition,
    /// `false` once the alert has fired; never flips back.
    pub is_active: bool,
    /// When the alert was created.
    pub created_at: DateTime<Utc>,
    /// When the alert fired, if it has.
    pub triggered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Alert Book
// =============================================================================

/// Live set of price alerts with at-most-once firing.
///
/// Thread-safe; mutations go through the methods below and unknown ids are
/// reported with a `bool` rather than an error.
pub struct AlertBook {
    inner: RwLock<HashMap<Uuid, PriceAlert>>,
}

impl Default for AlertBook {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertBook {
    /// Create an empty alert book.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new active alert and return its id.
    pub fn create_alert(
        &self,
        symbol: &str,
        target_price: Decimal,
        condition: AlertCondition,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let alert = PriceAlert {
            id,
            symbol: symbol.to_string(),
            target_price,
            condition,
            is_active: true,
            created_at: Utc::now(),
            triggered_at: None,
        };

        self.inner.write().insert(id, alert);
        id
    }

    /// Delete an alert by id. Returns `false` for unknown ids.
    pub fn delete_alert(&self, id: Uuid) -> bool {
        self.inner.write().remove(&id).is_some()
    }

    /// Get a snapshot of an alert.
    #[must_use]
    pub fn alert(&self, id: Uuid) -> Option<PriceAlert> {
        self.inner.read().get(&id).cloned()
    }

    /// Snapshot of every alert, active or triggered.
    #[must_use]
    pub fn alerts(&self) -> Vec<PriceAlert> {
        self.inner.read().values().cloned().collect()
    }

    /// Snapshot of the active alerts for one symbol.
    #[must_use]
    pub fn active_alerts(&self, symbol: &str) -> Vec<PriceAlert> {
        self.inner
            .read()
            .values()
            .filter(|a| a.is_active && a.symbol == symbol)
            .cloned()
            .collect()
    }

    /// Evaluate every active alert on `symbol` against `current_price`.
    ///
    /// Alerts whose condition is satisfied (boundary-inclusive) fire: they
    /// flip inactive, get `triggered_at` stamped, and are returned. Already
    /// triggered alerts are filtered out before the check, so an alert id
    /// appears in the result of at most one call ever, regardless of how
    /// many satisfying updates arrive.
    pub fn check_alerts(&self, current_price: Decimal, symbol: &str) -> Vec<PriceAlert> {
        let now = Utc::now();
        let mut book = self.inner.write();
        let mut fired = Vec::new();

        for alert in book.values_mut() {
            if !alert.is_active || alert.symbol != symbol {
                continue;
            }

            if alert.condition.is_satisfied(current_price, alert.target_price) {
                alert.is_active = false;
                alert.triggered_at = Some(now);
                fired.push(alert.clone());
            }
        }

        if !fired.is_empty() {
            tracing::info!(
                symbol,
                price = %current_price,
                count = fired.len(),
                "price alerts fired"
            );
        }

        fired
    }

    /// Number of alerts held (active and triggered).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if the book holds no alerts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::prelude::FromPrimitive;
    use test_case::test_case;

    use super::*;

    fn dec(v: f64) -> Decimal {
        Decimal::from_f64(v).unwrap()
    }

    #[test_case(AlertCondition::Above, 110.0, 100.0, true; "above satisfied")]
    #[test_case(AlertCondition::Above, 100.0, 100.0, true; "above boundary inclusive")]
    #[test_case(AlertCondition::Above, 99.9, 100.0, false; "above not satisfied")]
    #[test_case(AlertCondition::Below, 90.0, 100.0, true; "below satisfied")]
    #[test_case(AlertCondition::Below, 100.0, 100.0, true; "below boundary inclusive")]
    #[test_case(AlertCondition::Below, 100.1, 100.0, false; "below not satisfied")]
    fn condition_check(condition: AlertCondition, current: f64, target: f64, expected: bool) {
        assert_eq!(condition.is_satisfied(dec(current), dec(target)), expected);
    }

    #[test]
    fn create_and_fetch_alert() {
        let book = AlertBook::new();

        let id = book.create_alert("APT/USD", dec(100.0), AlertCondition::Above);
        let alert = book.alert(id).unwrap();

        assert_eq!(alert.symbol, "APT/USD");
        assert!(alert.is_active);
        assert!(alert.triggered_at.is_none());
    }

    #[test]
    fn delete_alert_unknown_id_returns_false() {
        let book = AlertBook::new();

        assert!(!book.delete_alert(Uuid::new_v4()));
    }

    #[test]
    fn delete_alert_removes_it() {
        let book = AlertBook::new();

        let id = book.create_alert("APT/USD", dec(100.0), AlertCondition::Above);

        assert!(book.delete_alert(id));
        assert!(book.alert(id).is_none());
        assert!(book.check_alerts(dec(150.0), "APT/USD").is_empty());
    }

    #[test]
    fn alert_fires_once_and_deactivates() {
        let book = AlertBook::new();

        let id = book.create_alert("APT/USD", dec(100.0), AlertCondition::Above);

        let fired = book.check_alerts(dec(110.0), "APT/USD");
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, id);
        assert!(!fired[0].is_active);
        assert!(fired[0].triggered_at.is_some());

        // Same satisfying price again: nothing fires
        assert!(book.check_alerts(dec(110.0), "APT/USD").is_empty());
        assert!(book.check_alerts(dec(500.0), "APT/USD").is_empty());
    }

    #[test]
    fn fire_once_law_across_many_updates() {
        let book = AlertBook::new();

        let id = book.create_alert("APT/USD", dec(100.0), AlertCondition::Above);

        let mut seen = 0;
        for price in [101.0, 102.0, 103.0, 104.0] {
            for fired in book.check_alerts(dec(price), "APT/USD") {
                assert_eq!(fired.id, id);
                seen += 1;
            }
        }

        assert_eq!(seen, 1);
    }

    #[test]
    fn both_directions_fire_off_one_update() {
        // above-100 and below-120 are both satisfied at 110
        let book = AlertBook::new();

        let above = book.create_alert("APT/USD", dec(100.0), AlertCondition::Above);
        let below = book.create_alert("APT/USD", dec(120.0), AlertCondition::Below);

        let fired = book.check_alerts(dec(110.0), "APT/USD");
        let fired_ids: Vec<Uuid> = fired.iter().map(|a| a.id).collect();

        assert_eq!(fired.len(), 2);
        assert!(fired_ids.contains(&above));
        assert!(fired_ids.contains(&below));
        assert!(fired.iter().all(|a| !a.is_active && a.triggered_at.is_some()));

        // Second identical call returns nothing
        assert!(book.check_alerts(dec(110.0), "APT/USD").is_empty());
    }

    #[test]
    fn alerts_are_scoped_to_symbol() {
        let book = AlertBook::new();

        book.create_alert("APT/USD", dec(100.0), AlertCondition::Above);
        let btc = book.create_alert("BTC/USD", dec(100.0), AlertCondition::Above);

        let fired = book.check_alerts(dec(150.0), "BTC/USD");

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, btc);
        assert_eq!(book.active_alerts("APT/USD").len(), 1);
    }

    #[test]
    fn unsatisfied_alert_stays_active() {
        let book = AlertBook::new();

        let id = book.create_alert("APT/USD", dec(100.0), AlertCondition::Above);

        assert!(book.check_alerts(dec(50.0), "APT/USD").is_empty());

        let alert = book.alert(id).unwrap();
        assert!(alert.is_active);
        assert!(alert.triggered_at.is_none());
    }

    #[test]
    fn triggered_alert_remains_retrievable() {
        let book = AlertBook::new();

        let id = book.create_alert("APT/USD", dec(100.0), AlertCondition::Above);
        book.check_alerts(dec(110.0), "APT/USD");

        let alert = book.alert(id).unwrap();
        assert!(!alert.is_active);
        assert_eq!(book.len(), 1);
    }
}
