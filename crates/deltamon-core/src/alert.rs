//! Threshold classifications and alert events.

use crate::account::AccountId;
use crate::delta::Delta;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Result of evaluating a delta against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    None,
    /// Delta above the positive threshold.
    High,
    /// Delta below the negative threshold.
    Low,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::High => "high",
            Self::Low => "low",
        }
    }

    pub fn is_alert(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert raised for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub account: AccountId,
    pub classification: Classification,
    pub delta: Delta,
    /// The threshold that was crossed.
    pub threshold: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        account: AccountId,
        classification: Classification,
        delta: Delta,
        threshold: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            classification,
            delta,
            threshold,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_classification_is_alert() {
        assert!(!Classification::None.is_alert());
        assert!(Classification::High.is_alert());
        assert!(Classification::Low.is_alert());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let id = AccountId::new("A").unwrap();
        let now = Utc::now();
        let a = AlertEvent::new(id.clone(), Classification::High, Delta(dec!(0.1)), dec!(0.08), now);
        let b = AlertEvent::new(id, Classification::High, Delta(dec!(0.1)), dec!(0.08), now);
        assert_ne!(a.id, b.id);
    }
}
