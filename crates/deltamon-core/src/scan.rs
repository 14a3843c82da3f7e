//! Per-account scan results.

use crate::account::AccountId;
use crate::delta::Delta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of scanning one account in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Ok,
    /// Capture or extraction failed, text confidence was too low, or the text
    /// did not parse as a delta.
    OcrFailure,
    /// The delta cell could not be located on screen.
    RegionNotFound,
    /// The per-account budget or the cycle deadline elapsed.
    Timeout,
}

impl ScanOutcome {
    pub const ALL: [ScanOutcome; 4] = [
        ScanOutcome::Ok,
        ScanOutcome::OcrFailure,
        ScanOutcome::RegionNotFound,
        ScanOutcome::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::OcrFailure => "ocr_failure",
            Self::RegionNotFound => "region_not_found",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral result of one account scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub account: AccountId,
    /// Raw text as returned by the extractor (empty if none was read).
    pub raw_text: String,
    /// Parsed delta; `None` unless the outcome is `Ok`.
    pub delta: Option<Delta>,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub outcome: ScanOutcome,
    /// Failure detail for logs.
    pub detail: Option<String>,
}

impl ScanResult {
    pub fn ok(
        account: AccountId,
        raw_text: String,
        delta: Delta,
        confidence: f64,
        elapsed: Duration,
    ) -> Self {
        Self {
            account,
            raw_text,
            delta: Some(delta),
            confidence,
            elapsed,
            outcome: ScanOutcome::Ok,
            detail: None,
        }
    }

    pub fn failed(
        account: AccountId,
        outcome: ScanOutcome,
        elapsed: Duration,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            account,
            raw_text: String::new(),
            delta: None,
            confidence: 0.0,
            elapsed,
            outcome,
            detail: Some(detail.into()),
        }
    }

    /// Attach the extracted text and confidence to a failed result.
    pub fn with_text(mut self, raw_text: impl Into<String>, confidence: f64) -> Self {
        self.raw_text = raw_text.into();
        self.confidence = confidence;
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_outcome_names() {
        assert_eq!(ScanOutcome::RegionNotFound.to_string(), "region_not_found");
        assert_eq!(
            serde_json::to_string(&ScanOutcome::OcrFailure).unwrap(),
            "\"ocr_failure\""
        );
    }

    #[test]
    fn test_failed_result_has_no_delta() {
        let id = AccountId::new("A").unwrap();
        let r = ScanResult::failed(id, ScanOutcome::Timeout, Duration::from_secs(3), "budget")
            .with_text("0.0?", 0.4);
        assert!(r.delta.is_none());
        assert_eq!(r.raw_text, "0.0?");
        assert!(!r.outcome.is_ok());
    }

    #[test]
    fn test_result_serializes_elapsed_ms() {
        let id = AccountId::new("A").unwrap();
        let r = ScanResult::ok(id, "0.01".into(), Delta(dec!(0.01)), 0.95, Duration::from_millis(1500));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["outcome"], "ok");
    }
}
