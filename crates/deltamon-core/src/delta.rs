//! Delta values and OCR-tolerant parsing.
//!
//! Deltas are read off the screen as text, so parsing has to survive the usual
//! OCR noise: stray glyphs around the number, unicode minus signs, comma
//! decimal separators and letters misread for digits. Values are kept as
//! `Decimal` so threshold comparisons are exact.

use crate::error::{CoreError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// First signed numeric token: optional sign, then digits with embedded
/// separators, or a bare fractional part such as `.05`.
static NUMBER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([+-]?)(\d+(?:[.,]\d+)*|[.,]\d+)").expect("static number pattern")
});

/// Per-account delta value with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(pub Decimal);

impl Delta {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Delta {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        parse_delta(s)
    }
}

impl From<Decimal> for Delta {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

/// Inclusive range of delta values that can plausibly be on screen.
///
/// Anything outside is treated as a misread rather than a real value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl DeltaRange {
    pub fn new(min: Decimal, max: Decimal) -> Result<Self> {
        if min >= max {
            return Err(CoreError::InvalidConfig(format!(
                "delta range min ({min}) must be below max ({max})"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, delta: Delta) -> bool {
        self.min <= delta.0 && delta.0 <= self.max
    }

    /// Parse `raw`, rejecting values outside the range as parse failures.
    pub fn parse(&self, raw: &str) -> Result<Delta> {
        let delta = parse_delta(raw)?;
        if !self.contains(delta) {
            return Err(CoreError::ParseFailure(format!(
                "{raw:?} reads as {delta}, outside [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(delta)
    }
}

impl Default for DeltaRange {
    fn default() -> Self {
        Self {
            min: Decimal::from(-2),
            max: Decimal::from(2),
        }
    }
}

/// Parse OCR text into a delta value.
///
/// Accepts e.g. `"-0.05"`, `" −0,05 "`, `"(0.05)"`, `"+.08%"`, `"O.O7"`,
/// `"Delta: 1.0"`. The first numeric token wins.
pub fn parse_delta(raw: &str) -> Result<Delta> {
    let normalized = normalize_glyphs(raw);
    if normalized.is_empty() {
        return Err(CoreError::ParseFailure(format!("no text in {raw:?}")));
    }

    let caps = NUMBER_TOKEN
        .captures(&normalized)
        .ok_or_else(|| CoreError::ParseFailure(format!("no number in {raw:?}")))?;

    let sign = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let body = normalize_separators(body)
        .ok_or_else(|| CoreError::ParseFailure(format!("ambiguous separators in {raw:?}")))?;

    let value = Decimal::from_str(&body)
        .map_err(|e| CoreError::ParseFailure(format!("{raw:?}: {e}")))?;

    // Accounting style "(0.05)" renders a negative value.
    let parenthesized = normalized.starts_with('(') && normalized.contains(')');
    if sign == "-" || parenthesized {
        Ok(Delta(-value))
    } else {
        Ok(Delta(value))
    }
}

/// Drop whitespace and cell-border artifacts, fold dash variants into `-`,
/// and replace letters that OCR commonly confuses with digits.
///
/// `O`/`o` become `0` next to a digit or separator. `l`/`I` become `1` only
/// between numeric characters (a sign counts on the left), since a lone
/// vertical stroke beside a number is far more often a border than a one.
fn normalize_glyphs(raw: &str) -> String {
    let chars: Vec<char> = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '|' | '\u{00A6}' | '\u{2502}'))
        .map(|c| match c {
            '\u{2212}' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}'
            | '\u{FE63}' | '\u{FF0D}' => '-',
            '\u{FF0B}' => '+',
            '\u{FF0E}' => '.',
            '\u{FF0C}' => ',',
            other => other,
        })
        .collect();

    let numeric = |c: Option<&char>| c.is_some_and(|c| c.is_ascii_digit() || *c == '.' || *c == ',');
    let signed = |c: Option<&char>| numeric(c) || c.is_some_and(|c| *c == '-' || *c == '+');

    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let prev = if i > 0 { chars.get(i - 1) } else { None };
            let next = chars.get(i + 1);
            match c {
                'O' | 'o' if numeric(prev) || numeric(next) => '0',
                'l' | 'I' if signed(prev) && numeric(next) => '1',
                other => other,
            }
        })
        .collect()
}

/// Reduce a digit/separator run to a plain `Decimal` literal.
///
/// With both `.` and `,` present, the later one is the decimal separator and
/// the other is grouping. A lone `,` is a decimal comma; repeated `,` is
/// grouping. Repeated `.` is ambiguous and rejected.
fn normalize_separators(body: &str) -> Option<String> {
    let dots = body.matches('.').count();
    let commas = body.matches(',').count();

    let mut out = match (dots, commas) {
        (0, 0) => body.to_string(),
        (1, 0) => body.to_string(),
        (_, 0) => return None,
        (0, 1) => body.replace(',', "."),
        (0, _) => body.replace(',', ""),
        _ => {
            let last_dot = body.rfind('.')?;
            let last_comma = body.rfind(',')?;
            if last_dot > last_comma {
                if dots > 1 {
                    return None;
                }
                body.replace(',', "")
            } else {
                if commas > 1 {
                    return None;
                }
                body.replace('.', "").replace(',', ".")
            }
        }
    };

    if out.starts_with('.') {
        out.insert(0, '0');
    }
    Some(out)
}
