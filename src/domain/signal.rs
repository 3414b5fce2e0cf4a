//! Prediction signals as produced by external models.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::error::MultitraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    Buy,
    Sell,
    Hold,
}

impl FromStr for Prediction {
    type Err = MultitraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Prediction::Buy),
            "SELL" => Ok(Prediction::Sell),
            "HOLD" => Ok(Prediction::Hold),
            _ => Err(MultitraderError::UnknownVariant {
                kind: "prediction",
                value: s.to_string(),
                expected: "BUY, SELL, HOLD",
            }),
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Prediction::Buy => "BUY",
            Prediction::Sell => "SELL",
            Prediction::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// A timestamp as received from a provider, before canonicalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp {
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl RawTimestamp {
    /// The time as the provider wrote it, offset ignored. Not an instant:
    /// only `canonicalize` turns a raw timestamp into one.
    pub fn wall_clock(&self) -> NaiveDateTime {
        match self {
            RawTimestamp::Naive(dt) => *dt,
            RawTimestamp::Zoned(dt) => dt.naive_local(),
        }
    }

    /// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare date.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(RawTimestamp::Zoned(dt));
        }
        for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(RawTimestamp::Naive(dt));
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(RawTimestamp::Naive)
    }
}

impl From<NaiveDateTime> for RawTimestamp {
    fn from(dt: NaiveDateTime) -> Self {
        RawTimestamp::Naive(dt)
    }
}

impl From<DateTime<FixedOffset>> for RawTimestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        RawTimestamp::Zoned(dt)
    }
}

/// One walk-forward prediction as emitted by a signal provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal {
    pub timestamp: RawTimestamp,
    pub prediction: Prediction,
    pub confidence: f64,
    pub current_price: Option<f64>,
}

/// Finite and within `[0, 1]`.
pub fn is_valid_confidence(confidence: f64) -> bool {
    (0.0..=1.0).contains(&confidence)
}

/// A prediction bound to a symbol and a canonical timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub prediction: Prediction,
    pub confidence: f64,
    pub current_price: Option<f64>,
}

impl Signal {
    /// The prediction after the confidence gate: anything not at or above the
    /// threshold, NaN included, is HOLD.
    pub fn effective_prediction(&self, confidence_threshold: f64) -> Prediction {
        if self.confidence >= confidence_threshold {
            self.prediction
        } else {
            Prediction::Hold
        }
    }
}
