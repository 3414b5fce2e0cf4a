//! Timestamp alignment: per-symbol signal streams and the unified event timeline.
//!
//! [`canonicalize`] is the only place timezone information is interpreted.
//! Everything downstream of [`SymbolSignals::from_raw`] works on canonical
//! `NaiveDateTime` values (UTC wall clock, no offset).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::error::{Diagnostic, Stage};
use super::signal::{RawSignal, RawTimestamp, Signal, is_valid_confidence};

pub fn canonicalize(ts: RawTimestamp) -> NaiveDateTime {
    match ts {
        RawTimestamp::Naive(dt) => dt,
        RawTimestamp::Zoned(dt) => dt.naive_utc(),
    }
}

/// Inclusive `[start 00:00:00, end 23:59:59]` window for a date range.
pub fn date_window(start: NaiveDate, end: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    (start.and_time(NaiveTime::MIN), end.and_time(end_of_day))
}

#[derive(Debug, Clone)]
pub struct SymbolSignals {
    pub symbol: String,
    pub signals: Vec<Signal>,
    pub timestamp_index: HashMap<NaiveDateTime, usize>,
}

impl SymbolSignals {
    /// Canonicalize, window, sort and de-duplicate one provider stream.
    ///
    /// When two raw signals collapse onto the same canonical timestamp the later
    /// one in provider order wins. Signals whose confidence is not a number in
    /// `[0, 1]` are dropped with a warning.
    pub fn from_raw(
        symbol: &str,
        raw: Vec<RawSignal>,
        window: (NaiveDateTime, NaiveDateTime),
    ) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let mut by_time: BTreeMap<NaiveDateTime, Signal> = BTreeMap::new();
        let mut dropped = 0usize;

        for r in raw {
            let timestamp = canonicalize(r.timestamp);
            if timestamp < window.0 || timestamp > window.1 {
                dropped += 1;
                continue;
            }
            if !is_valid_confidence(r.confidence) {
                diagnostics.push(
                    Diagnostic::warning(
                        Stage::Alignment,
                        format!("confidence {} outside [0, 1]; signal dropped", r.confidence),
                    )
                    .for_symbol(symbol)
                    .at(timestamp),
                );
                continue;
            }
            let signal = Signal {
                symbol: symbol.to_string(),
                timestamp,
                prediction: r.prediction,
                confidence: r.confidence,
                current_price: r.current_price,
            };
            if by_time.insert(timestamp, signal).is_some() {
                tracing::debug!(symbol, %timestamp, "duplicate signal replaced");
            }
        }

        if dropped > 0 {
            diagnostics.push(
                Diagnostic::info(
                    Stage::Alignment,
                    format!("{dropped} signals outside the backtest window dropped"),
                )
                .for_symbol(symbol),
            );
        }

        (Self::new(symbol.to_string(), by_time.into_values().collect()), diagnostics)
    }

    /// Build from signals already sorted by canonical timestamp.
    pub fn new(symbol: String, signals: Vec<Signal>) -> Self {
        let timestamp_index = signals
            .iter()
            .enumerate()
            .map(|(i, s)| (s.timestamp, i))
            .collect();
        Self {
            symbol,
            signals,
            timestamp_index,
        }
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signal_at(&self, timestamp: NaiveDateTime) -> Option<&Signal> {
        self.timestamp_index
            .get(&timestamp)
            .map(|&i| &self.signals[i])
    }
}

/// Sorted union of every signal timestamp across symbols. Equal timestamps
/// collapse into one event.
pub fn build_unified_timeline(streams: &[SymbolSignals]) -> Vec<NaiveDateTime> {
    let unique: BTreeSet<NaiveDateTime> = streams
        .iter()
        .flat_map(|s| s.signals.iter().map(|sig| sig.timestamp))
        .collect();
    unique.into_iter().collect()
}

/// Every symbol's signal at exactly `timestamp`.
pub fn signals_at(streams: &[SymbolSignals], timestamp: NaiveDateTime) -> BTreeMap<String, Signal> {
    streams
        .iter()
        .filter_map(|s| {
            s.signal_at(timestamp)
                .map(|sig| (s.symbol.clone(), sig.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::Prediction;
    use chrono::{DateTime, FixedOffset, TimeZone};

    fn naive(date: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn raw(ts: RawTimestamp, prediction: Prediction) -> RawSignal {
        RawSignal {
            timestamp: ts,
            prediction,
            confidence: 0.9,
            current_price: None,
        }
    }

    fn wide_window() -> (NaiveDateTime, NaiveDateTime) {
        date_window(
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2100, 1, 1).unwrap(),
        )
    }

    #[test]
    fn canonicalize_converts_zoned_to_utc() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let zoned: DateTime<FixedOffset> = offset.with_ymd_and_hms(2024, 1, 15, 19, 0, 0).unwrap();
        let canonical = canonicalize(RawTimestamp::Zoned(zoned));
        assert_eq!(
            canonical,
            NaiveDate::from_ymd_opt(2024, 1, 16)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn canonicalize_leaves_naive_untouched() {
        let ts = naive("2024-01-15");
        assert_eq!(canonicalize(RawTimestamp::Naive(ts)), ts);
    }

    #[test]
    fn zoned_and_naive_equal_instants_are_one_event() {
        let utc_midnight = naive("2024-01-16");
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let zoned = offset.with_ymd_and_hms(2024, 1, 16, 2, 0, 0).unwrap();

        let (a, _) = SymbolSignals::from_raw(
            "AAPL",
            vec![raw(RawTimestamp::Naive(utc_midnight), Prediction::Buy)],
            wide_window(),
        );
        let (b, _) = SymbolSignals::from_raw(
            "MSFT",
            vec![raw(RawTimestamp::Zoned(zoned), Prediction::Sell)],
            wide_window(),
        );

        let timeline = build_unified_timeline(&[a.clone(), b.clone()]);
        assert_eq!(timeline, vec![utc_midnight]);

        let at = signals_at(&[a, b], utc_midnight);
        assert_eq!(at.len(), 2);
        assert_eq!(at["MSFT"].prediction, Prediction::Sell);
    }

    #[test]
    fn from_raw_sorts_and_deduplicates() {
        let (stream, _) = SymbolSignals::from_raw(
            "AAPL",
            vec![
                raw(RawTimestamp::Naive(naive("2024-01-03")), Prediction::Buy),
                raw(RawTimestamp::Naive(naive("2024-01-01")), Prediction::Hold),
                raw(RawTimestamp::Naive(naive("2024-01-03")), Prediction::Sell),
            ],
            wide_window(),
        );

        assert_eq!(stream.len(), 2);
        assert_eq!(stream.signals[0].timestamp, naive("2024-01-01"));
        assert_eq!(
            stream.signal_at(naive("2024-01-03")).unwrap().prediction,
            Prediction::Sell
        );
    }

    #[test]
    fn from_raw_drops_invalid_confidence() {
        let with_confidence = |date: &str, confidence: f64| RawSignal {
            confidence,
            ..raw(RawTimestamp::Naive(naive(date)), Prediction::Buy)
        };
        let (stream, diagnostics) = SymbolSignals::from_raw(
            "AAPL",
            vec![
                with_confidence("2024-01-02", f64::NAN),
                with_confidence("2024-01-03", 7.5),
                with_confidence("2024-01-04", 0.8),
            ],
            wide_window(),
        );

        assert_eq!(stream.len(), 1);
        assert_eq!(stream.signals[0].timestamp, naive("2024-01-04"));
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.stage == Stage::Alignment
            && d.severity == crate::domain::error::Severity::Warning
            && d.symbol.as_deref() == Some("AAPL")));
        assert_eq!(diagnostics[0].timestamp, Some(naive("2024-01-02")));
    }

    #[test]
    fn from_raw_drops_signals_outside_window() {
        let window = date_window(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        );
        let (stream, diagnostics) = SymbolSignals::from_raw(
            "AAPL",
            vec![
                raw(RawTimestamp::Naive(naive("2024-01-01")), Prediction::Buy),
                raw(RawTimestamp::Naive(naive("2024-01-03")), Prediction::Buy),
                raw(RawTimestamp::Naive(naive("2024-01-04")), Prediction::Buy),
            ],
            window,
        );

        assert_eq!(stream.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].symbol.as_deref(), Some("AAPL"));
    }

    #[test]
    fn unified_timeline_merges_independent_calendars() {
        let (a, _) = SymbolSignals::from_raw(
            "AAPL",
            vec![
                raw(RawTimestamp::Naive(naive("2024-01-02")), Prediction::Hold),
                raw(RawTimestamp::Naive(naive("2024-01-05")), Prediction::Hold),
            ],
            wide_window(),
        );
        let (b, _) = SymbolSignals::from_raw(
            "BTC",
            vec![
                raw(RawTimestamp::Naive(naive("2024-01-01")), Prediction::Hold),
                raw(RawTimestamp::Naive(naive("2024-01-02")), Prediction::Hold),
                raw(RawTimestamp::Naive(naive("2024-01-06")), Prediction::Hold),
            ],
            wide_window(),
        );

        let timeline = build_unified_timeline(&[a, b]);
        assert_eq!(
            timeline,
            vec![
                naive("2024-01-01"),
                naive("2024-01-02"),
                naive("2024-01-05"),
                naive("2024-01-06"),
            ]
        );
    }

    #[test]
    fn unified_timeline_empty_streams() {
        assert!(build_unified_timeline(&[]).is_empty());
    }
}
