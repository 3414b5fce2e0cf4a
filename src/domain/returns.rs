//! Daily return series derived from price history.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::prices::PricePoint;

/// Close-to-close simple returns keyed by the date of the later bar.
pub type ReturnSeries = BTreeMap<NaiveDate, f64>;

/// Symbol → return series.
pub type HistoricalReturns = BTreeMap<String, ReturnSeries>;

/// Percentage change of consecutive closes. Intraday bars are collapsed to the
/// last close of each date first. Non-positive previous closes are skipped.
pub fn daily_returns(bars: &[PricePoint]) -> ReturnSeries {
    let mut closes: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for bar in bars {
        closes.insert(bar.timestamp.date(), bar.close);
    }

    closes
        .iter()
        .zip(closes.iter().skip(1))
        .filter_map(|((_, &prev), (&date, &curr))| {
            if prev > 0.0 {
                Some((date, (curr - prev) / prev))
            } else {
                None
            }
        })
        .collect()
}

/// The last `lookback` returns dated strictly before `before`.
pub fn lookback_slice(series: &ReturnSeries, before: NaiveDate, lookback: usize) -> Vec<f64> {
    let mut window: Vec<f64> = series
        .range(..before)
        .rev()
        .take(lookback)
        .map(|(_, &r)| r)
        .collect();
    window.reverse();
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bar(date: &str, hour: u32, close: f64) -> PricePoint {
        PricePoint {
            symbol: "AAPL".into(),
            timestamp: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn daily_returns_basic() {
        let bars = vec![
            bar("2024-01-01", 0, 100.0),
            bar("2024-01-02", 0, 110.0),
            bar("2024-01-03", 0, 99.0),
        ];
        let returns = daily_returns(&bars);
        assert_eq!(returns.len(), 2);
        assert_relative_eq!(returns[&d("2024-01-02")], 0.10, epsilon = 1e-12);
        assert_relative_eq!(returns[&d("2024-01-03")], -0.10, epsilon = 1e-12);
    }

    #[test]
    fn daily_returns_uses_last_close_of_each_day() {
        let bars = vec![
            bar("2024-01-01", 9, 90.0),
            bar("2024-01-01", 16, 100.0),
            bar("2024-01-02", 16, 105.0),
        ];
        let returns = daily_returns(&bars);
        assert_relative_eq!(returns[&d("2024-01-02")], 0.05, epsilon = 1e-12);
    }

    #[test]
    fn daily_returns_needs_two_days() {
        assert!(daily_returns(&[bar("2024-01-01", 0, 100.0)]).is_empty());
        assert!(daily_returns(&[]).is_empty());
    }

    #[test]
    fn lookback_slice_excludes_start_date_and_later() {
        let series: ReturnSeries = [
            (d("2024-01-02"), 0.01),
            (d("2024-01-03"), 0.02),
            (d("2024-01-04"), 0.03),
            (d("2024-01-05"), 0.04),
        ]
        .into_iter()
        .collect();

        assert_eq!(lookback_slice(&series, d("2024-01-05"), 2), vec![0.02, 0.03]);
        assert_eq!(
            lookback_slice(&series, d("2024-01-05"), 10),
            vec![0.01, 0.02, 0.03]
        );
        assert!(lookback_slice(&series, d("2024-01-02"), 10).is_empty());
    }
}
