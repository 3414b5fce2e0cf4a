//! Target portfolio weights under the configured allocation strategy.

use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use super::config::AllocationStrategy;
use super::error::{Diagnostic, MultitraderError, Stage};
use super::returns::{HistoricalReturns, lookback_slice};

/// Slack allowed on the Σw ≤ 1 bound for floating-point summation.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Symbol → target weight. Every weight is in `[0, 1]` and the sum never
/// exceeds `1 + WEIGHT_EPSILON`; the only constructor enforces both.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AllocationWeights(BTreeMap<String, f64>);

impl AllocationWeights {
    pub fn try_new(weights: BTreeMap<String, f64>) -> Result<Self, MultitraderError> {
        for (symbol, &w) in &weights {
            if !w.is_finite() || !(0.0..=1.0 + WEIGHT_EPSILON).contains(&w) {
                return Err(MultitraderError::Allocation {
                    reason: format!("weight for {symbol} is out of range: {w}"),
                });
            }
        }
        let total: f64 = weights.values().sum();
        if total > 1.0 + WEIGHT_EPSILON {
            return Err(MultitraderError::Allocation {
                reason: format!("weights sum to {total:.6}, which exceeds 1.0"),
            });
        }
        Ok(Self(weights))
    }

    /// Weight for `symbol`, 0 when it has none.
    pub fn get(&self, symbol: &str) -> f64 {
        self.0.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

/// Reject non-finite, negative or over-allocated custom weight maps.
pub fn validate_custom_weights(weights: &BTreeMap<String, f64>) -> Result<(), MultitraderError> {
    for (symbol, &w) in weights {
        if !w.is_finite() || w < 0.0 {
            return Err(MultitraderError::ConfigInvalid {
                section: "allocation".into(),
                key: format!("weight.{symbol}"),
                reason: format!("weight must be a non-negative number, got {w}"),
            });
        }
    }
    let total: f64 = weights.values().sum();
    if total > 1.0 + WEIGHT_EPSILON {
        return Err(MultitraderError::ConfigInvalid {
            section: "allocation".into(),
            key: "weight.*".into(),
            reason: format!("custom weights sum to {total:.6}, which exceeds 1.0"),
        });
    }
    Ok(())
}

/// Compute target weights for `symbols`.
///
/// `historical_returns` is required for risk parity, where only returns dated
/// before `start_date` and within the last `lookback` observations are used.
pub fn calculate_target_allocations(
    strategy: &AllocationStrategy,
    symbols: &[String],
    historical_returns: Option<&HistoricalReturns>,
    start_date: NaiveDate,
    lookback: usize,
) -> Result<(AllocationWeights, Vec<Diagnostic>), MultitraderError> {
    if symbols.is_empty() {
        return Err(MultitraderError::NoUsableSymbols {
            stage: Stage::Allocation,
        });
    }

    let mut diagnostics = Vec::new();
    let weights = match strategy {
        AllocationStrategy::Equal => {
            let w = 1.0 / symbols.len() as f64;
            symbols.iter().map(|s| (s.clone(), w)).collect()
        }
        AllocationStrategy::RiskParity => {
            let returns = historical_returns.ok_or_else(|| MultitraderError::Allocation {
                reason: "risk_parity requires historical returns".into(),
            })?;
            risk_parity_weights(symbols, returns, start_date, lookback, &mut diagnostics)?
        }
        AllocationStrategy::Custom(custom) => {
            validate_custom_weights(custom)?;
            for symbol in custom.keys() {
                if !symbols.contains(symbol) {
                    diagnostics.push(
                        Diagnostic::warning(
                            Stage::Allocation,
                            "custom weight given for a symbol outside the active set; ignored",
                        )
                        .for_symbol(symbol),
                    );
                }
            }
            symbols
                .iter()
                .map(|s| {
                    let weight = custom.get(s).copied().unwrap_or_else(|| {
                        diagnostics.push(
                            Diagnostic::warning(
                                Stage::Allocation,
                                "no custom weight given; weight set to 0",
                            )
                            .for_symbol(s),
                        );
                        0.0
                    });
                    (s.clone(), weight)
                })
                .collect()
        }
    };

    let weights = AllocationWeights::try_new(weights)?;
    tracing::info!(
        strategy = strategy.name(),
        symbols = weights.len(),
        total = weights.sum(),
        "target allocations computed"
    );
    Ok((weights, diagnostics))
}

fn risk_parity_weights(
    symbols: &[String],
    returns: &HistoricalReturns,
    start_date: NaiveDate,
    lookback: usize,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<BTreeMap<String, f64>, MultitraderError> {
    let mut inverse_vol: BTreeMap<String, f64> = BTreeMap::new();

    for symbol in symbols {
        let window = returns
            .get(symbol)
            .map(|series| lookback_slice(series, start_date, lookback))
            .unwrap_or_default();

        let sigma = if window.len() >= 2 {
            window.std_dev()
        } else {
            f64::NAN
        };

        if sigma.is_finite() && sigma > 0.0 {
            inverse_vol.insert(symbol.clone(), 1.0 / sigma);
        } else {
            diagnostics.push(
                Diagnostic::warning(
                    Stage::Allocation,
                    "no usable volatility in the lookback window; weight set to 0",
                )
                .for_symbol(symbol),
            );
            inverse_vol.insert(symbol.clone(), 0.0);
        }
    }

    let total: f64 = inverse_vol.values().sum();
    if total <= 0.0 {
        return Err(MultitraderError::Allocation {
            reason: "risk_parity found no symbol with usable return history".into(),
        });
    }

    Ok(inverse_vol
        .into_iter()
        .map(|(symbol, iv)| (symbol, iv / total))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::returns::ReturnSeries;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Alternating ±`amplitude` returns on consecutive days before `start()`.
    fn alternating(amplitude: f64, days: i64) -> ReturnSeries {
        (1..=days)
            .map(|i| {
                let date = start() - chrono::Duration::days(i);
                let r = if i % 2 == 0 { amplitude } else { -amplitude };
                (date, r)
            })
            .collect()
    }

    #[test]
    fn equal_weights() {
        let (weights, diags) = calculate_target_allocations(
            &AllocationStrategy::Equal,
            &symbols(&["A", "B", "C", "D"]),
            None,
            start(),
            60,
        )
        .unwrap();
        assert!(diags.is_empty());
        for s in ["A", "B", "C", "D"] {
            assert_relative_eq!(weights.get(s), 0.25);
        }
        assert_relative_eq!(weights.sum(), 1.0);
    }

    #[test]
    fn risk_parity_favours_lower_volatility() {
        let mut returns = HistoricalReturns::new();
        returns.insert("A".into(), alternating(0.02, 30));
        returns.insert("B".into(), alternating(0.01, 30));

        let (weights, _) = calculate_target_allocations(
            &AllocationStrategy::RiskParity,
            &symbols(&["A", "B"]),
            Some(&returns),
            start(),
            60,
        )
        .unwrap();

        assert!(weights.get("B") > weights.get("A"));
        assert_relative_eq!(weights.get("A"), 1.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(weights.get("B"), 2.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn risk_parity_ignores_returns_on_or_after_start() {
        let mut returns = HistoricalReturns::new();
        let mut a = alternating(0.01, 20);
        // Wild post-start returns must not move the weights.
        for i in 0..10 {
            a.insert(start() + chrono::Duration::days(i), if i % 2 == 0 { 0.5 } else { -0.5 });
        }
        returns.insert("A".into(), a);
        returns.insert("B".into(), alternating(0.01, 20));

        let (weights, _) = calculate_target_allocations(
            &AllocationStrategy::RiskParity,
            &symbols(&["A", "B"]),
            Some(&returns),
            start(),
            60,
        )
        .unwrap();
        assert_relative_eq!(weights.get("A"), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn risk_parity_without_returns_is_config_error() {
        let err = calculate_target_allocations(
            &AllocationStrategy::RiskParity,
            &symbols(&["A"]),
            None,
            start(),
            60,
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn risk_parity_zero_volatility_symbol_gets_zero_weight() {
        let mut returns = HistoricalReturns::new();
        returns.insert("A".into(), alternating(0.01, 10));
        returns.insert("FLAT".into(), alternating(0.0, 10));

        let (weights, diags) = calculate_target_allocations(
            &AllocationStrategy::RiskParity,
            &symbols(&["A", "FLAT"]),
            Some(&returns),
            start(),
            60,
        )
        .unwrap();
        assert_relative_eq!(weights.get("FLAT"), 0.0);
        assert_relative_eq!(weights.get("A"), 1.0, epsilon = 1e-12);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].symbol.as_deref(), Some("FLAT"));
    }

    #[test]
    fn risk_parity_all_unusable_fails() {
        let returns = HistoricalReturns::new();
        let err = calculate_target_allocations(
            &AllocationStrategy::RiskParity,
            &symbols(&["A", "B"]),
            Some(&returns),
            start(),
            60,
        )
        .unwrap_err();
        assert!(matches!(err, MultitraderError::Allocation { .. }));
    }

    #[test]
    fn custom_absent_symbols_get_zero() {
        let custom: BTreeMap<String, f64> =
            [("A".to_string(), 0.6), ("X".to_string(), 0.2)].into();
        let (weights, diags) = calculate_target_allocations(
            &AllocationStrategy::Custom(custom),
            &symbols(&["A", "B"]),
            None,
            start(),
            60,
        )
        .unwrap();
        assert_relative_eq!(weights.get("A"), 0.6);
        assert_relative_eq!(weights.get("B"), 0.0);
        assert_eq!(weights.len(), 2);
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.stage == Stage::Allocation));
        let mut flagged: Vec<&str> = diags.iter().filter_map(|d| d.symbol.as_deref()).collect();
        flagged.sort_unstable();
        assert_eq!(flagged, vec!["B", "X"]);
        assert!(diags.iter().any(|d| d.symbol.as_deref() == Some("B")
            && d.message.contains("no custom weight")));
    }

    #[test]
    fn custom_over_allocation_rejected() {
        let custom: BTreeMap<String, f64> =
            [("A".to_string(), 0.6), ("B".to_string(), 0.5)].into();
        let err = calculate_target_allocations(
            &AllocationStrategy::Custom(custom),
            &symbols(&["A", "B"]),
            None,
            start(),
            60,
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn custom_negative_weight_rejected() {
        let custom: BTreeMap<String, f64> = [("A".to_string(), -0.1)].into();
        assert!(validate_custom_weights(&custom).is_err());
    }

    #[test]
    fn empty_symbol_set_is_fatal() {
        let err = calculate_target_allocations(
            &AllocationStrategy::Equal,
            &[],
            None,
            start(),
            60,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MultitraderError::NoUsableSymbols {
                stage: Stage::Allocation
            }
        ));
    }

    proptest! {
        #[test]
        fn allocations_never_exceed_one(
            n in 1usize..12,
            amplitudes in proptest::collection::vec(0.0f64..0.2, 12),
            raw_custom in proptest::collection::vec(0.0f64..1.0, 12),
        ) {
            let names: Vec<String> = (0..n).map(|i| format!("S{i}")).collect();

            let (equal, _) = calculate_target_allocations(
                &AllocationStrategy::Equal, &names, None, start(), 60,
            ).unwrap();
            prop_assert!(equal.sum() <= 1.0 + WEIGHT_EPSILON);

            let returns: HistoricalReturns = names
                .iter()
                .zip(&amplitudes)
                .map(|(s, &a)| (s.clone(), alternating(a, 20)))
                .collect();
            if let Ok((rp, _)) = calculate_target_allocations(
                &AllocationStrategy::RiskParity, &names, Some(&returns), start(), 60,
            ) {
                prop_assert!(rp.sum() <= 1.0 + WEIGHT_EPSILON);
            }

            let total: f64 = raw_custom[..n].iter().sum();
            let custom: BTreeMap<String, f64> = names
                .iter()
                .zip(&raw_custom)
                .map(|(s, &w)| (s.clone(), if total > 0.0 { w / total } else { 0.0 }))
                .collect();
            let (c, _) = calculate_target_allocations(
                &AllocationStrategy::Custom(custom), &names, None, start(), 60,
            ).unwrap();
            prop_assert!(c.sum() <= 1.0 + WEIGHT_EPSILON);
        }
    }
}
