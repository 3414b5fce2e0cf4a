//! Pairwise return correlation and portfolio diversification measures.

use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use super::allocation::AllocationWeights;
use super::returns::{HistoricalReturns, ReturnSeries};

/// Symmetric symbol × symbol Pearson correlations. Undefined pairs are NaN
/// and serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CorrelationMatrix(BTreeMap<String, BTreeMap<String, f64>>);

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.0.get(a).and_then(|row| row.get(b)).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiversificationMetrics {
    /// Allocation-weighted mean of off-diagonal correlations.
    pub avg_correlation: f64,
    /// Herfindahl index of the weights.
    pub concentration: f64,
    pub effective_bets: f64,
    pub max_weight: f64,
    pub num_assets: usize,
}

/// Pearson correlation over the dates both series share.
pub fn pairwise_correlation(a: &ReturnSeries, b: &ReturnSeries) -> f64 {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .iter()
        .filter_map(|(date, &x)| b.get(date).map(|&y| (x, y)))
        .unzip();

    if xs.len() < 2 {
        return f64::NAN;
    }

    let sx = xs.iter().std_dev();
    let sy = ys.iter().std_dev();
    if !(sx > 0.0 && sy > 0.0) {
        return f64::NAN;
    }
    let cov = xs.iter().covariance(ys.iter());
    (cov / (sx * sy)).clamp(-1.0, 1.0)
}

pub fn calculate_correlation_matrix(historical_returns: &HistoricalReturns) -> CorrelationMatrix {
    let symbols: Vec<&String> = historical_returns.keys().collect();
    let mut matrix: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();

    for (i, &a) in symbols.iter().enumerate() {
        for &b in &symbols[i..] {
            let rho = pairwise_correlation(&historical_returns[a], &historical_returns[b]);
            matrix.entry(a.clone()).or_default().insert(b.clone(), rho);
            matrix.entry(b.clone()).or_default().insert(a.clone(), rho);
        }
    }

    CorrelationMatrix(matrix)
}

pub fn calculate_diversification_metrics(
    correlation_matrix: &CorrelationMatrix,
    allocations: &AllocationWeights,
) -> DiversificationMetrics {
    let weights: Vec<(&String, f64)> = allocations.iter().map(|(s, &w)| (s, w)).collect();

    let mut weighted_sum = 0.0_f64;
    let mut pair_weight = 0.0_f64;
    for (i, &(a, wa)) in weights.iter().enumerate() {
        for &(b, wb) in &weights[i + 1..] {
            let Some(rho) = correlation_matrix.get(a, b) else {
                continue;
            };
            let w = wa * wb;
            if rho.is_nan() || w <= 0.0 {
                continue;
            }
            weighted_sum += w * rho;
            pair_weight += w;
        }
    }
    let avg_correlation = if pair_weight > 0.0 {
        weighted_sum / pair_weight
    } else {
        f64::NAN
    };

    let concentration: f64 = weights.iter().map(|&(_, w)| w * w).sum();
    let effective_bets = if concentration > 0.0 {
        1.0 / concentration
    } else {
        0.0
    };

    DiversificationMetrics {
        avg_correlation,
        concentration,
        effective_bets,
        max_weight: weights.iter().map(|&(_, w)| w).fold(0.0, f64::max),
        num_assets: weights.iter().filter(|&&(_, w)| w > 0.0).count(),
    }
}
