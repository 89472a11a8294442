//! Per-run min-max normalization and the weighted composite score.
//!
//! Normalization only ever looks at the current candidate set, so scores are
//! comparable within one run and never across runs.

use crate::model::FeatureVector;

/// Weights for subs, views, videos, freq, recency. They sum to 1.
pub const WEIGHTS: [f64; 5] = [0.25, 0.25, 0.10, 0.20, 0.20];

/// Digits kept when persisting a score.
pub const SCORE_DECIMALS: i32 = 6;

/// Maps `values` onto [0, 1]. When every value is equal, every result is 0.
#[must_use]
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    values
        .iter()
        .map(|value| {
            if span > 0.0 {
                ((value - min) / span).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Normalizes each feature column independently across the set.
#[must_use]
pub fn normalize_all(raw: &[FeatureVector]) -> Vec<FeatureVector> {
    let columns: Vec<Vec<f64>> = (0..WEIGHTS.len())
        .map(|feature| {
            let column: Vec<f64> = raw.iter().map(|vector| vector.as_array()[feature]).collect();
            normalize(&column)
        })
        .collect();

    (0..raw.len())
        .map(|row| {
            let mut values = [0.0; 5];
            for (feature, column) in columns.iter().enumerate() {
                values[feature] = column[row];
            }
            FeatureVector::from_array(values)
        })
        .collect()
}

#[must_use]
pub fn round_score(score: f64) -> f64 {
    let scale = 10_f64.powi(SCORE_DECIMALS);
    (score * scale).round() / scale
}

/// Weighted sum of normalized features, rounded for persistence.
#[must_use]
pub fn composite(normalized: &FeatureVector) -> f64 {
    let sum = normalized
        .as_array()
        .iter()
        .zip(WEIGHTS.iter())
        .map(|(value, weight)| value * weight)
        .sum::<f64>();
    round_score(sum)
}
