//! Intensity standardization.
//!
//! Removes the mean, divides by a floored standard deviation and maps the
//! result linearly onto a target range using the observed min/max.

use ndarray::Array2;

/// Linearly map `field` onto `[lo, hi]` using its observed min and max.
///
/// A constant field has no range to stretch and maps to `lo` everywhere.
pub fn rescale(field: &Array2<f64>, lo: f64, hi: f64) -> Array2<f64> {
    let (min, max) = field
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(mn, mx), &v| (mn.min(v), mx.max(v)));

    let span = max - min;
    if !(span > 0.0) {
        return Array2::from_elem(field.dim(), lo);
    }

    field.mapv(|v| (hi - lo) * (v - min) / span + lo)
}

/// Standard deviation floored at `1/sqrt(N)` so near-uniform images never divide by ~0
pub fn adjusted_std(field: &Array2<f64>, mean: f64) -> f64 {
    let n = field.len() as f64;
    let variance = field.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt().max(1.0 / n.sqrt())
}

/// Standardize and rescale onto `[lo, hi]`
pub fn standardize_to(field: &Array2<f64>, lo: f64, hi: f64) -> Array2<f64> {
    if field.is_empty() {
        return field.clone();
    }

    let mean = field.iter().sum::<f64>() / field.len() as f64;
    let s = adjusted_std(field, mean);
    let standardized = field.mapv(|v| (v - mean) / s);

    rescale(&standardized, lo, hi)
}

/// Standardize onto the unit range
pub fn standardize(field: &Array2<f64>) -> Array2<f64> {
    standardize_to(field, 0.0, 1.0)
}
