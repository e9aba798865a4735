// Moment statistics and percentiles of a calibrated grain-size distribution

use serde::{Deserialize, Serialize};

use crate::calibration::{normalize, CalibratedDistribution};
use crate::errors::{GrainSizeError, Result};

/// Number of grid points used when merging distributions of several images
pub const MERGED_GRID_POINTS: usize = 200;

/// Everything reported for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainSizeResult {
    pub mean: f64,
    /// Standard deviation about the mean
    pub sorting: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    /// Requested cumulative levels
    pub percentiles: Vec<f64>,
    /// Size at each requested level
    pub percentile_values: Vec<f64>,
    pub bins: Vec<f64>,
    pub frequencies: Vec<f64>,
}

impl GrainSizeResult {
    /// Fail on any NaN or infinity in the record
    pub fn ensure_finite(&self) -> Result<()> {
        let scalars = [
            ("mean", self.mean),
            ("sorting", self.sorting),
            ("skewness", self.skewness),
            ("kurtosis", self.kurtosis),
        ];
        if let Some((name, value)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GrainSizeError::NumericDegeneracy(format!(
                "{} is not finite ({})",
                name, value
            )));
        }

        let mut vectors = self
            .percentile_values
            .iter()
            .chain(self.bins.iter())
            .chain(self.frequencies.iter());
        if vectors.any(|v| !v.is_finite()) {
            return Err(GrainSizeError::NumericDegeneracy(
                "result distribution contains non-finite values".to_string(),
            ));
        }

        Ok(())
    }

    pub fn distribution(&self) -> CalibratedDistribution {
        CalibratedDistribution {
            bins: self.bins.clone(),
            frequencies: self.frequencies.clone(),
        }
    }
}

/// Mean, sorting, skewness, kurtosis and percentiles of a distribution
///
/// Skewness and kurtosis divide the central moments by 100·sorting^k rather
/// than sorting^k, the scaling used by earlier DGS releases.
pub fn compute_statistics(distribution: &CalibratedDistribution, levels: &[f64]) -> Result<GrainSizeResult> {
    let bins = &distribution.bins;
    let freqs = &distribution.frequencies;
    if bins.is_empty() || bins.len() != freqs.len() {
        return Err(GrainSizeError::NumericDegeneracy(format!(
            "distribution has {} bins but {} frequencies",
            bins.len(),
            freqs.len()
        )));
    }

    let mean: f64 = freqs.iter().zip(bins.iter()).map(|(f, b)| f * b).sum();
    let central_moment = |k: i32| -> f64 {
        freqs
            .iter()
            .zip(bins.iter())
            .map(|(f, b)| f * (b - mean).powi(k))
            .sum()
    };

    let sorting = central_moment(2).sqrt();
    let (skewness, kurtosis) = if sorting > f64::EPSILON {
        (
            central_moment(3) / (100.0 * sorting.powi(3)),
            central_moment(4) / (100.0 * sorting.powi(4)),
        )
    } else {
        (0.0, 0.0)
    };

    let result = GrainSizeResult {
        mean,
        sorting,
        skewness,
        kurtosis,
        percentiles: levels.to_vec(),
        percentile_values: interp_percentiles(bins, freqs, levels),
        bins: bins.clone(),
        frequencies: freqs.clone(),
    };
    result.ensure_finite()?;

    Ok(result)
}

/// Size at each cumulative level, interpolating linearly along the
/// cumulative curve anchored at (0, 0)
///
/// A level falling on a flat stretch of the curve takes the upper bin; levels
/// beyond the total mass take the last bin.
pub fn interp_percentiles(bins: &[f64], freqs: &[f64], levels: &[f64]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(freqs.len() + 1);
    cumulative.push(0.0);
    let mut running = 0.0;
    for f in freqs {
        running += f;
        cumulative.push(running);
    }

    let mut sizes = Vec::with_capacity(bins.len() + 1);
    sizes.push(0.0);
    sizes.extend_from_slice(bins);

    levels
        .iter()
        .map(|&level| {
            if level <= 0.0 {
                return 0.0;
            }
            match cumulative.iter().position(|&c| c >= level) {
                Some(0) => sizes[0],
                Some(j) => {
                    let (c0, c1) = (cumulative[j - 1], cumulative[j]);
                    if c1 > c0 {
                        sizes[j - 1] + (level - c0) / (c1 - c0) * (sizes[j] - sizes[j - 1])
                    } else {
                        sizes[j]
                    }
                }
                None => sizes[sizes.len() - 1],
            }
        })
        .collect()
}

/// Linear interpolation of `(xs, ys)` at `x`, zero outside the sampled range
fn interp_or_zero(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    match (xs.first(), xs.last()) {
        (Some(&lo), Some(&hi)) if x >= lo && x <= hi => {
            let j = xs.partition_point(|&v| v < x);
            if j == 0 || xs[j] == x {
                return ys[j];
            }
            let t = (x - xs[j - 1]) / (xs[j] - xs[j - 1]);
            ys[j - 1] + t * (ys[j] - ys[j - 1])
        }
        _ => 0.0,
    }
}

/// Average several distributions on a shared, evenly spaced size grid
pub fn merge_distributions(distributions: &[CalibratedDistribution], grid_points: usize) -> Result<CalibratedDistribution> {
    if distributions.is_empty() {
        return Err(GrainSizeError::Input(
            "no distributions to merge".to_string(),
        ));
    }
    if grid_points < 2 {
        return Err(GrainSizeError::Config(
            "a merged grid needs at least two points".to_string(),
        ));
    }

    let (lo, hi) = distributions
        .iter()
        .flat_map(|d| d.bins.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &b| (lo.min(b), hi.max(b)));
    if !(lo.is_finite() && hi.is_finite()) {
        return Err(GrainSizeError::NumericDegeneracy(
            "distributions to merge have no finite bins".to_string(),
        ));
    }

    let step = (hi - lo) / (grid_points - 1) as f64;
    let bins: Vec<f64> = (0..grid_points).map(|i| lo + i as f64 * step).collect();

    let mut frequencies = vec![0.0; grid_points];
    for distribution in distributions {
        for (total, &x) in frequencies.iter_mut().zip(bins.iter()) {
            *total += interp_or_zero(&distribution.bins, &distribution.frequencies, x);
        }
    }
    normalize(&mut frequencies)?;

    Ok(CalibratedDistribution { bins, frequencies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn discrete_gaussian(mean: f64, sd: f64) -> CalibratedDistribution {
        let bins: Vec<f64> = (0..=100).map(|b| b as f64).collect();
        let mut frequencies: Vec<f64> = bins
            .iter()
            .map(|b| (-0.5 * ((b - mean) / sd).powi(2)).exp())
            .collect();
        normalize(&mut frequencies).unwrap();
        CalibratedDistribution { bins, frequencies }
    }

    #[test]
    fn symmetric_distribution_moments() {
        let result = compute_statistics(&discrete_gaussian(50.0, 5.0), &[0.16, 0.5, 0.84]).unwrap();

        assert_approx_eq!(result.mean, 50.0, 1e-9);
        assert_approx_eq!(result.sorting, 5.0, 1e-3);
        assert_approx_eq!(result.skewness, 0.0, 1e-9);
        // normal kurtosis of 3, under the /100 scaling
        assert_approx_eq!(result.kurtosis, 0.03, 1e-4);
        assert_approx_eq!(result.percentile_values[1], 50.0, 0.6);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let distribution = CalibratedDistribution {
            bins: vec![2.0, 4.0, 8.0, 16.0, 32.0],
            frequencies: vec![0.1, 0.0, 0.5, 0.0, 0.4],
        };
        let levels: Vec<f64> = (1..100).map(|i| i as f64 / 100.0).collect();
        let values = interp_percentiles(&distribution.bins, &distribution.frequencies, &levels);

        for pair in values.windows(2) {
            assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn percentile_interpolation_from_anchor() {
        let bins = [10.0, 20.0];
        let freqs = [0.5, 0.5];
        let values = interp_percentiles(&bins, &freqs, &[0.25, 0.5, 0.75, 1.5]);
        assert_approx_eq!(values[0], 5.0);
        assert_approx_eq!(values[1], 10.0);
        assert_approx_eq!(values[2], 15.0);
        assert_approx_eq!(values[3], 20.0);
    }

    #[test]
    fn spike_has_zero_spread_and_no_nan() {
        let distribution = CalibratedDistribution {
            bins: vec![7.0, 8.0, 9.0],
            frequencies: vec![1.0, 0.0, 0.0],
        };
        let result = compute_statistics(&distribution, &[0.5]).unwrap();
        assert_eq!(result.mean, 7.0);
        assert_eq!(result.sorting, 0.0);
        assert_eq!(result.skewness, 0.0);
        assert_eq!(result.kurtosis, 0.0);
    }

    #[test]
    fn non_finite_results_are_rejected() {
        let distribution = CalibratedDistribution {
            bins: vec![1.0, f64::INFINITY],
            frequencies: vec![0.5, 0.5],
        };
        assert!(matches!(
            compute_statistics(&distribution, &[0.5]),
            Err(GrainSizeError::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn merging_identical_distributions_preserves_shape() {
        let a = discrete_gaussian(40.0, 6.0);
        let merged = merge_distributions(&[a.clone(), a.clone()], 101).unwrap();

        assert_eq!(merged.bins.len(), 101);
        assert_approx_eq!(merged.bins[0], 0.0);
        assert_approx_eq!(merged.bins[100], 100.0);
        for (m, f) in merged.frequencies.iter().zip(a.frequencies.iter()) {
            assert_approx_eq!(m, f, 1e-12);
        }
    }

    #[test]
    fn merged_grid_spans_all_inputs() {
        let small = CalibratedDistribution { bins: vec![1.0, 2.0], frequencies: vec![0.5, 0.5] };
        let large = CalibratedDistribution { bins: vec![9.0, 10.0], frequencies: vec![0.5, 0.5] };
        let merged = merge_distributions(&[small, large], 10).unwrap();

        assert_approx_eq!(merged.bins[0], 1.0);
        assert_approx_eq!(merged.bins[9], 10.0);
        assert_approx_eq!(merged.frequencies.iter().sum::<f64>(), 1.0, 1e-12);
        assert!(merged.frequencies[4] == 0.0 && merged.frequencies[5] == 0.0);
    }

    #[test]
    fn merging_nothing_is_an_input_error() {
        assert!(matches!(merge_distributions(&[], 10), Err(GrainSizeError::Input(_))));
    }
}
