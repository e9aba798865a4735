//! Per-row multiscale power analysis.
//!
//! A sample of image rows is transformed over a band of periods; each row's
//! coefficient power is averaged over position and divided by period² to
//! cancel the transform's growth of energy with scale. The per-row curves
//! are then averaged into a single power-vs-scale curve.
//!
//! Rows are independent, so they are mapped in parallel and reduced in row
//! order, which keeps results bit-identical between runs.

use ndarray::Array2;
use rayon::prelude::*;

use crate::config::RowSampling;
use crate::errors::{GrainSizeError, Result};
use crate::wavelet::MultiscaleTransform;

/// Upper bound on row-sampling attempts before giving up
pub const MAX_SAMPLING_ATTEMPTS: usize = 8;

/// Averaged power per scale for one image
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSpectrum {
    /// Periods in pixels, ascending
    pub scales: Vec<f64>,
    /// Mean scale-normalised power over the sampled rows, one entry per scale
    pub power: Vec<f64>,
    /// Period at which each row's power peaks (rows without energy are skipped)
    pub row_peaks: Vec<f64>,
    pub rows_used: usize,
    pub sampling: RowSampling,
}

struct RowSpectrum {
    power: Vec<f64>,
    peak: Option<f64>,
}

/// Periods from `min_scale` up to (excluding) `long_dim / max_scale`
pub fn period_band(long_dim: usize, max_scale: u32, min_scale: f64, step: f64) -> Result<Vec<f64>> {
    if max_scale == 0 || !(step > 0.0) {
        return Err(GrainSizeError::Config(
            "max_scale and scale_step must be positive".to_string(),
        ));
    }

    let upper = long_dim as f64 / max_scale as f64;
    let periods: Vec<f64> = (0..)
        .map(|i| min_scale + i as f64 * step)
        .take_while(|&p| p < upper)
        .collect();

    if periods.is_empty() {
        return Err(GrainSizeError::NumericDegeneracy(format!(
            "no scales between {} and {:.2} px: image row of {} px is too short for max_scale {}",
            min_scale, upper, long_dim, max_scale
        )));
    }

    Ok(periods)
}

impl RowSampling {
    /// Row indices to analyse for an image with `n_rows` rows
    pub fn rows(&self, n_rows: usize) -> Vec<usize> {
        if n_rows == 0 {
            return Vec::new();
        }

        match *self {
            RowSampling::Every(k) => (0..n_rows).step_by(k.max(1)).collect(),
            RowSampling::Count(n) => {
                let end = (n_rows - 1) as f64;
                let start = end.min(1.0);
                if n <= 1 {
                    return vec![start as usize];
                }
                let spacing = (end - start) / (n - 1) as f64;
                (0..n).map(|i| (start + i as f64 * spacing) as usize).collect()
            }
        }
    }

    /// Raise a legacy density until no more than `max_rows` rows are visited
    pub fn capped(self, n_rows: usize, max_rows: usize) -> Self {
        match self {
            RowSampling::Every(k) => {
                let minimum = n_rows.div_ceil(max_rows.max(1));
                RowSampling::Every(k.max(minimum).max(1))
            }
            count => count,
        }
    }

    /// Next coarser sampling, if one still changes the rows visited
    pub fn coarser(self, n_rows: usize) -> Option<Self> {
        match self {
            RowSampling::Every(k) if k < n_rows => Some(RowSampling::Every(k + 1)),
            RowSampling::Count(n) if n > 1 => Some(RowSampling::Count(n - 1)),
            _ => None,
        }
    }
}

pub struct ScaleSpaceAnalyzer<T: MultiscaleTransform> {
    transform: T,
    periods: Vec<f64>,
    wavelet_scales: Vec<f64>,
    parallel: bool,
}

impl<T: MultiscaleTransform> ScaleSpaceAnalyzer<T> {
    pub fn new(transform: T, periods: Vec<f64>) -> Result<Self> {
        if periods.is_empty() {
            return Err(GrainSizeError::NumericDegeneracy(
                "scale-space analysis needs at least one period".to_string(),
            ));
        }
        if periods.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GrainSizeError::Config(
                "analysis periods must be strictly increasing".to_string(),
            ));
        }

        let wavelet_scales = periods.iter().map(|&p| transform.scale_for_period(p)).collect();
        Ok(Self {
            transform,
            periods,
            wavelet_scales,
            parallel: true,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn periods(&self) -> &[f64] {
        &self.periods
    }

    fn row_spectrum(&self, index: usize, row: &[f64]) -> Result<RowSpectrum> {
        let coefficients = self.transform.transform(row, &self.wavelet_scales)?;

        let power: Vec<f64> = coefficients
            .iter()
            .zip(self.periods.iter())
            .map(|(coeffs, &period)| {
                let mean = coeffs.iter().map(|c| c.norm_sqr()).sum::<f64>() / coeffs.len() as f64;
                mean / (period * period)
            })
            .collect();

        if power.iter().any(|p| !p.is_finite()) {
            return Err(GrainSizeError::NumericDegeneracy(format!(
                "row {} produced non-finite power",
                index
            )));
        }

        let peak = if power.iter().sum::<f64>() > 0.0 {
            power
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| self.periods[i])
        } else {
            None
        };

        Ok(RowSpectrum { power, peak })
    }

    /// Average the scale-normalised power of the given rows
    pub fn analyze_rows(&self, texture: &Array2<f64>, rows: &[usize]) -> Result<ScaleSpectrum> {
        if rows.is_empty() {
            return Err(GrainSizeError::NumericDegeneracy(
                "no rows selected for analysis".to_string(),
            ));
        }
        if let Some(&bad) = rows.iter().find(|&&r| r >= texture.nrows()) {
            return Err(GrainSizeError::Config(format!(
                "row {} is outside a texture of {} rows",
                bad,
                texture.nrows()
            )));
        }

        let compute = |&r: &usize| {
            let row = texture.row(r).to_vec();
            self.row_spectrum(r, &row)
        };
        let spectra: Vec<RowSpectrum> = if self.parallel {
            rows.par_iter().map(compute).collect::<Result<_>>()?
        } else {
            rows.iter().map(compute).collect::<Result<_>>()?
        };

        let mut power = vec![0.0; self.periods.len()];
        for spectrum in &spectra {
            for (total, p) in power.iter_mut().zip(spectrum.power.iter()) {
                *total += p;
            }
        }
        let count = spectra.len() as f64;
        power.iter_mut().for_each(|p| *p /= count);

        Ok(ScaleSpectrum {
            scales: self.periods.clone(),
            power,
            row_peaks: spectra.iter().filter_map(|s| s.peak).collect(),
            rows_used: spectra.len(),
            sampling: RowSampling::Count(spectra.len()),
        })
    }

    /// Analyse with the requested sampling, falling back to coarser samplings
    /// when rows produce degenerate power. Gives up after
    /// [`MAX_SAMPLING_ATTEMPTS`] attempts.
    pub fn analyze(
        &self,
        texture: &Array2<f64>,
        sampling: RowSampling,
        max_rows: usize,
    ) -> Result<ScaleSpectrum> {
        let (n_rows, n_cols) = texture.dim();
        if n_rows == 0 || n_cols < 2 {
            return Err(GrainSizeError::NumericDegeneracy(format!(
                "texture of {}x{} is too small for scale-space analysis",
                n_rows, n_cols
            )));
        }

        let mut sampling = sampling.capped(n_rows, max_rows);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let rows = sampling.rows(n_rows);
            log::debug!("Scale-space attempt {}: {} ({} rows)", attempts, sampling, rows.len());

            match self.analyze_rows(texture, &rows) {
                Ok(mut spectrum) => {
                    spectrum.sampling = sampling;
                    return Ok(spectrum);
                }
                Err(GrainSizeError::NumericDegeneracy(reason)) => {
                    log::warn!("Row sampling '{}' failed: {}", sampling, reason);
                    match sampling.coarser(n_rows) {
                        Some(next) if attempts < MAX_SAMPLING_ATTEMPTS => sampling = next,
                        _ => {
                            return Err(GrainSizeError::RetryExhausted {
                                attempts,
                                sampling: sampling.to_string(),
                            })
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
