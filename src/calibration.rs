//! Turns averaged scale power into a grain-size distribution.
//!
//! Stages run in a fixed order and each one leaves the frequencies summing
//! to one. Every stage works in pixel units; sizes are only multiplied by the
//! resolution when the distribution is handed out, so the result does not
//! depend on the resolution beyond that final scaling.

use std::f64::consts::PI;

use crate::config::{AnalysisConfig, CalibrationConfig};
use crate::errors::{GrainSizeError, Result};
use crate::scale_space::ScaleSpectrum;

/// Scales at or below this period (pixels) are below the transform's reliable resolution
pub const LOWER_CUTOFF: f64 = 2.0 * PI;

/// Below this spread the peak correction has no meaningful width
const MIN_PEAK_SPREAD: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedDistribution {
    /// Grain sizes in physical units, ascending
    pub bins: Vec<f64>,
    /// Volume-weighted proportions, summing to one
    pub frequencies: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct DistributionCalibrator {
    stages: CalibrationConfig,
    resolution: f64,
    exponent: f64,
}

impl DistributionCalibrator {
    pub fn new(analysis: &AnalysisConfig) -> Self {
        Self {
            stages: analysis.calibration.clone(),
            resolution: analysis.resolution,
            exponent: analysis.area_to_volume_exponent,
        }
    }

    /// `row_length` is the length in pixels of the rows the spectrum came from
    pub fn calibrate(&self, spectrum: &ScaleSpectrum, row_length: usize) -> Result<CalibratedDistribution> {
        if spectrum.scales.len() != spectrum.power.len() || spectrum.scales.is_empty() {
            return Err(GrainSizeError::NumericDegeneracy(format!(
                "spectrum has {} scales but {} power values",
                spectrum.scales.len(),
                spectrum.power.len()
            )));
        }

        let mut scales = spectrum.scales.clone();
        let mut freqs = spectrum.power.clone();
        normalize(&mut freqs)?;

        if self.stages.scale_reweight {
            reweight_by_scale(&scales, &mut freqs)?;
        }

        if self.stages.trim_lower {
            retain_scales(&mut scales, &mut freqs, |s| s > LOWER_CUTOFF)?;
        }
        if let Some(divisor) = self.stages.upper_trim_divisor {
            let upper = row_length as f64 / divisor;
            retain_scales(&mut scales, &mut freqs, |s| s < upper)?;
        }
        log::debug!(
            "Calibrating over {} scales ({:.2} to {:.2} px)",
            scales.len(),
            scales.first().copied().unwrap_or_default(),
            scales.last().copied().unwrap_or_default()
        );

        if self.stages.gaussian_taper {
            gaussian_taper(&mut freqs)?;
        }

        if self.stages.peak_correction {
            peak_correction(&scales, &mut freqs, &spectrum.row_peaks)?;
        }

        area_to_volume(&scales, &mut freqs, self.exponent)?;

        Ok(CalibratedDistribution {
            bins: scales.iter().map(|s| s * self.resolution).collect(),
            frequencies: freqs,
        })
    }
}

/// Scale to unit sum.
///
/// A vector carrying no mass (e.g. from a featureless image) becomes a spike
/// on its first entry, the smallest scale. Non-finite input is an error.
pub fn normalize(values: &mut [f64]) -> Result<()> {
    if values.is_empty() {
        return Err(GrainSizeError::NumericDegeneracy(
            "cannot normalize an empty distribution".to_string(),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(GrainSizeError::NumericDegeneracy(
            "distribution contains non-finite values".to_string(),
        ));
    }

    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.iter_mut().for_each(|v| *v /= total);
    } else {
        values.iter_mut().for_each(|v| *v = 0.0);
        values[0] = 1.0;
    }
    Ok(())
}

/// Weight by scale^-0.5, countering the estimator's bias towards small scales
pub fn reweight_by_scale(scales: &[f64], freqs: &mut [f64]) -> Result<()> {
    for (f, s) in freqs.iter_mut().zip(scales.iter()) {
        *f /= s.sqrt();
    }
    normalize(freqs)
}

/// Keep only the scales accepted by `keep`
pub fn retain_scales<F>(scales: &mut Vec<f64>, freqs: &mut Vec<f64>, keep: F) -> Result<()>
where
    F: Fn(f64) -> bool,
{
    let (kept_scales, kept_freqs): (Vec<f64>, Vec<f64>) = scales
        .iter()
        .zip(freqs.iter())
        .filter(|(s, _)| keep(**s))
        .map(|(s, f)| (*s, *f))
        .unzip();

    if kept_scales.is_empty() {
        return Err(GrainSizeError::NumericDegeneracy(format!(
            "no scales left after trimming {} px to {} px",
            scales.first().copied().unwrap_or_default(),
            scales.last().copied().unwrap_or_default()
        )));
    }

    *scales = kept_scales;
    *freqs = kept_freqs;
    normalize(freqs)
}

/// Gaussian window centred on the index midpoint, falling to exp(-π²/8) at the ends
pub fn gaussian_taper(freqs: &mut [f64]) -> Result<()> {
    let len = freqs.len();
    if len < 2 {
        return Ok(());
    }

    let half = (len - 1) as f64 / 2.0;
    for (i, f) in freqs.iter_mut().enumerate() {
        let n = i as f64 - half;
        *f *= (-0.5 * ((PI / 2.0) * n / half).powi(2)).exp();
    }
    normalize(freqs)
}

/// Add a normal density centred on the mean per-row peak scale.
///
/// The spread is half the current distribution's standard deviation about
/// that centre. Skipped when no row had a peak or the spread vanishes.
pub fn peak_correction(scales: &[f64], freqs: &mut [f64], row_peaks: &[f64]) -> Result<()> {
    if row_peaks.is_empty() {
        log::debug!("Peak correction skipped: no row peaks");
        return Ok(());
    }

    let centre = row_peaks.iter().sum::<f64>() / row_peaks.len() as f64;
    let spread = freqs
        .iter()
        .zip(scales.iter())
        .map(|(f, s)| f * (s - centre).powi(2))
        .sum::<f64>()
        .sqrt()
        / 2.0;

    if !(spread > MIN_PEAK_SPREAD) {
        log::debug!("Peak correction skipped: spread {:.3e} too small", spread);
        return Ok(());
    }

    log::debug!("Peak correction centred at {:.2} px, sd {:.2} px", centre, spread);
    for (f, s) in freqs.iter_mut().zip(scales.iter()) {
        *f += normal_pdf(*s, centre, spread);
    }
    normalize(freqs)
}

fn normal_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    (-0.5 * z * z).exp() / (sd * (2.0 * PI).sqrt())
}

/// Area-by-number to volume-by-weight: weight each proportion by scale^exponent
pub fn area_to_volume(scales: &[f64], freqs: &mut [f64], exponent: f64) -> Result<()> {
    for (f, s) in freqs.iter_mut().zip(scales.iter()) {
        *f *= s.powf(exponent);
    }
    normalize(freqs)
}
