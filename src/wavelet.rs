// Continuous wavelet transform of 1-D signals

use std::f64::consts::PI;
use rustfft::{FftPlanner, num_complex::Complex};

use crate::errors::{GrainSizeError, Result};

/// Multiscale transform of a single image row
///
/// Given a 1-D signal and wavelet scales, returns one row of complex
/// coefficients per scale, each as long as the signal.
pub trait MultiscaleTransform: Sync {
    fn transform(&self, signal: &[f64], scales: &[f64]) -> Result<Vec<Vec<Complex<f64>>>>;

    /// Equivalent Fourier period (pixels) of a unit wavelet scale
    fn fourier_factor(&self) -> f64;

    fn scale_for_period(&self, period: f64) -> f64 {
        period / self.fourier_factor()
    }
}

/// Real-valued Morlet wavelet, `exp(-t²/2)·cos(ω0·t)`, evaluated in the frequency domain
#[derive(Debug, Clone, Copy)]
pub struct MorletTransform {
    omega0: f64,
}

impl MorletTransform {
    pub fn new(omega0: f64) -> Result<Self> {
        if !(omega0.is_finite() && omega0 > 0.0) {
            return Err(GrainSizeError::Config(format!(
                "Morlet centre frequency must be > 0, got {}",
                omega0
            )));
        }
        Ok(Self { omega0 })
    }

    pub fn omega0(&self) -> f64 {
        self.omega0
    }

    /// Fourier transform of the mother wavelet at angular frequency `omega`
    fn psi_hat(&self, omega: f64) -> f64 {
        let norm = PI.powf(-0.25) * (2.0 * PI).sqrt() * 0.5;
        norm * ((-0.5 * (omega - self.omega0).powi(2)).exp()
            + (-0.5 * (omega + self.omega0).powi(2)).exp())
    }
}

impl Default for MorletTransform {
    fn default() -> Self {
        Self { omega0: 5.0 }
    }
}

impl MultiscaleTransform for MorletTransform {
    fn transform(&self, signal: &[f64], scales: &[f64]) -> Result<Vec<Vec<Complex<f64>>>> {
        let n = signal.len();
        if n < 2 {
            return Err(GrainSizeError::NumericDegeneracy(format!(
                "signal of length {} is too short for a wavelet transform",
                n
            )));
        }
        if let Some(bad) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(GrainSizeError::Config(format!("invalid wavelet scale {}", bad)));
        }

        // Zero padding to twice the length keeps wrap-around away from the signal
        let padded_len = (2 * n).next_power_of_two();
        let mean = signal.iter().sum::<f64>() / n as f64;

        let mut spectrum: Vec<Complex<f64>> = signal
            .iter()
            .map(|&x| Complex::new(x - mean, 0.0))
            .collect();
        spectrum.resize(padded_len, Complex::new(0.0, 0.0));

        let mut planner = FftPlanner::new();
        planner.plan_fft_forward(padded_len).process(&mut spectrum);
        let inverse = planner.plan_fft_inverse(padded_len);

        let omegas: Vec<f64> = (0..padded_len)
            .map(|k| {
                let k = if k <= padded_len / 2 { k as f64 } else { k as f64 - padded_len as f64 };
                2.0 * PI * k / padded_len as f64
            })
            .collect();

        let mut coefficients = Vec::with_capacity(scales.len());
        let mut buffer = vec![Complex::new(0.0, 0.0); padded_len];
        for &scale in scales {
            let norm = (2.0 * PI * scale).sqrt() / padded_len as f64;
            for ((out, &x), &omega) in buffer.iter_mut().zip(spectrum.iter()).zip(omegas.iter()) {
                *out = x * (norm * self.psi_hat(scale * omega));
            }
            inverse.process(&mut buffer);
            coefficients.push(buffer[..n].to_vec());
        }

        Ok(coefficients)
    }

    fn fourier_factor(&self) -> f64 {
        4.0 * PI / (self.omega0 + (2.0 + self.omega0 * self.omega0).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn mean_power(row: &[Complex<f64>]) -> f64 {
        row.iter().map(|c| c.norm_sqr()).sum::<f64>() / row.len() as f64
    }

    #[test]
    fn fourier_factor_matches_morlet_reference() {
        let morlet = MorletTransform::default();
        assert_approx_eq!(morlet.fourier_factor(), 1.23246, 1e-4);
        assert_approx_eq!(morlet.scale_for_period(morlet.fourier_factor() * 7.0), 7.0);
    }

    #[test]
    fn output_shape_follows_inputs() {
        let morlet = MorletTransform::default();
        let signal: Vec<f64> = (0..37).map(|i| (i as f64 * 0.3).sin()).collect();
        let coefficients = morlet.transform(&signal, &[2.0, 4.0, 8.0]).unwrap();
        assert_eq!(coefficients.len(), 3);
        assert!(coefficients.iter().all(|row| row.len() == 37));
    }

    #[test]
    fn sinusoid_energy_peaks_at_its_period() {
        let morlet = MorletTransform::default();
        let period = 20.0;
        let signal: Vec<f64> = (0..400)
            .map(|i| (2.0 * PI * i as f64 / period).sin())
            .collect();

        let periods: Vec<f64> = (5..60).map(|p| p as f64).collect();
        let scales: Vec<f64> = periods.iter().map(|&p| morlet.scale_for_period(p)).collect();
        let coefficients = morlet.transform(&signal, &scales).unwrap();

        let powers: Vec<f64> = coefficients
            .iter()
            .zip(scales.iter())
            .map(|(row, &s)| mean_power(row) / s)
            .collect();
        let peak = powers
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| periods[i])
            .unwrap();

        assert!((peak - period).abs() <= 2.0, "peak at {}", peak);
    }

    #[test]
    fn constant_signal_has_no_energy() {
        let morlet = MorletTransform::default();
        let coefficients = morlet.transform(&[3.0; 64], &[2.0, 6.0]).unwrap();
        assert!(coefficients.iter().flatten().all(|c| c.norm() < 1e-12));
    }

    #[test]
    fn rejects_non_positive_scales() {
        let morlet = MorletTransform::default();
        assert!(morlet.transform(&[1.0, 2.0, 3.0], &[0.0]).is_err());
        assert!(MorletTransform::new(-1.0).is_err());
    }
}
