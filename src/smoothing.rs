//! 2-D Savitzky-Golay style polynomial smoothing.
//!
//! A low-order polynomial surface is least-squares fitted over a sliding
//! square window. Because the window geometry never changes, the fit reduces
//! to one fixed kernel: the row of the design matrix pseudo-inverse that
//! yields the constant term. Borders are mirrored by half a window so every
//! pixel gets a full-window estimate, and the padded field is convolved with
//! the kernel in "valid" mode via FFT.

use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use rayon::prelude::*;
use rustfft::{FftPlanner, num_complex::Complex};

use crate::config::validate_smoother;
use crate::errors::{GrainSizeError, Result};

/// Number of monomials x^i * y^j with i + j <= order
pub fn polynomial_term_count(order: usize) -> usize {
    (order + 1) * (order + 2) / 2
}

/// Default window: a quarter of the short image side, forced odd and at least 3
pub fn auto_window(rows: usize, cols: usize) -> usize {
    let quarter = rows.min(cols) / 4;
    let odd = if quarter % 2 == 0 { quarter.saturating_sub(1) } else { quarter };
    odd.max(3)
}

#[derive(Debug, Clone)]
pub struct PolynomialSmoother {
    window: usize,
    order: usize,
    kernel: Array2<f64>,
}

impl PolynomialSmoother {
    /// Build the smoothing kernel, rejecting even windows and under-determined fits
    pub fn new(window: usize, order: usize) -> Result<Self> {
        validate_smoother(window, order)?;
        let kernel = build_kernel(window, order)?;
        Ok(Self { window, order, kernel })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn kernel(&self) -> &Array2<f64> {
        &self.kernel
    }

    /// Smoothed estimate of `field`, same shape as the input
    pub fn smooth(&self, field: &Array2<f64>) -> Result<Array2<f64>> {
        let (rows, cols) = field.dim();
        let half = self.window / 2;

        if rows <= half || cols <= half {
            return Err(GrainSizeError::Config(format!(
                "smoother window {} is too large for a {}x{} image",
                self.window, rows, cols
            )));
        }

        let padded = mirror_pad(field, half);
        Ok(fft_convolve_valid(&padded, &self.kernel))
    }
}

/// Constant-term row of the least-squares pseudo-inverse, laid out as a window
///
/// Coordinates are normalised to [-1, 1]; the value fitted at the centre does
/// not depend on that scaling but the normal system stays well conditioned.
fn build_kernel(window: usize, order: usize) -> Result<Array2<f64>> {
    let half = (window / 2) as f64;
    let exponents: Vec<(i32, i32)> = (0..=order as i32)
        .flat_map(|k| (0..=k).map(move |n| (k - n, n)))
        .collect();

    let design = DMatrix::from_fn(window * window, exponents.len(), |r, t| {
        let (i, j) = exponents[t];
        let x = ((r % window) as f64 - half) / half;
        let y = ((r / window) as f64 - half) / half;
        x.powi(i) * y.powi(j)
    });

    let normal = design.transpose() * &design;
    let mut unit = DVector::zeros(exponents.len());
    unit[0] = 1.0;

    let cholesky = normal.cholesky().ok_or_else(|| {
        GrainSizeError::Config(format!(
            "a {}x{} window cannot support a polynomial fit of order {}",
            window, window, order
        ))
    })?;
    let weights = cholesky.solve(&unit);
    let row = design * weights;

    Ok(Array2::from_shape_fn((window, window), |(r, c)| row[r * window + c]))
}

/// Reflect an out-of-range index back inside `0..len` (edge sample not repeated)
fn reflect(index: isize, len: usize) -> usize {
    let last = len as isize - 1;
    if index < 0 {
        (-index) as usize
    } else if index > last {
        (2 * last - index) as usize
    } else {
        index as usize
    }
}

/// Pad by mirroring `half` samples across every border.
///
/// Corners come out as reflections of the already padded edge bands.
pub fn mirror_pad(field: &Array2<f64>, half: usize) -> Array2<f64> {
    let (rows, cols) = field.dim();
    let h = half as isize;

    Array2::from_shape_fn((rows + 2 * half, cols + 2 * half), |(r, c)| {
        let src_r = reflect(r as isize - h, rows);
        let src_c = reflect(c as isize - h, cols);
        field[[src_r, src_c]]
    })
}

/// 2-D convolution keeping only outputs where the kernel fully overlaps
fn fft_convolve_valid(padded: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = padded.dim();
    let (k_rows, k_cols) = kernel.dim();

    let mut signal: Vec<Complex<f64>> = padded.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut filter = vec![Complex::new(0.0, 0.0); rows * cols];
    for ((r, c), &v) in kernel.indexed_iter() {
        filter[r * cols + c] = Complex::new(v, 0.0);
    }

    let mut planner = FftPlanner::new();
    fft_2d(&mut planner, &mut signal, rows, cols, false);
    fft_2d(&mut planner, &mut filter, rows, cols, false);

    for (s, f) in signal.iter_mut().zip(filter.iter()) {
        *s *= *f;
    }
    fft_2d(&mut planner, &mut signal, rows, cols, true);

    // Circular wrap only touches the first k-1 rows/cols, which "valid" discards
    let scale = 1.0 / (rows * cols) as f64;
    let out_rows = rows - k_rows + 1;
    let out_cols = cols - k_cols + 1;
    Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
        signal[(r + k_rows - 1) * cols + (c + k_cols - 1)].re * scale
    })
}

/// In-place row-major 2-D FFT (unnormalised in both directions)
fn fft_2d(
    planner: &mut FftPlanner<f64>,
    data: &mut [Complex<f64>],
    rows: usize,
    cols: usize,
    inverse: bool,
) {
    let row_fft = if inverse { planner.plan_fft_inverse(cols) } else { planner.plan_fft_forward(cols) };
    data.par_chunks_mut(cols).for_each(|row| row_fft.process(row));

    let mut transposed = vec![Complex::new(0.0, 0.0); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            transposed[c * rows + r] = data[r * cols + c];
        }
    }

    let col_fft = if inverse { planner.plan_fft_inverse(rows) } else { planner.plan_fft_forward(rows) };
    transposed.par_chunks_mut(rows).for_each(|col| col_fft.process(col));

    for c in 0..cols {
        for r in 0..rows {
            data[r * cols + c] = transposed[c * rows + r];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn textured_field(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            ((r * 31 + c * 17) % 23) as f64 + 0.1 * (r as f64) - 0.05 * (c as f64)
        })
    }

    #[test]
    fn term_count_matches_triangle_numbers() {
        assert_eq!(polynomial_term_count(0), 1);
        assert_eq!(polynomial_term_count(1), 3);
        assert_eq!(polynomial_term_count(3), 10);
    }

    #[test]
    fn auto_window_is_odd() {
        assert_eq!(auto_window(256, 300), 63);
        assert_eq!(auto_window(100, 400), 25);
        assert_eq!(auto_window(8, 8), 3);
    }

    #[test]
    fn kernel_sums_to_one() {
        for &(window, order) in &[(5, 0), (7, 2), (11, 3)] {
            let smoother = PolynomialSmoother::new(window, order).unwrap();
            assert_approx_eq!(smoother.kernel().sum(), 1.0, 1e-10);
        }
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert!(PolynomialSmoother::new(4, 1).is_err());
        assert!(PolynomialSmoother::new(3, 3).is_err());
        assert!(PolynomialSmoother::new(1, 0).is_err());
    }

    #[test]
    fn order_zero_is_box_average() {
        let field = textured_field(20, 24);
        let window = 5;
        let half = window / 2;
        let smoother = PolynomialSmoother::new(window, 0).unwrap();
        let smoothed = smoother.smooth(&field).unwrap();
        assert_eq!(smoothed.dim(), field.dim());

        for r in half..20 - half {
            for c in half..24 - half {
                let mut sum = 0.0;
                for dr in 0..window {
                    for dc in 0..window {
                        sum += field[[r + dr - half, c + dc - half]];
                    }
                }
                assert_approx_eq!(smoothed[[r, c]], sum / (window * window) as f64, 1e-9);
            }
        }
    }

    #[test]
    fn reproduces_polynomials_up_to_its_order() {
        let field = Array2::from_shape_fn((15, 18), |(r, c)| {
            let (x, y) = (c as f64, r as f64);
            2.0 + 0.5 * x - 0.25 * y + 0.01 * x * y + 0.02 * x * x
        });
        let smoother = PolynomialSmoother::new(7, 2).unwrap();
        let smoothed = smoother.smooth(&field).unwrap();

        for r in 3..12 {
            for c in 3..15 {
                assert_approx_eq!(smoothed[[r, c]], field[[r, c]], 1e-8);
            }
        }
    }

    #[test]
    fn mirror_pad_reflects_edges_and_corners() {
        let field = Array2::from_shape_fn((3, 4), |(r, c)| (r * 10 + c) as f64);
        let padded = mirror_pad(&field, 2);
        assert_eq!(padded.dim(), (7, 8));
        // top band mirrors rows 1 and 2
        assert_eq!(padded[[1, 2]], field[[1, 0]]);
        assert_eq!(padded[[0, 2]], field[[2, 0]]);
        // corner mirrors both axes
        assert_eq!(padded[[0, 0]], field[[2, 2]]);
        assert_eq!(padded[[6, 7]], field[[0, 1]]);
    }

    #[test]
    fn window_larger_than_image_is_rejected() {
        let field = Array2::<f64>::zeros((4, 40));
        let smoother = PolynomialSmoother::new(9, 1).unwrap();
        assert!(smoother.smooth(&field).is_err());
    }
}
