// src/pipeline.rs - Texture isolation, scale-space analysis, calibration and statistics for one image

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::calibration::DistributionCalibrator;
use crate::config::{AnalysisConfig, Config, DenoiseMode};
use crate::denoise::WaveletDenoiser;
use crate::errors::Result;
use crate::image_io::{load_image, save_gray_image, InputImage};
use crate::image_utils::{texture_preview, GrainImage};
use crate::output::{write_psd_csv, write_result_json};
use crate::scale_space::{period_band, ScaleSpaceAnalyzer};
use crate::smoothing::{auto_window, PolynomialSmoother};
use crate::standardize::{rescale, standardize};
use crate::statistics::{compute_statistics, GrainSizeResult};
use crate::wavelet::MorletTransform;

/// Number of à-trous levels used when wavelet shrinkage isolates the texture
const DENOISE_LEVELS: usize = 4;

/// Standardize the image and isolate its texture, rescaled to 0..255
pub fn prepare_texture(image: &GrainImage, analysis: &AnalysisConfig) -> Result<Array2<f64>> {
    let standardized = standardize(image.field());

    let texture = match analysis.denoise_mode {
        DenoiseMode::Disabled => standardized,
        DenoiseMode::PolynomialSmoother => {
            let window = analysis
                .smoother_window
                .unwrap_or_else(|| auto_window(image.rows(), image.row_length()));
            let smoother = PolynomialSmoother::new(window, analysis.smoother_order)?;
            log::debug!(
                "Removing polynomial trend (window {}, order {})",
                smoother.window(),
                smoother.order()
            );
            let trend = smoother.smooth(&standardized)?;
            standardized - trend
        }
        DenoiseMode::WaveletShrinkage => {
            WaveletDenoiser::new(DENOISE_LEVELS, analysis.denoise_strength).denoise(&standardized)
        }
    };

    Ok(rescale(&texture, 0.0, 255.0))
}

/// Grain-size statistics of an already isolated texture field
pub fn analyze_texture(texture: &Array2<f64>, analysis: &AnalysisConfig) -> Result<GrainSizeResult> {
    let row_length = texture.ncols().max(texture.nrows());
    let periods = period_band(row_length, analysis.max_scale, analysis.min_scale, analysis.scale_step)?;

    let transform = MorletTransform::new(analysis.wavelet_omega0)?;
    let analyzer = ScaleSpaceAnalyzer::new(transform, periods)?;
    let spectrum = analyzer.analyze(texture, analysis.row_sampling, analysis.max_sampled_rows)?;
    log::debug!(
        "Scale-space: {} scales from {} rows ({}), {} row peaks",
        spectrum.scales.len(),
        spectrum.rows_used,
        spectrum.sampling,
        spectrum.row_peaks.len()
    );

    let calibrated = DistributionCalibrator::new(analysis).calibrate(&spectrum, texture.ncols())?;
    compute_statistics(&calibrated, &analysis.percentiles)
}

/// Full analysis of an in-memory image
pub fn analyze(image: &GrainImage, analysis: &AnalysisConfig) -> Result<GrainSizeResult> {
    analysis.validate()?;
    let texture = prepare_texture(image, analysis)?;
    analyze_texture(&texture, analysis)
}

/// Decode an image file and analyse it
pub fn analyze_path<P: AsRef<Path>>(path: P, analysis: &AnalysisConfig) -> Result<GrainSizeResult> {
    let input = load_image(path)?;
    analyze(&input.image, analysis)
}

/// Analyse one image of a batch and write its per-image outputs
pub fn process_image(
    input_image: InputImage,
    config: &Config,
    debug: bool,
) -> Result<GrainSizeResult> {
    let InputImage { image, path, filename } = input_image;
    let analysis = &config.analysis;

    log::info!(
        "Analysing {} ({} rows of {} px{})",
        path.display(),
        image.rows(),
        image.row_length(),
        if image.was_transposed() { ", transposed" } else { "" }
    );

    let texture = prepare_texture(&image, analysis)?;

    if debug {
        let debug_dir = PathBuf::from(&config.output_base_dir).join("debug");
        fs::create_dir_all(&debug_dir)?;
        save_gray_image(
            &texture_preview(&texture),
            debug_dir.join(format!("{}_texture.png", filename)),
        )?;
    }

    let result = analyze_texture(&texture, analysis)?;

    if config.write_psd_files {
        write_psd_csv(&result.distribution(), &config.output_base_dir, &filename)?;
    }
    if config.write_json {
        write_result_json(&result, &config.output_base_dir, &filename)?;
    }

    log::info!(
        "{}: mean {:.4}, sorting {:.4}, skewness {:.6}, kurtosis {:.6}",
        filename,
        result.mean,
        result.sorting,
        result.skewness,
        result.kurtosis
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GrainSizeError;

    fn speckle(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| ((r * 131 + c * 71 + r * c) % 97) as f64)
    }

    #[test]
    fn texture_is_rescaled_for_every_mode() {
        let image = GrainImage::from_field(speckle(64, 80)).unwrap();
        for mode in [DenoiseMode::Disabled, DenoiseMode::PolynomialSmoother, DenoiseMode::WaveletShrinkage] {
            let mut analysis = AnalysisConfig::new(-0.5);
            analysis.denoise_mode = mode;
            let texture = prepare_texture(&image, &analysis).unwrap();

            assert_eq!(texture.dim(), (64, 80));
            let max = texture.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let min = texture.iter().cloned().fold(f64::INFINITY, f64::min);
            assert!((max - 255.0).abs() < 1e-9, "{:?}", mode);
            assert!(min.abs() < 1e-9, "{:?}", mode);
        }
    }

    #[test]
    fn invalid_window_is_rejected_before_analysis() {
        let image = GrainImage::from_field(speckle(64, 80)).unwrap();
        let mut analysis = AnalysisConfig::new(-0.5);
        analysis.smoother_window = Some(10);
        assert!(matches!(analyze(&image, &analysis), Err(GrainSizeError::Config(_))));
    }

    #[test]
    fn image_too_small_for_scale_band() {
        let image = GrainImage::from_field(speckle(12, 12)).unwrap();
        let mut analysis = AnalysisConfig::new(-0.5);
        analysis.denoise_mode = DenoiseMode::Disabled;
        assert!(matches!(
            analyze(&image, &analysis),
            Err(GrainSizeError::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn speckle_produces_finite_result() {
        let image = GrainImage::from_field(speckle(96, 128)).unwrap();
        let analysis = AnalysisConfig::new(-0.5);
        let result = analyze(&image, &analysis).unwrap();

        assert!(result.ensure_finite().is_ok());
        assert_eq!(result.percentiles.len(), result.percentile_values.len());
        assert!(result.bins.iter().all(|&b| b > std::f64::consts::TAU && b < 32.0));
    }
}
