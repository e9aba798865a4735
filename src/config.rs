// Configuration for grain-size analysis: I/O settings plus the [analysis] table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{GrainSizeError, Result};
use crate::smoothing::polynomial_term_count;

/// Top-level configuration loaded from TOML
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub input_path: String,
    pub output_base_dir: String,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    #[serde(default = "default_write_psd_files")]
    pub write_psd_files: bool,

    #[serde(default = "default_write_json")]
    pub write_json: bool,

    pub analysis: AnalysisConfig,
}

/// Parameters of the grain-size engine itself
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Physical units per pixel (e.g. mm/pixel); 1.0 reports sizes in pixels
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// The coarsest scale considered is the long image dimension divided by this
    #[serde(default = "default_max_scale")]
    pub max_scale: u32,

    #[serde(default)]
    pub denoise_mode: DenoiseMode,

    /// Odd window for the polynomial smoother; None picks min(rows, cols) / 4
    #[serde(default)]
    pub smoother_window: Option<usize>,

    #[serde(default = "default_smoother_order")]
    pub smoother_order: usize,

    /// Threshold multiplier for wavelet shrinkage
    #[serde(default = "default_denoise_strength")]
    pub denoise_strength: f64,

    #[serde(default)]
    pub row_sampling: RowSampling,

    /// Upper bound on rows visited when sampling every k-th row
    #[serde(default = "default_max_sampled_rows")]
    pub max_sampled_rows: usize,

    /// Smallest period (pixels) analysed by the wavelet transform
    #[serde(default = "default_min_scale")]
    pub min_scale: f64,

    #[serde(default = "default_scale_step")]
    pub scale_step: f64,

    /// Morlet centre frequency
    #[serde(default = "default_wavelet_omega0")]
    pub wavelet_omega0: f64,

    /// Area-by-number to volume-by-weight exponent. Deliberately has no default.
    pub area_to_volume_exponent: f64,

    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,

    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Texture isolation applied after standardization
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DenoiseMode {
    /// Use the standardized image as the texture field
    Disabled,
    /// Subtract a 2-D least-squares polynomial trend
    #[default]
    PolynomialSmoother,
    /// Soft-threshold undecimated wavelet denoising
    WaveletShrinkage,
}

/// Which image rows feed the scale-space analysis
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowSampling {
    /// Fixed number of evenly spaced rows
    Count(usize),
    /// Every k-th row (legacy density parameter)
    Every(usize),
}

impl Default for RowSampling {
    fn default() -> Self {
        RowSampling::Count(100)
    }
}

impl fmt::Display for RowSampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSampling::Count(n) => write!(f, "{} evenly spaced rows", n),
            RowSampling::Every(k) => write!(f, "every {} rows", k),
        }
    }
}

/// Named calibration stages; each can be toggled independently
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Reweight power by scale^-0.5 before trimming
    #[serde(default)]
    pub scale_reweight: bool,

    /// Drop scales at or below 2π pixels
    #[serde(default = "default_true")]
    pub trim_lower: bool,

    /// Drop scales at or above row_length / divisor
    #[serde(default = "default_upper_trim_divisor")]
    pub upper_trim_divisor: Option<f64>,

    #[serde(default = "default_true")]
    pub gaussian_taper: bool,

    /// Add a normal component centred on the mean per-row peak scale
    #[serde(default = "default_true")]
    pub peak_correction: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            scale_reweight: false,
            trim_lower: true,
            upper_trim_divisor: default_upper_trim_divisor(),
            gaussian_taper: true,
            peak_correction: true,
        }
    }
}

impl CalibrationConfig {
    /// Stage selection of the 2016 revision
    pub fn legacy() -> Self {
        Self {
            scale_reweight: true,
            trim_lower: true,
            upper_trim_divisor: Some(4.0),
            gaussian_taper: true,
            peak_correction: false,
        }
    }
}

fn default_parallel() -> bool {
    true
}

fn default_write_psd_files() -> bool {
    true
}

fn default_write_json() -> bool {
    false
}

fn default_true() -> bool {
    true
}

fn default_resolution() -> f64 {
    1.0
}

fn default_max_scale() -> u32 {
    4
}

fn default_smoother_order() -> usize {
    3
}

fn default_denoise_strength() -> f64 {
    2.0
}

fn default_max_sampled_rows() -> usize {
    100
}

fn default_min_scale() -> f64 {
    3.0
}

fn default_scale_step() -> f64 {
    1.0
}

fn default_wavelet_omega0() -> f64 {
    5.0
}

fn default_upper_trim_divisor() -> Option<f64> {
    Some(4.0)
}

/// Cumulative levels reported as percentile sizes
pub fn default_percentiles() -> Vec<f64> {
    vec![0.05, 0.10, 0.16, 0.25, 0.5, 0.75, 0.84, 0.90, 0.95]
}

impl AnalysisConfig {
    /// Defaults for every parameter except the area-to-volume exponent, which the caller must choose
    pub fn new(area_to_volume_exponent: f64) -> Self {
        Self {
            resolution: default_resolution(),
            max_scale: default_max_scale(),
            denoise_mode: DenoiseMode::default(),
            smoother_window: None,
            smoother_order: default_smoother_order(),
            denoise_strength: default_denoise_strength(),
            row_sampling: RowSampling::default(),
            max_sampled_rows: default_max_sampled_rows(),
            min_scale: default_min_scale(),
            scale_step: default_scale_step(),
            wavelet_omega0: default_wavelet_omega0(),
            area_to_volume_exponent,
            percentiles: default_percentiles(),
            calibration: CalibrationConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(GrainSizeError::Config(
                "resolution must be a positive number".to_string(),
            ));
        }

        if self.max_scale == 0 {
            return Err(GrainSizeError::Config("max_scale must be >= 1".to_string()));
        }

        if !self.area_to_volume_exponent.is_finite() {
            return Err(GrainSizeError::Config(
                "area_to_volume_exponent must be finite".to_string(),
            ));
        }

        // Automatic windows are checked once the image size is known
        if let Some(window) = self.smoother_window {
            validate_smoother(window, self.smoother_order)?;
        }

        if !(self.denoise_strength.is_finite() && self.denoise_strength >= 0.0) {
            return Err(GrainSizeError::Config(
                "denoise_strength must be >= 0.0".to_string(),
            ));
        }

        match self.row_sampling {
            RowSampling::Count(0) => {
                return Err(GrainSizeError::Config(
                    "row_sampling count must be > 0".to_string(),
                ))
            }
            RowSampling::Every(0) => {
                return Err(GrainSizeError::Config(
                    "row_sampling every must be > 0".to_string(),
                ))
            }
            _ => {}
        }

        if self.max_sampled_rows == 0 {
            return Err(GrainSizeError::Config(
                "max_sampled_rows must be > 0".to_string(),
            ));
        }

        if !(self.min_scale.is_finite() && self.min_scale > 0.0) {
            return Err(GrainSizeError::Config("min_scale must be > 0.0".to_string()));
        }

        if !(self.scale_step.is_finite() && self.scale_step > 0.0) {
            return Err(GrainSizeError::Config("scale_step must be > 0.0".to_string()));
        }

        if !(self.wavelet_omega0.is_finite() && self.wavelet_omega0 > 0.0) {
            return Err(GrainSizeError::Config(
                "wavelet_omega0 must be > 0.0".to_string(),
            ));
        }

        if self.percentiles.is_empty() {
            return Err(GrainSizeError::Config(
                "at least one percentile level is required".to_string(),
            ));
        }

        if self.percentiles.iter().any(|&p| !(p > 0.0 && p < 1.0)) {
            return Err(GrainSizeError::Config(
                "percentile levels must lie strictly between 0 and 1".to_string(),
            ));
        }

        if self.percentiles.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GrainSizeError::Config(
                "percentile levels must be strictly ascending".to_string(),
            ));
        }

        if let Some(divisor) = self.calibration.upper_trim_divisor {
            if !(divisor.is_finite() && divisor > 0.0) {
                return Err(GrainSizeError::Config(
                    "upper_trim_divisor must be > 0.0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Window must be odd, at least 3, and hold enough samples for the polynomial fit
pub fn validate_smoother(window: usize, order: usize) -> Result<()> {
    if window < 3 || window % 2 == 0 {
        return Err(GrainSizeError::Config(format!(
            "smoother window must be odd and >= 3, got {}",
            window
        )));
    }

    let terms = polynomial_term_count(order);
    if window * window < terms {
        return Err(GrainSizeError::Config(format!(
            "smoother order {} needs {} terms but a {}x{} window only has {} samples",
            order,
            terms,
            window,
            window,
            window * window
        )));
    }

    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GrainSizeError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| GrainSizeError::ConfigLoad {
            source: e,
            path: path.to_path_buf(),
        })?;

        Ok(config)
    }

    /// Configuration with default I/O locations around the given analysis settings
    pub fn with_analysis(analysis: AnalysisConfig) -> Self {
        Self {
            input_path: "./input".to_string(),
            output_base_dir: "./output".to_string(),
            use_parallel: default_parallel(),
            write_psd_files: default_write_psd_files(),
            write_json: default_write_json(),
            analysis,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.exists() {
            return Err(GrainSizeError::InvalidPath(input_path));
        }

        self.analysis.validate()?;

        fs::create_dir_all(&self.output_base_dir)?;

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            GrainSizeError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}
