// src/lib.rs - Library interface for wavelet grain-size analysis

pub mod calibration;
pub mod config;
pub mod denoise;
pub mod errors;
pub mod image_io;
pub mod image_utils;
pub mod output;
pub mod pipeline;
pub mod scale_space;
pub mod smoothing;
pub mod standardize;
pub mod statistics;
pub mod wavelet;

// Re-export commonly used types and functions
pub use errors::{GrainSizeError, Result};
pub use config::{AnalysisConfig, CalibrationConfig, Config, DenoiseMode, RowSampling};
pub use pipeline::{analyze, analyze_path, analyze_texture, prepare_texture, process_image};
pub use image_io::{InputImage, get_image_files_in_dir, load_image};
pub use image_utils::GrainImage;

// Re-export the analysis stages
pub use calibration::{CalibratedDistribution, DistributionCalibrator};
pub use scale_space::{ScaleSpaceAnalyzer, ScaleSpectrum};
pub use smoothing::PolynomialSmoother;
pub use standardize::{rescale, standardize, standardize_to};
pub use statistics::{GrainSizeResult, compute_statistics, merge_distributions};
pub use wavelet::{MorletTransform, MultiscaleTransform};
