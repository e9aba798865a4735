use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;

use grain_size_rust_lib::config::{AnalysisConfig, Config, DenoiseMode, RowSampling};
use grain_size_rust_lib::image_io::{get_image_files_in_dir, load_image};
use grain_size_rust_lib::output::{
    write_merged_psd_csv, write_percentiles_csv, write_summary_csv, ImageSummary,
};
use grain_size_rust_lib::pipeline::process_image;
use grain_size_rust_lib::statistics::{compute_statistics, merge_distributions, MERGED_GRID_POINTS};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Digital grain size - grain-size distributions from sediment images")]
struct Args {
    /// Path to input file or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Physical units per pixel (overwrites config)
    #[clap(short, long)]
    resolution: Option<f64>,

    /// Divisor of the long image side giving the coarsest scale (overwrites config)
    #[clap(short = 'm', long)]
    max_scale: Option<u32>,

    /// Area-to-volume exponent, e.g. -0.5 (overwrites config; required without a config file)
    #[clap(short = 'x', long, allow_hyphen_values = true)]
    exponent: Option<f64>,

    /// Texture isolation method (overwrites config)
    #[clap(long)]
    denoise: Option<DenoiseArg>,

    /// Number of evenly spaced rows to analyse (overwrites config)
    #[clap(long)]
    rows: Option<usize>,

    /// Enable debug mode (save texture previews)
    #[clap(short, long)]
    debug: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DenoiseArg {
    None,
    Smoother,
    Wavelet,
}

impl From<DenoiseArg> for DenoiseMode {
    fn from(arg: DenoiseArg) -> Self {
        match arg {
            DenoiseArg::None => DenoiseMode::Disabled,
            DenoiseArg::Smoother => DenoiseMode::PolynomialSmoother,
            DenoiseArg::Wavelet => DenoiseMode::WaveletShrinkage,
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config)
            .with_context(|| format!("loading configuration from {}", args.config))?
    } else if let Some(exponent) = args.exponent {
        log::info!("No configuration at {}; using defaults", args.config);
        Config::with_analysis(AnalysisConfig::new(exponent))
    } else {
        bail!(
            "configuration file {} not found and no --exponent given; the area-to-volume exponent has no default",
            args.config
        );
    };

    // Override config with command-line arguments
    if let Some(input) = args.input.clone() {
        config.input_path = input;
    }
    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }
    if let Some(resolution) = args.resolution {
        config.analysis.resolution = resolution;
    }
    if let Some(max_scale) = args.max_scale {
        config.analysis.max_scale = max_scale;
    }
    if let Some(exponent) = args.exponent {
        config.analysis.area_to_volume_exponent = exponent;
    }
    if let Some(denoise) = args.denoise {
        config.analysis.denoise_mode = denoise.into();
    }
    if let Some(rows) = args.rows {
        config.analysis.row_sampling = RowSampling::Count(rows);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Analyse one file of a batch; failures are logged and the file skipped
fn analyse_batch_file(path: &Path, config: &Config, debug: bool) -> Option<ImageSummary> {
    let outcome = load_image(path).and_then(|input| {
        let image = input.filename.clone();
        process_image(input, config, debug).map(|result| ImageSummary { image, result })
    });

    match outcome {
        Ok(summary) => Some(summary),
        Err(e) if e.is_input_or_config() => {
            log::warn!("Skipping {}: {}", path.display(), e);
            None
        }
        Err(e) => {
            log::error!("Analysis failed for {}: {}", path.display(), e);
            None
        }
    }
}

fn write_batch_outputs(summaries: &[ImageSummary], config: &Config) -> anyhow::Result<()> {
    let output_dir = &config.output_base_dir;

    let path = write_summary_csv(summaries, &config.analysis, output_dir)?;
    log::info!("Wrote {}", path.display());
    let path = write_percentiles_csv(summaries, output_dir)?;
    log::info!("Wrote {}", path.display());

    if summaries.len() > 1 {
        let distributions: Vec<_> = summaries.iter().map(|s| s.result.distribution()).collect();
        let merged = merge_distributions(&distributions, MERGED_GRID_POINTS)?;
        let path = write_merged_psd_csv(&merged, output_dir)?;

        let stats = compute_statistics(&merged, &config.analysis.percentiles)?;
        log::info!(
            "Merged distribution of {} images: mean {:.4}, sorting {:.4} ({})",
            summaries.len(),
            stats.mean,
            stats.sorting,
            path.display()
        );
    }

    Ok(())
}

/// Main function
fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = load_config(&args)?;

    // Start timing
    let start_time = Instant::now();

    let input_path = PathBuf::from(&config.input_path);

    let summaries = if input_path.is_file() {
        log::info!("Processing single file: {}", input_path.display());
        let input_image = load_image(&input_path)
            .with_context(|| format!("loading {}", input_path.display()))?;
        let image = input_image.filename.clone();
        let result = process_image(input_image, &config, args.debug)
            .with_context(|| format!("analysing {}", input_path.display()))?;
        vec![ImageSummary { image, result }]
    } else if input_path.is_dir() {
        log::info!("Processing directory: {}", input_path.display());
        let image_files = get_image_files_in_dir(&input_path)?;
        log::info!("Found {} image files", image_files.len());

        let outcomes: Vec<Option<ImageSummary>> = if config.use_parallel {
            image_files
                .par_iter()
                .map(|path| analyse_batch_file(path, &config, args.debug))
                .collect()
        } else {
            image_files
                .iter()
                .map(|path| analyse_batch_file(path, &config, args.debug))
                .collect()
        };

        let summaries: Vec<ImageSummary> = outcomes.into_iter().flatten().collect();
        if summaries.is_empty() {
            bail!("no image in {} could be analysed", input_path.display());
        }
        log::info!("Analysed {} of {} images", summaries.len(), image_files.len());
        summaries
    } else {
        bail!("input path {} is neither a file nor a directory", input_path.display());
    };

    write_batch_outputs(&summaries, &config)?;

    // Report elapsed time
    let elapsed = start_time.elapsed();
    log::info!("Processing completed in {:.2} seconds", elapsed.as_secs_f64());

    Ok(())
}
