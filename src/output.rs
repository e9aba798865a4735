use std::fs;
use std::path::{Path, PathBuf};
use csv::Writer;

use crate::calibration::CalibratedDistribution;
use crate::config::AnalysisConfig;
use crate::errors::{GrainSizeError, Result};
use crate::statistics::GrainSizeResult;

/// Result of one image in a batch, keyed by its file stem
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub image: String,
    pub result: GrainSizeResult,
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write the calibrated distribution of one image to `<filename>_psd.csv`
pub fn write_psd_csv<P: AsRef<Path>>(
    distribution: &CalibratedDistribution,
    output_dir: P,
    filename: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}_psd.csv", filename));
    create_parent_dir(&output_path)?;

    let mut writer = Writer::from_path(&output_path)?;
    writer.write_record(["Size", "Frequency"])?;
    for (bin, freq) in distribution.bins.iter().zip(distribution.frequencies.iter()) {
        writer.write_record(&[format!("{:.6}", bin), format!("{:.8}", freq)])?;
    }
    writer.flush()?;

    Ok(output_path)
}

/// Serialise the full result record to `<filename>_result.json`
pub fn write_result_json<P: AsRef<Path>>(
    result: &GrainSizeResult,
    output_dir: P,
    filename: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}_result.json", filename));
    create_parent_dir(&output_path)?;

    let content = serde_json::to_string_pretty(result)?;
    fs::write(&output_path, content)?;

    Ok(output_path)
}

/// One row per image with the moment statistics and the run parameters
pub fn write_summary_csv<P: AsRef<Path>>(
    summaries: &[ImageSummary],
    analysis: &AnalysisConfig,
    output_dir: P,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join("dgs_results.csv");
    create_parent_dir(&output_path)?;

    let mut writer = Writer::from_path(&output_path)?;
    writer.write_record([
        "Image",
        "Mean",
        "Sorting",
        "Skewness",
        "Kurtosis",
        "Max_Scale",
        "Resolution",
        "Area_To_Volume_Exponent",
    ])?;

    for summary in summaries {
        let result = &summary.result;
        writer.write_record(&[
            summary.image.clone(),
            format!("{:.6}", result.mean),
            format!("{:.6}", result.sorting),
            format!("{:.6}", result.skewness),
            format!("{:.6}", result.kurtosis),
            analysis.max_scale.to_string(),
            analysis.resolution.to_string(),
            analysis.area_to_volume_exponent.to_string(),
        ])?;
    }
    writer.flush()?;

    Ok(output_path)
}

/// Percentile sizes with one row per level and one column per image
pub fn write_percentiles_csv<P: AsRef<Path>>(
    summaries: &[ImageSummary],
    output_dir: P,
) -> Result<PathBuf> {
    let levels = match summaries.first() {
        Some(first) => first.result.percentiles.clone(),
        None => return Err(GrainSizeError::Input("no results to tabulate".to_string())),
    };
    if let Some(other) = summaries.iter().find(|s| s.result.percentiles != levels) {
        return Err(GrainSizeError::Input(format!(
            "{} was analysed with different percentile levels",
            other.image
        )));
    }

    let output_path = output_dir.as_ref().join("percentiles.csv");
    create_parent_dir(&output_path)?;

    let mut writer = Writer::from_path(&output_path)?;
    let mut header = vec!["Percentile".to_string()];
    header.extend(summaries.iter().map(|s| s.image.clone()));
    writer.write_record(&header)?;

    for (i, level) in levels.iter().enumerate() {
        let mut record = vec![format!("{:.2}", level)];
        record.extend(
            summaries
                .iter()
                .map(|s| format!("{:.6}", s.result.percentile_values[i])),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(output_path)
}

/// Distribution averaged over every image of a batch
pub fn write_merged_psd_csv<P: AsRef<Path>>(
    merged: &CalibratedDistribution,
    output_dir: P,
) -> Result<PathBuf> {
    write_psd_csv(merged, output_dir, "merged")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(mean: f64) -> GrainSizeResult {
        GrainSizeResult {
            mean,
            sorting: 1.5,
            skewness: 0.001,
            kurtosis: 0.03,
            percentiles: vec![0.16, 0.5, 0.84],
            percentile_values: vec![mean - 1.0, mean, mean + 1.0],
            bins: vec![mean - 1.0, mean, mean + 1.0],
            frequencies: vec![0.25, 0.5, 0.25],
        }
    }

    fn summaries() -> Vec<ImageSummary> {
        vec![
            ImageSummary { image: "beach_a".to_string(), result: result(10.0) },
            ImageSummary { image: "beach_b".to_string(), result: result(20.0) },
        ]
    }

    #[test]
    fn psd_csv_has_one_row_per_bin() {
        let dir = tempfile::tempdir().unwrap();
        let r = result(10.0);
        let path = write_psd_csv(&r.distribution(), dir.path(), "beach_a").unwrap();

        assert!(path.ends_with("beach_a_psd.csv"));
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Size,Frequency");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "10.000000,0.50000000");
    }

    #[test]
    fn summary_csv_lists_every_image() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = AnalysisConfig::new(-0.5);
        let path = write_summary_csv(&summaries(), &analysis, dir.path()).unwrap();

        let mut reader = csv::Reader::from_path(path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][0], "beach_b");
        assert_eq!(&rows[1][1], "20.000000");
        assert_eq!(&rows[0][7], "-0.5");
    }

    #[test]
    fn percentiles_csv_has_one_column_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_percentiles_csv(&summaries(), dir.path()).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Percentile,beach_a,beach_b");
        assert_eq!(lines[2], "0.50,10.000000,20.000000");
    }

    #[test]
    fn percentiles_csv_rejects_mixed_levels() {
        let dir = tempfile::tempdir().unwrap();
        let mut mixed = summaries();
        mixed[1].result.percentiles = vec![0.5];
        assert!(write_percentiles_csv(&mixed, dir.path()).is_err());
        assert!(write_percentiles_csv(&[], dir.path()).is_err());
    }

    #[test]
    fn result_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let original = result(12.5);
        let path = write_result_json(&original, dir.path(), "beach_a").unwrap();

        let loaded: GrainSizeResult = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded, original);
    }
}
