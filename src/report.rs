//! Results persistence.
//!
//! A run directory holds `results.json` (one [`MetricRow`] per scored
//! commit), `summary.json` and the `config.toml` that produced them.

use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::experiment::{run_id, RunOutcome};
use crate::metrics::{MetricRow, Summary};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File holding the per-commit metric rows.
pub const RESULTS_FILE: &str = "results.json";
/// File holding the run summary.
pub const SUMMARY_FILE: &str = "summary.json";
/// File holding the run configuration.
pub const CONFIG_FILE: &str = "config.toml";

/// Directory of the run described by `config` below `base`.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn unique_dir(base: &Path, config: &ExperimentConfig) -> Result<PathBuf> {
    Ok(base.join(config.dataset.name()).join(run_id(config)?))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write metric rows to `dir/results.json`, creating `dir` if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_results(rows: &[MetricRow], dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(RESULTS_FILE);
    write_json(&path, rows)?;
    Ok(path)
}

/// Read metric rows from `dir/results.json`.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn load_results(dir: &Path) -> Result<Vec<MetricRow>> {
    read_json(&dir.join(RESULTS_FILE))
}

/// Read the summary from `dir/summary.json`.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn load_summary(dir: &Path) -> Result<Summary> {
    read_json(&dir.join(SUMMARY_FILE))
}

/// Write results, summary and config of a finished run into `dir`.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn save_run(outcome: &RunOutcome, config: &ExperimentConfig, dir: &Path) -> Result<()> {
    let config_text = toml::to_string(config)?;
    save_results(&outcome.rows, dir)?;
    write_json(&dir.join(SUMMARY_FILE), &outcome.summary)?;
    std::fs::write(dir.join(CONFIG_FILE), config_text)?;
    tracing::info!(dir = %dir.display(), rows = outcome.rows.len(), "results saved");
    Ok(())
}
