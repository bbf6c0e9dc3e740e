//! End-to-end run orchestration.
//!
//! Sequence: schedule raw-file conversion, load the consolidated record
//! store, read every target feature, then fan extraction out across the rayon
//! pool with each feature's finished row batch funneled over a bounded
//! channel to a single writer thread. The channel is what serializes writes:
//! the output is one ordered stream, so only one task's rows ever reach it at
//! a time, and a feature's rows stay contiguous because they travel as one
//! batch. Which feature lands before which is unconstrained.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use chrono::Local;
use crossbeam_channel::bounded;
use log::{info, warn};
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::config::{ConfigError, EicConfig};
use crate::convert::{ConversionScheduler, ConvertError, ScanConverter};
use crate::extract::{extract_rows, OutputRow};
use crate::features::{Feature, FeatureError, FeatureReader};
use crate::store::{RecordStore, StoreError};

/// How many per-feature row batches the writer channel buffers before
/// extraction tasks block (backpressure against a slow disk).
const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Header row of the output table.
const OUTPUT_HEADER: [&str; 6] = ["Feature", "RT", "Intensity", "mz", "File", "Zoom"];

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Conversion scheduling failed (unreadable target directory, pool setup).
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// A converted scan store could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The target feature file could not be read.
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Writing the output table failed. Any partially written output must be
    /// considered invalid.
    #[error("failed to write output {path}: {source}")]
    Output {
        /// The output file.
        path: PathBuf,
        /// Underlying CSV/I-O error.
        source: csv::Error,
    },

    /// The output writer thread could not be spawned or panicked.
    #[error("output writer failure: {0}")]
    Writer(String),

    /// The run was cancelled via its [`CancelToken`].
    #[error("run cancelled")]
    Cancelled,
}

/// Summary of one completed run.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Number of converted scan files feeding the store.
    pub converted_files: usize,
    /// Number of scan records in the consolidated store.
    pub records: usize,
    /// Number of features read from the target file.
    pub features: usize,
    /// Number of features with at least one matching record.
    pub matched_features: usize,
    /// Total output rows written (excluding the header).
    pub rows_written: u64,
    /// The output file.
    pub output_path: PathBuf,
    /// Wall-clock duration of the whole run, in seconds.
    pub elapsed_seconds: f64,
}

/// Run the full pipeline with the stock mzXML converter.
#[cfg(feature = "mzxml")]
pub fn run(config: &EicConfig) -> Result<RunStats, RunError> {
    run_with_converter(config, &crate::mzxml::MzXmlConverter::new(), &CancelToken::new())
}

/// Run the full pipeline with a caller-supplied converter and cancel token.
pub fn run_with_converter<C: ScanConverter>(
    config: &EicConfig,
    converter: &C,
    cancel: &CancelToken,
) -> Result<RunStats, RunError> {
    let start = Instant::now();
    config.validate()?;

    info!(
        "running EIC generation against target file: {}, target dir: {}",
        config.target_file,
        config.target_dir.display()
    );

    let scheduler = ConversionScheduler::new(&config.target_dir)?;
    let converted = scheduler.convert_all(converter, cancel)?;

    let store = RecordStore::load(&converted)?;

    // Feature parse errors are fatal and must surface before the output file
    // is created, so the whole target file is read up front.
    let features = FeatureReader::new(config).read_all()?;
    info!("{} features to extract", features.len());

    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }

    let output_path = config.output_path(Local::now().date_naive());
    let (rows_written, matched_features) =
        extract_and_write(config, &store, &features, &output_path, cancel)?;

    if cancel.is_cancelled() {
        warn!("run cancelled; {} is incomplete", output_path.display());
        return Err(RunError::Cancelled);
    }

    let stats = RunStats {
        converted_files: converted.len(),
        records: store.len(),
        features: features.len(),
        matched_features,
        rows_written,
        output_path,
        elapsed_seconds: start.elapsed().as_secs_f64(),
    };

    info!(
        "wrote {} rows for {}/{} features in {:.2}s",
        stats.rows_written, stats.matched_features, stats.features, stats.elapsed_seconds
    );

    Ok(stats)
}

/// Fan extraction out across the rayon pool and funnel every finished batch
/// to a dedicated writer thread.
fn extract_and_write(
    config: &EicConfig,
    store: &RecordStore,
    features: &[Feature],
    output_path: &PathBuf,
    cancel: &CancelToken,
) -> Result<(u64, usize), RunError> {
    let (sender, receiver) = bounded::<Vec<OutputRow>>(WRITER_CHANNEL_CAPACITY);

    let writer_path = output_path.clone();
    let writer_handle = thread::Builder::new()
        .name("eic-writer".to_string())
        .spawn(move || -> Result<u64, csv::Error> {
            let mut writer = csv::Writer::from_path(&writer_path)?;
            writer.write_record(OUTPUT_HEADER)?;

            let mut rows_written: u64 = 0;
            for batch in receiver {
                for row in batch {
                    let rt = row.rt.to_string();
                    let intensity = row.intensity.to_string();
                    let mz = row.mz.to_string();
                    writer.write_record([
                        row.feature_id.as_ref(),
                        rt.as_str(),
                        intensity.as_str(),
                        mz.as_str(),
                        row.source_file.as_ref(),
                        row.zoom_literal(),
                    ])?;
                    rows_written += 1;
                }
            }

            writer.flush()?;
            Ok(rows_written)
        })
        .map_err(|e| RunError::Writer(format!("failed to spawn writer thread: {e}")))?;

    let matched = AtomicUsize::new(0);
    features.par_iter().for_each_with(sender, |sender, feature| {
        if cancel.is_cancelled() {
            return;
        }

        let rows = extract_rows(feature, store, config.mz_tolerance, config.zoom_half_width);
        if rows.is_empty() {
            // An unmatched feature is a normal outcome, not a failure.
            return;
        }

        matched.fetch_add(1, Ordering::Relaxed);
        // A send can only fail once the writer has exited on error; that
        // error is surfaced below when the writer is joined.
        if sender.send(rows).is_err() {
            warn!("output writer gone; dropping rows for {}", feature.feature_id);
        }
    });

    // All senders are dropped once the fan-out returns, which closes the
    // channel and lets the writer drain, flush, and exit. Every launched task
    // has finished and had its rows written before the join returns.
    let rows_written = writer_handle
        .join()
        .map_err(|_| RunError::Writer("output writer thread panicked".to_string()))?
        .map_err(|source| RunError::Output {
            path: output_path.clone(),
            source,
        })?;

    Ok((rows_written, matched.load(Ordering::Relaxed)))
}
