//! # eicgen CLI
//!
//! Command-line frontend for EIC CSV generation.
//!
//! ## Usage
//!
//! ```bash
//! # Generate an EIC table from a directory of mzXML files
//! eicgen --target-dir Test_Files --target-file NegIDed_FIN.csv \
//!        --mz-column 6 --rt-column 7 --mz-tolerance 0.005 \
//!        --feature-id-col 12 --zoom-window 30
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use eicgen::config::{ConfigFile, EicConfig};

/// eicgen - Extracted Ion Chromatogram CSV Generator
///
/// Converts the mzXML files in the target directory to CSV scan stores, then
/// generates one consolidated EIC CSV for the features of the target file,
/// filtered to an m/z tolerance.
#[derive(Parser)]
#[command(name = "eicgen")]
#[command(author, version, about)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path of the target directory, where the mzXML files and the target
    /// csv file are located; also the output location of the EIC csv file
    #[arg(long, value_name = "DIR")]
    target_dir: PathBuf,

    /// Name of the target file (short name, not full path, which is assumed
    /// to be in the target directory)
    #[arg(long, value_name = "FILE")]
    target_file: Option<String>,

    /// m/z column number in the target file (column enumeration starts 1)
    #[arg(long, value_name = "N")]
    mz_column: Option<usize>,

    /// RT column number in the target file (column enumeration starts 1)
    #[arg(long, value_name = "N")]
    rt_column: Option<usize>,

    /// Feature ID column number in the target file (column enumeration starts 1)
    #[arg(long, value_name = "N")]
    feature_id_col: Option<usize>,

    /// Tolerance for m/z values
    #[arg(long, value_name = "TH")]
    mz_tolerance: Option<f64>,

    /// Zoom window half-width used to indicate if a record falls within the
    /// zoom window for a feature
    #[arg(long, value_name = "RT")]
    zoom_window: Option<f64>,

    /// Optional TOML configuration file; command-line flags take precedence
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = build_config(&cli)?;

    let stats = run_pipeline(&config)?;

    info!("EIC generation complete");
    info!("  Converted scan files: {}", stats.converted_files);
    info!("  Scan records indexed: {}", stats.records);
    info!(
        "  Features matched: {}/{}",
        stats.matched_features, stats.features
    );
    info!("  Rows written: {}", stats.rows_written);
    info!("  Output: {}", stats.output_path.display());

    println!("time: {:.3}s", stats.elapsed_seconds);
    println!("exiting eicgen...");

    Ok(())
}

/// Layer defaults, config file, and flags into a validated [`EicConfig`].
fn build_config(cli: &Cli) -> Result<EicConfig> {
    let mut config = EicConfig::new(&cli.target_dir);

    if let Some(path) = &cli.config {
        let file = ConfigFile::from_file(path)
            .with_context(|| format!("failed to load config file {}", path.display()))?;
        file.apply(&mut config);
    }

    if let Some(v) = &cli.target_file {
        config.target_file = v.clone();
    }
    if let Some(v) = cli.mz_column {
        config.mz_column = v;
    }
    if let Some(v) = cli.rt_column {
        config.rt_column = v;
    }
    if let Some(v) = cli.feature_id_col {
        config.feature_id_column = v;
    }
    if let Some(v) = cli.mz_tolerance {
        config.mz_tolerance = v;
    }
    if let Some(v) = cli.zoom_window {
        config.zoom_half_width = v;
    }

    config.validate().context("invalid configuration")?;

    info!(
        "configuration: mz_column={} rt_column={} feature_id_col={} tolerance={} zoom={}",
        config.mz_column,
        config.rt_column,
        config.feature_id_column,
        config.mz_tolerance,
        config.zoom_half_width
    );

    Ok(config)
}

#[cfg(feature = "mzxml")]
fn run_pipeline(config: &EicConfig) -> Result<eicgen::runner::RunStats> {
    eicgen::runner::run(config).context("EIC generation failed")
}

#[cfg(not(feature = "mzxml"))]
fn run_pipeline(_config: &EicConfig) -> Result<eicgen::runner::RunStats> {
    anyhow::bail!("this build has no mzXML support; rebuild with the `mzxml` feature")
}
