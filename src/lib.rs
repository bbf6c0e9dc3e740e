//! # eicgen - Extracted Ion Chromatogram Generation
//!
//! `eicgen` turns a directory of raw mzXML scan files plus a target feature
//! table into one consolidated EIC CSV: for every feature (an m/z, a
//! retention time, and an identifier) it finds every recorded scan whose m/z
//! falls strictly within a fixed tolerance of the feature's m/z, tags each
//! match as inside or outside a retention-time zoom window, and appends one
//! row per match to a date-stamped output table.
//!
//! ## Pipeline
//!
//! ```text
//! raw mzXML files ──▶ ConversionScheduler ──▶ converted CSV scan stores
//!                                                      │
//!                                                      ▼
//!                                         RecordStore (m/z-sorted index)
//!                                                      │
//!                            features ──▶ extraction fan-out (rayon)
//!                                                      │  per-feature row batches
//!                                                      ▼
//!                                    writer thread ──▶ YYYY_MM_DD_EIC_CSV.csv
//! ```
//!
//! Conversion is idempotent: raw files whose converted counterpart already
//! exists are skipped, and a single corrupt file is logged and excluded
//! rather than aborting the batch. The record store is frozen before
//! extraction begins, so every feature's task shares it read-only with no
//! locking; the single writer thread serializes output while keeping each
//! feature's rows contiguous.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eicgen::config::EicConfig;
//!
//! let mut config = EicConfig::new("Test_Files");
//! config.mz_tolerance = 0.005;
//!
//! let stats = eicgen::runner::run(&config)?;
//! println!(
//!     "wrote {} rows to {}",
//!     stats.rows_written,
//!     stats.output_path.display()
//! );
//! # Ok::<(), eicgen::runner::RunError>(())
//! ```
//!
//! ## Memory model
//!
//! The full consolidated record store resides in memory for the duration of
//! the extraction phase; that bounds the maximum input size on a given host.
//! The output, on the other hand, streams: row batches are written as each
//! feature's extraction completes.

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod cancel;
pub mod config;
pub mod convert;
pub mod extract;
pub mod features;
#[cfg(feature = "mzxml")]
pub mod mzxml;
pub mod runner;
pub mod store;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::config::{ConfigError, ConfigFile, EicConfig};
    pub use crate::convert::{ConversionScheduler, ConvertError, ScanConverter};
    pub use crate::extract::{extract_rows, OutputRow};
    pub use crate::features::{Feature, FeatureError, FeatureReader};
    #[cfg(feature = "mzxml")]
    pub use crate::mzxml::{MzXmlConverter, MzXmlError};
    #[cfg(feature = "mzxml")]
    pub use crate::runner::run;
    pub use crate::runner::{run_with_converter, RunError, RunStats};
    pub use crate::store::{RecordStore, ScanRecord, StoreError};
}
