//! Target feature file reading.
//!
//! The target file is a comma-separated table produced by an upstream
//! feature-finding step; the m/z, retention-time, and ID columns sit at
//! configured positions. A row that cannot be parsed is a fatal configuration
//! error for the whole run: there is no valid partial feature.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::EicConfig;

/// Errors raised while reading the target feature file.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// The target file could not be opened or read.
    #[error("failed to read target file {path}: {source}")]
    Read {
        /// The target file path.
        path: PathBuf,
        /// Underlying CSV/I-O error.
        source: csv::Error,
    },

    /// A configured column is absent from a row.
    #[error("target file row {row}: missing {name} column {column} (1-based)")]
    MissingColumn {
        /// 1-based row number (header is row 1).
        row: u64,
        /// Which configured column.
        name: &'static str,
        /// The configured 1-based column number.
        column: usize,
    },

    /// A numeric cell failed to parse.
    #[error("target file row {row}: {name} value {value:?} is not a number")]
    InvalidNumber {
        /// 1-based row number (header is row 1).
        row: u64,
        /// Which configured column.
        name: &'static str,
        /// The offending cell contents.
        value: String,
    },
}

/// One target analyte: an expected m/z, a retention time, and an opaque label.
///
/// Feature IDs are not guaranteed unique and are never deduplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Expected m/z.
    pub mz: f64,
    /// Expected retention time, the center of the zoom window.
    pub rt: f64,
    /// Opaque identifier carried through to the output.
    pub feature_id: Arc<str>,
}

/// Restartable reader over the target feature file.
///
/// Each call to [`FeatureReader::read_all`] reopens the file, skips the header
/// row, and parses the configured columns of every subsequent row.
#[derive(Debug)]
pub struct FeatureReader {
    path: PathBuf,
    mz_index: usize,
    rt_index: usize,
    feature_id_index: usize,
}

impl FeatureReader {
    /// Create a reader for the target file named by `config`.
    pub fn new(config: &EicConfig) -> Self {
        Self {
            path: config.target_path(),
            mz_index: config.mz_index(),
            rt_index: config.rt_index(),
            feature_id_index: config.feature_id_index(),
        }
    }

    /// Read every feature row. Fails on the first unparsable row.
    pub fn read_all(&self) -> Result<Vec<Feature>, FeatureError> {
        let mut reader =
            csv::Reader::from_path(&self.path).map_err(|source| FeatureError::Read {
                path: self.path.clone(),
                source,
            })?;

        let mut features = Vec::new();
        // csv::Reader consumes the header row itself; data starts at row 2.
        for (idx, record) in reader.records().enumerate() {
            let row = idx as u64 + 2;
            let record = record.map_err(|source| FeatureError::Read {
                path: self.path.clone(),
                source,
            })?;

            let mz = parse_number(&record, row, "m/z", self.mz_index)?;
            let rt = parse_number(&record, row, "RT", self.rt_index)?;
            let feature_id = cell(&record, row, "feature ID", self.feature_id_index)?;

            features.push(Feature {
                mz,
                rt,
                feature_id: feature_id.into(),
            });
        }

        Ok(features)
    }
}

fn cell<'r>(
    record: &'r csv::StringRecord,
    row: u64,
    name: &'static str,
    index: usize,
) -> Result<&'r str, FeatureError> {
    record.get(index).ok_or(FeatureError::MissingColumn {
        row,
        name,
        column: index + 1,
    })
}

fn parse_number(
    record: &csv::StringRecord,
    row: u64,
    name: &'static str,
    index: usize,
) -> Result<f64, FeatureError> {
    let value = cell(record, row, name, index)?;
    value
        .trim()
        .parse()
        .map_err(|_| FeatureError::InvalidNumber {
            row,
            name,
            value: value.to_string(),
        })
}
