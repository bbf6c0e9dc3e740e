//! Typed run configuration.
//!
//! All recognized options are validated once at startup; downstream components
//! take the validated [`EicConfig`] by reference instead of re-deriving values
//! from raw arguments. Column numbers are configured 1-based (matching the
//! feature-finding tools that produce the target file) and translated to
//! 0-based indices through the `*_index()` accessors.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

/// Default m/z column number in the target file (1-based).
pub const DEFAULT_MZ_COLUMN: usize = 6;
/// Default retention-time column number in the target file (1-based).
pub const DEFAULT_RT_COLUMN: usize = 7;
/// Default feature-ID column number in the target file (1-based).
pub const DEFAULT_FEATURE_ID_COLUMN: usize = 12;
/// Default m/z tolerance in Th.
pub const DEFAULT_MZ_TOLERANCE: f64 = 0.005;
/// Default zoom-window half-width in retention-time units.
pub const DEFAULT_ZOOM_HALF_WIDTH: f64 = 30.0;
/// Default target feature file name.
pub const DEFAULT_TARGET_FILE: &str = "NegIDed_FIN.csv";

/// Suffix appended to the run date to form the output file name.
const OUTPUT_SUFFIX: &str = "_EIC_CSV.csv";

/// Errors raised while validating the run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A column number was configured as 0 (columns are 1-based).
    #[error("column numbers are 1-based; {name} must be >= 1")]
    ZeroColumn {
        /// Name of the offending option.
        name: &'static str,
    },

    /// A numeric option was non-finite or non-positive.
    #[error("{name} must be a finite positive number, got {value}")]
    InvalidNumber {
        /// Name of the offending option.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The target file name was empty.
    #[error("target file name must not be empty")]
    EmptyTargetFile,

    /// I/O error reading a configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error in a configuration file.
    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Validated configuration for one EIC generation run.
#[derive(Debug, Clone)]
pub struct EicConfig {
    /// Directory holding the raw scan files and the target feature file;
    /// also the output location.
    pub target_dir: PathBuf,
    /// Name of the target feature file inside `target_dir`.
    pub target_file: String,
    /// m/z column number in the target file (1-based).
    pub mz_column: usize,
    /// Retention-time column number in the target file (1-based).
    pub rt_column: usize,
    /// Feature-ID column number in the target file (1-based).
    pub feature_id_column: usize,
    /// m/z window half-width: a record matches a feature when its m/z lies
    /// strictly within `feature.mz ± mz_tolerance`.
    pub mz_tolerance: f64,
    /// Zoom-window half-width around a feature's expected retention time.
    pub zoom_half_width: f64,
}

impl EicConfig {
    /// Create a configuration with the stock defaults for the given directory.
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            target_file: DEFAULT_TARGET_FILE.to_string(),
            mz_column: DEFAULT_MZ_COLUMN,
            rt_column: DEFAULT_RT_COLUMN,
            feature_id_column: DEFAULT_FEATURE_ID_COLUMN,
            mz_tolerance: DEFAULT_MZ_TOLERANCE,
            zoom_half_width: DEFAULT_ZOOM_HALF_WIDTH,
        }
    }

    /// Validate the configuration. Runs once at startup; any violation is a
    /// fatal configuration error raised before output is written.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("mz_column", self.mz_column),
            ("rt_column", self.rt_column),
            ("feature_id_col", self.feature_id_column),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroColumn { name });
            }
        }

        for (name, value) in [
            ("mz_tolerance", self.mz_tolerance),
            ("zoom_window", self.zoom_half_width),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidNumber { name, value });
            }
        }

        if self.target_file.is_empty() {
            return Err(ConfigError::EmptyTargetFile);
        }

        Ok(())
    }

    /// 0-based index of the m/z column.
    pub fn mz_index(&self) -> usize {
        self.mz_column - 1
    }

    /// 0-based index of the retention-time column.
    pub fn rt_index(&self) -> usize {
        self.rt_column - 1
    }

    /// 0-based index of the feature-ID column.
    pub fn feature_id_index(&self) -> usize {
        self.feature_id_column - 1
    }

    /// Full path of the target feature file.
    pub fn target_path(&self) -> PathBuf {
        self.target_dir.join(&self.target_file)
    }

    /// Output file name for the given run date, e.g. `2026_08_30_EIC_CSV.csv`.
    pub fn output_file_name(date: NaiveDate) -> String {
        format!("{}{}", date.format("%Y_%m_%d"), OUTPUT_SUFFIX)
    }

    /// Full output path for the given run date, inside the target directory.
    pub fn output_path(&self, date: NaiveDate) -> PathBuf {
        self.target_dir.join(Self::output_file_name(date))
    }
}

/// Optional TOML configuration file, e.g.
///
/// ```toml
/// # eicgen.toml
/// [extraction]
/// mz_column = 6
/// rt_column = 7
/// mz_tolerance = 0.005
/// feature_id_col = 12
/// zoom_window = 30.0
/// target_file = "NegIDed_FIN.csv"
/// ```
///
/// Values present in the file override the built-in defaults; command-line
/// flags override both.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Extraction-specific settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// Settings recognized under `[extraction]`.
#[derive(Debug, Default, Deserialize)]
pub struct ExtractionConfig {
    /// m/z column number (1-based).
    pub mz_column: Option<usize>,
    /// Retention-time column number (1-based).
    pub rt_column: Option<usize>,
    /// Feature-ID column number (1-based).
    pub feature_id_col: Option<usize>,
    /// m/z tolerance in Th.
    pub mz_tolerance: Option<f64>,
    /// Zoom-window half-width.
    pub zoom_window: Option<f64>,
    /// Target feature file name.
    pub target_file: Option<String>,
}

impl ConfigFile {
    /// Load a configuration file from disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration file from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Merge the file's values into `config`, leaving absent fields untouched.
    pub fn apply(&self, config: &mut EicConfig) {
        let ex = &self.extraction;
        if let Some(v) = ex.mz_column {
            config.mz_column = v;
        }
        if let Some(v) = ex.rt_column {
            config.rt_column = v;
        }
        if let Some(v) = ex.feature_id_col {
            config.feature_id_column = v;
        }
        if let Some(v) = ex.mz_tolerance {
            config.mz_tolerance = v;
        }
        if let Some(v) = ex.zoom_window {
            config.zoom_half_width = v;
        }
        if let Some(v) = &ex.target_file {
            config.target_file = v.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = EicConfig::new("/tmp/run");
        config.validate().unwrap();
        assert_eq!(config.mz_index(), 5);
        assert_eq!(config.rt_index(), 6);
        assert_eq!(config.feature_id_index(), 11);
    }

    #[test]
    fn zero_column_rejected() {
        let mut config = EicConfig::new("/tmp/run");
        config.rt_column = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroColumn { name: "rt_column" })
        ));
    }

    #[test]
    fn non_finite_tolerance_rejected() {
        let mut config = EicConfig::new("/tmp/run");
        config.mz_tolerance = f64::NAN;
        assert!(config.validate().is_err());

        config.mz_tolerance = -0.005;
        assert!(config.validate().is_err());
    }

    #[test]
    fn output_name_is_date_stamped() {
        let date = NaiveDate::from_ymd_opt(2022, 3, 7).unwrap();
        assert_eq!(EicConfig::output_file_name(date), "2022_03_07_EIC_CSV.csv");
    }

    #[test]
    fn parse_config_file() {
        let toml = r#"
            [extraction]
            mz_column = 4
            mz_tolerance = 0.01
            target_file = "PosIDed_FIN.csv"
        "#;

        let file = ConfigFile::from_str(toml).unwrap();
        let mut config = EicConfig::new("/tmp/run");
        file.apply(&mut config);

        assert_eq!(config.mz_column, 4);
        assert_eq!(config.mz_tolerance, 0.01);
        assert_eq!(config.target_file, "PosIDed_FIN.csv");
        // Untouched fields keep their defaults.
        assert_eq!(config.rt_column, DEFAULT_RT_COLUMN);
    }

    #[test]
    fn empty_config_file() {
        let file = ConfigFile::from_str("").unwrap();
        let mut config = EicConfig::new("/tmp/run");
        file.apply(&mut config);
        assert_eq!(config.mz_column, DEFAULT_MZ_COLUMN);
    }
}
