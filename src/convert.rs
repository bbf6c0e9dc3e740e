//! Raw scan-file conversion scheduling.
//!
//! The scheduler snapshots the target directory once at start, derives the
//! expected converted path for every raw file, and dispatches conversion of
//! the files that lack one across a bounded worker pool. Reruns are
//! idempotent: a raw file whose converted counterpart already existed in the
//! snapshot is never reconverted.
//!
//! A single file's conversion failure does not abort the scheduler. The
//! failure is logged and that file is simply absent from the result set for
//! this run, so one corrupt instrument file cannot take down a batch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;

use crate::cancel::CancelToken;

/// File extension of raw scan files (exact case).
pub const RAW_EXTENSION: &str = "mzXML";

/// File extension of converted tabular scan files.
pub const CONVERTED_EXTENSION: &str = "csv";

/// Errors raised by the conversion scheduler and converters.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The target directory could not be listed.
    #[error("failed to list target directory {path}: {source}")]
    ListDir {
        /// The target directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// One raw file failed to convert.
    #[error("failed to convert {path}: {message}")]
    Conversion {
        /// The raw file.
        path: PathBuf,
        /// Converter-specific description of the failure.
        message: String,
    },

    /// The worker pool could not be created.
    #[error("failed to build conversion pool: {0}")]
    Pool(String),
}

/// A converter that turns one raw scan file into a tabular scan file.
///
/// Implementations are pure functions of the path: given the same raw file
/// they produce the same converted file, written next to the source with the
/// [`CONVERTED_EXTENSION`]. Converters run concurrently across files and so
/// must be `Sync`.
pub trait ScanConverter: Sync {
    /// Convert `raw` and return the path of the converted file.
    fn convert(&self, raw: &Path) -> Result<PathBuf, ConvertError>;
}

/// Schedules conversion of every raw scan file in one directory.
#[derive(Debug)]
pub struct ConversionScheduler {
    target_dir: PathBuf,
    /// Directory listing taken once at scheduler start.
    snapshot: HashSet<PathBuf>,
    raw_files: Vec<PathBuf>,
}

impl ConversionScheduler {
    /// Snapshot `target_dir` and identify the raw scan files in it.
    /// Does not walk subdirectories.
    pub fn new(target_dir: impl Into<PathBuf>) -> Result<Self, ConvertError> {
        let target_dir = target_dir.into();

        let mut snapshot = HashSet::new();
        let entries = std::fs::read_dir(&target_dir).map_err(|source| ConvertError::ListDir {
            path: target_dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ConvertError::ListDir {
                path: target_dir.clone(),
                source,
            })?;
            snapshot.insert(entry.path());
        }

        let raw_files: Vec<PathBuf> = snapshot
            .iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == RAW_EXTENSION))
            .cloned()
            .collect();

        Ok(Self {
            target_dir,
            snapshot,
            raw_files,
        })
    }

    /// The raw scan files found in the snapshot, in no guaranteed order.
    pub fn raw_files(&self) -> &[PathBuf] {
        &self.raw_files
    }

    /// The directory this scheduler operates on.
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Convert every raw file that lacks a converted counterpart, across a
    /// pool of `available_parallelism + 1` workers.
    ///
    /// Returns the converted paths (pre-existing + newly produced), in no
    /// guaranteed order. Individual conversion failures are logged at `warn`
    /// and excluded; cancellation stops new conversions from starting.
    pub fn convert_all<C: ScanConverter>(
        &self,
        converter: &C,
        cancel: &CancelToken,
    ) -> Result<Vec<PathBuf>, ConvertError> {
        let mut converted = Vec::new();
        let mut pending = Vec::new();

        for raw in &self.raw_files {
            let expected = raw.with_extension(CONVERTED_EXTENSION);
            if self.snapshot.contains(&expected) {
                converted.push(expected);
            } else {
                pending.push(raw.as_path());
            }
        }

        info!(
            "conversion: {} raw files, {} already converted, {} pending",
            self.raw_files.len(),
            converted.len(),
            pending.len()
        );

        if pending.is_empty() {
            return Ok(converted);
        }

        let workers = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4)
            + 1;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("eic-convert-{i}"))
            .build()
            .map_err(|e| ConvertError::Pool(e.to_string()))?;

        let produced: Vec<Option<PathBuf>> = pool.install(|| {
            pending
                .par_iter()
                .map(|raw| {
                    if cancel.is_cancelled() {
                        info!("cancelled before converting {}", raw.display());
                        return None;
                    }
                    match converter.convert(raw) {
                        Ok(path) => Some(path),
                        Err(e) => {
                            warn!("skipping {}: {e}", raw.display());
                            None
                        }
                    }
                })
                .collect()
        });

        converted.extend(produced.into_iter().flatten());
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Converter stub that writes a header-only CSV and counts invocations.
    struct CountingConverter {
        calls: AtomicUsize,
    }

    impl CountingConverter {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ScanConverter for CountingConverter {
        fn convert(&self, raw: &Path) -> Result<PathBuf, ConvertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = raw.with_extension(CONVERTED_EXTENSION);
            std::fs::write(&out, "mz,rt,intensity\n").map_err(|e| ConvertError::Conversion {
                path: raw.to_path_buf(),
                message: e.to_string(),
            })?;
            Ok(out)
        }
    }

    /// Converter stub that always fails.
    struct FailingConverter;

    impl ScanConverter for FailingConverter {
        fn convert(&self, raw: &Path) -> Result<PathBuf, ConvertError> {
            Err(ConvertError::Conversion {
                path: raw.to_path_buf(),
                message: "boom".to_string(),
            })
        }
    }

    #[test]
    fn finds_raw_files_by_exact_extension() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.mzXML"), "x").unwrap();
        std::fs::write(dir.path().join("b.mzxml"), "x").unwrap();
        std::fs::write(dir.path().join("c.txt"), "x").unwrap();

        let scheduler = ConversionScheduler::new(dir.path()).unwrap();
        assert_eq!(scheduler.raw_files().len(), 1);
    }

    #[test]
    fn second_run_converts_nothing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.mzXML"), "x").unwrap();
        std::fs::write(dir.path().join("b.mzXML"), "x").unwrap();

        let converter = CountingConverter::new();
        let cancel = CancelToken::new();

        let scheduler = ConversionScheduler::new(dir.path()).unwrap();
        let first = scheduler.convert_all(&converter, &cancel).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(converter.calls.load(Ordering::SeqCst), 2);

        // Fresh scheduler, fresh snapshot: the converted files now exist.
        let scheduler = ConversionScheduler::new(dir.path()).unwrap();
        let second = scheduler.convert_all(&converter, &cancel).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(converter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_is_isolated_to_the_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.mzXML"), "x").unwrap();

        let scheduler = ConversionScheduler::new(dir.path()).unwrap();
        let converted = scheduler
            .convert_all(&FailingConverter, &CancelToken::new())
            .unwrap();
        assert!(converted.is_empty());
    }

    #[test]
    fn cancelled_scheduler_starts_no_conversion() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.mzXML"), "x").unwrap();

        let converter = CountingConverter::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let scheduler = ConversionScheduler::new(dir.path()).unwrap();
        let converted = scheduler.convert_all(&converter, &cancel).unwrap();
        assert!(converted.is_empty());
        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert!(matches!(
            ConversionScheduler::new(&gone),
            Err(ConvertError::ListDir { .. })
        ));
    }
}
