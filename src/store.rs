//! Consolidated in-memory scan record store.
//!
//! All converted scan CSVs are loaded into one collection, tagged with their
//! source file, sorted once by m/z, and then queried read-only for the rest of
//! the run. The m/z sort lets every feature's tolerance window be answered
//! with a binary-search-bounded slice instead of a full scan, which is what
//! keeps extraction cheap when the store holds tens of millions of records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;
use serde::Deserialize;

/// Errors raised while building the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A converted scan file could not be opened or read.
    #[error("failed to read scan store {path}: {source}")]
    Read {
        /// The offending file.
        path: PathBuf,
        /// Underlying CSV/I-O error.
        source: csv::Error,
    },
}

/// One measured (m/z, retention time, intensity) triple, annotated with the
/// basename of the converted file it came from. Immutable once inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    /// Mass-to-charge ratio.
    pub mz: f64,
    /// Retention time.
    pub rt: f64,
    /// Signal intensity.
    pub intensity: f64,
    /// Basename of the originating converted file, attached at load time.
    pub source_file: Arc<str>,
}

/// Row shape of a converted scan CSV.
#[derive(Debug, Deserialize)]
struct ScanRow {
    mz: f64,
    rt: f64,
    intensity: f64,
}

/// Read-only-after-construction collection of [`ScanRecord`], sorted by m/z.
///
/// The freeze-then-share discipline is what makes lock-free concurrent reads
/// safe: after [`RecordStore::load`] returns, no insertion or mutation occurs
/// for the remainder of the run, and every extraction task borrows the store
/// immutably.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<ScanRecord>,
}

impl RecordStore {
    /// Load every converted scan CSV into one consolidated store.
    ///
    /// Files are read in parallel, each batch tagged with its file's basename
    /// as provenance. Zero-row files contribute nothing. The consolidated
    /// collection is sorted by m/z once before the store is returned.
    pub fn load(paths: &[PathBuf]) -> Result<Self, StoreError> {
        let batches: Vec<Vec<ScanRecord>> = paths
            .par_iter()
            .map(|path| read_scan_csv(path))
            .collect::<Result<_, _>>()?;

        let mut records: Vec<ScanRecord> = batches.into_iter().flatten().collect();

        // total_cmp keeps the sort total in the presence of NaN m/z values;
        // NaNs order after +inf and can never satisfy a range query.
        records.sort_unstable_by(|a, b| a.mz.total_cmp(&b.mz));

        info!(
            "record store loaded: {} records from {} files",
            records.len(),
            paths.len()
        );

        Ok(Self { records })
    }

    /// Number of records in the store.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, in ascending m/z order.
    pub fn records(&self) -> &[ScanRecord] {
        &self.records
    }

    /// Every record whose m/z lies strictly between `low` and `high`
    /// (both bounds exclusive), in ascending m/z order.
    pub fn range_query(&self, low: f64, high: f64) -> &[ScanRecord] {
        let start = self.records.partition_point(|r| r.mz <= low);
        let end = start + self.records[start..].partition_point(|r| r.mz < high);
        &self.records[start..end]
    }
}

/// Read one converted scan CSV into records tagged with the file's basename.
fn read_scan_csv(path: &Path) -> Result<Vec<ScanRecord>, StoreError> {
    let source_file: Arc<str> = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .into();

    let mut reader = csv::Reader::from_path(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for row in reader.deserialize::<ScanRow>() {
        let row = row.map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(ScanRecord {
            mz: row.mz,
            rt: row.rt,
            intensity: row.intensity,
            source_file: Arc::clone(&source_file),
        });
    }

    debug!("{}: {} records", source_file, records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn store_from(records: Vec<(f64, f64, f64)>) -> RecordStore {
        let mut records: Vec<ScanRecord> = records
            .into_iter()
            .map(|(mz, rt, intensity)| ScanRecord {
                mz,
                rt,
                intensity,
                source_file: "test.csv".into(),
            })
            .collect();
        records.sort_unstable_by(|a, b| a.mz.total_cmp(&b.mz));
        RecordStore { records }
    }

    #[test]
    fn range_query_bounds_are_exclusive() {
        let store = store_from(vec![
            (99.9950, 1.0, 10.0),
            (99.9951, 2.0, 20.0),
            (100.0049, 3.0, 30.0),
            (100.0050, 4.0, 40.0),
        ]);

        // tolerance 0.005 around 100.000: records exactly at the bounds are
        // excluded, records just inside are included.
        let hits = store.range_query(100.000 - 0.005, 100.000 + 0.005);
        let mzs: Vec<f64> = hits.iter().map(|r| r.mz).collect();
        assert_eq!(mzs, vec![99.9951, 100.0049]);
    }

    #[test]
    fn range_query_empty_store() {
        let store = RecordStore::default();
        assert!(store.range_query(0.0, 1000.0).is_empty());
    }

    #[test]
    fn range_query_no_match() {
        let store = store_from(vec![(100.0, 1.0, 1.0), (200.0, 2.0, 2.0)]);
        assert!(store.range_query(150.0, 151.0).is_empty());
    }

    #[test]
    fn load_tags_source_file_and_sorts() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("run_a.csv");
        let b = dir.path().join("run_b.csv");
        std::fs::write(&a, "mz,rt,intensity\n500.1,10.0,1000\n100.2,11.0,2000\n").unwrap();
        std::fs::write(&b, "mz,rt,intensity\n300.5,12.0,3000\n").unwrap();

        let store = RecordStore::load(&[a, b]).unwrap();
        assert_eq!(store.len(), 3);

        let mzs: Vec<f64> = store.records().iter().map(|r| r.mz).collect();
        assert_eq!(mzs, vec![100.2, 300.5, 500.1]);
        assert_eq!(&*store.records()[0].source_file, "run_a.csv");
        assert_eq!(&*store.records()[1].source_file, "run_b.csv");
    }

    #[test]
    fn load_tolerates_header_only_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "mz,rt,intensity").unwrap();

        let store = RecordStore::load(&[path]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn load_rejects_malformed_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "mz,rt,intensity\nnot_a_number,1.0,2.0\n").unwrap();

        assert!(RecordStore::load(&[path]).is_err());
    }
}
