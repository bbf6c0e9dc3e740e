//! Per-feature EIC extraction.
//!
//! Pure filtering over the frozen [`RecordStore`]: no side effects, so any
//! number of features can be extracted concurrently against the same store.

use std::sync::Arc;

use crate::features::Feature;
use crate::store::RecordStore;

/// One output row: the join of a feature with one matching scan record.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    /// Feature identifier, copied verbatim from the target file.
    pub feature_id: Arc<str>,
    /// Retention time of the matching record.
    pub rt: f64,
    /// Intensity of the matching record.
    pub intensity: f64,
    /// m/z of the matching record.
    pub mz: f64,
    /// Basename of the converted file the record came from.
    pub source_file: Arc<str>,
    /// Whether the record's retention time falls strictly inside the
    /// feature's zoom window. Rendered as `TRUE`/`FALSE` in the output.
    pub zoom: bool,
}

impl OutputRow {
    /// The literal string the zoom flag renders to.
    pub fn zoom_literal(&self) -> &'static str {
        if self.zoom {
            "TRUE"
        } else {
            "FALSE"
        }
    }
}

/// Extract every output row for one feature.
///
/// Matches are the records whose m/z lies strictly within
/// `feature.mz ± mz_tolerance`; each match is tagged with a zoom flag that is
/// true iff its retention time lies strictly within
/// `feature.rt ± zoom_half_width`. An unmatched feature yields an empty
/// vector, which is a normal outcome rather than an error. Rows come out in
/// the store's ascending m/z order.
pub fn extract_rows(
    feature: &Feature,
    store: &RecordStore,
    mz_tolerance: f64,
    zoom_half_width: f64,
) -> Vec<OutputRow> {
    let matches = store.range_query(feature.mz - mz_tolerance, feature.mz + mz_tolerance);
    if matches.is_empty() {
        return Vec::new();
    }

    let zoom_low = feature.rt - zoom_half_width;
    let zoom_high = feature.rt + zoom_half_width;

    matches
        .iter()
        .map(|record| OutputRow {
            feature_id: Arc::clone(&feature.feature_id),
            rt: record.rt,
            intensity: record.intensity,
            mz: record.mz,
            source_file: Arc::clone(&record.source_file),
            zoom: zoom_low < record.rt && record.rt < zoom_high,
        })
        .collect()
}
