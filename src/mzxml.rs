//! mzXML scan-file parsing and CSV conversion.
//!
//! mzXML stores each scan's peak list as a Base64-encoded binary block of
//! interleaved (m/z, intensity) pairs in network (big-endian) byte order,
//! optionally zlib-compressed, with the retention time carried as an ISO-8601
//! duration attribute (`PT1328.9S`). [`MzXmlConverter`] streams the XML,
//! decodes each peak block, and writes one `mz,rt,intensity` CSV row per peak
//! next to the source file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use base64::prelude::*;
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::convert::{ConvertError, ScanConverter, CONVERTED_EXTENSION};

/// Errors that can occur during mzXML parsing
#[derive(Debug, thiserror::Error)]
pub enum MzXmlError {
    /// Error parsing XML
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Base64 decode error in a peaks block
    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// Invalid mzXML document structure
    #[error("Invalid mzXML structure: {0}")]
    InvalidStructure(String),

    /// Invalid value for an XML attribute
    #[error("Invalid attribute value: {0}")]
    InvalidAttributeValue(String),

    /// UTF-8 encoding error in text content
    #[error("UTF-8 encoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Error writing the converted CSV
    #[error("CSV write error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Peak value precision declared on a `<peaks>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PeaksPrecision {
    /// 32-bit floats (the common case)
    #[default]
    Float32,
    /// 64-bit floats
    Float64,
}

impl PeaksPrecision {
    fn from_attr(value: &str) -> Result<Self, MzXmlError> {
        match value {
            "32" => Ok(Self::Float32),
            "64" => Ok(Self::Float64),
            other => Err(MzXmlError::InvalidAttributeValue(format!(
                "unsupported peaks precision {other:?}"
            ))),
        }
    }
}

/// Attributes captured from a `<peaks>` start tag.
#[derive(Debug, Default)]
struct PeaksContext {
    precision: PeaksPrecision,
    zlib: bool,
    base64_data: String,
}

/// Converts one mzXML file into a `mz,rt,intensity` CSV next to the source.
///
/// Pure function of the path and idempotent: converting the same file twice
/// produces the same output.
#[derive(Debug, Default)]
pub struct MzXmlConverter;

impl MzXmlConverter {
    /// Create a converter.
    pub fn new() -> Self {
        Self
    }

    /// Parse `raw` and write the converted CSV, returning its path.
    pub fn convert_file(&self, raw: &Path) -> Result<PathBuf, MzXmlError> {
        let out_path = raw.with_extension(CONVERTED_EXTENSION);
        let reader = BufReader::new(File::open(raw)?);
        let mut xml_reader = Reader::from_reader(reader);

        let mut writer = csv::Writer::from_path(&out_path)?;
        writer.write_record(["mz", "rt", "intensity"])?;

        // Scans nest in mzXML (MS2 scans sit inside their survey scan), so
        // the retention time in force for a peaks block is the top of a stack.
        let mut rt_stack: Vec<f64> = Vec::new();
        let mut current_peaks: Option<PeaksContext> = None;
        let mut peak_count: u64 = 0;
        let mut buf = Vec::new();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"scan" => {
                        rt_stack.push(parse_scan_rt(e)?);
                    }
                    b"peaks" => {
                        current_peaks = Some(parse_peaks_attrs(e)?);
                    }
                    _ => {}
                },
                Ok(Event::Empty(ref e)) => {
                    // An empty peaks element is legal for a scan with no peaks.
                    if e.name().as_ref() == b"peaks" {
                        parse_peaks_attrs(e)?;
                    }
                }
                Ok(Event::Text(ref t)) => {
                    if let Some(ref mut ctx) = current_peaks {
                        ctx.base64_data.push_str(&t.unescape()?);
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"scan" => {
                        rt_stack.pop();
                    }
                    b"peaks" => {
                        if let Some(ctx) = current_peaks.take() {
                            let rt = rt_stack.last().copied().ok_or_else(|| {
                                MzXmlError::InvalidStructure(
                                    "peaks element outside of a scan".to_string(),
                                )
                            })?;
                            let pairs = decode_peaks(&ctx)?;
                            for (mz, intensity) in pairs {
                                writer.serialize((mz, rt, intensity))?;
                                peak_count += 1;
                            }
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(MzXmlError::XmlError(e)),
                _ => {}
            }
            buf.clear();
        }

        writer.flush().map_err(MzXmlError::IoError)?;
        info!("{}: {} peaks converted", raw.display(), peak_count);
        Ok(out_path)
    }
}

impl ScanConverter for MzXmlConverter {
    fn convert(&self, raw: &Path) -> Result<PathBuf, ConvertError> {
        self.convert_file(raw).map_err(|e| ConvertError::Conversion {
            path: raw.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Extract and parse the retention time from a `<scan>` start tag.
fn parse_scan_rt(e: &BytesStart) -> Result<f64, MzXmlError> {
    let value = get_attribute(e, "retentionTime")?.ok_or_else(|| {
        MzXmlError::InvalidStructure("scan element without retentionTime".to_string())
    })?;
    parse_retention_time(&value)
}

/// Parse an mzXML retention time, an xs:duration like `PT1328.91S`.
/// A bare number (already seconds) is tolerated.
fn parse_retention_time(value: &str) -> Result<f64, MzXmlError> {
    let trimmed = value.trim();
    let seconds = trimmed
        .strip_prefix("PT")
        .and_then(|s| s.strip_suffix('S'))
        .unwrap_or(trimmed);
    seconds.parse().map_err(|_| {
        MzXmlError::InvalidAttributeValue(format!("unparsable retentionTime {value:?}"))
    })
}

/// Read the peaks attributes that control decoding.
fn parse_peaks_attrs(e: &BytesStart) -> Result<PeaksContext, MzXmlError> {
    let precision = match get_attribute(e, "precision")? {
        Some(value) => PeaksPrecision::from_attr(&value)?,
        None => PeaksPrecision::default(),
    };

    if let Some(order) = get_attribute(e, "byteOrder")? {
        if order != "network" {
            return Err(MzXmlError::InvalidAttributeValue(format!(
                "unsupported byteOrder {order:?} (only network order is defined for mzXML)"
            )));
        }
    }

    let zlib = match get_attribute(e, "compressionType")? {
        None => false,
        Some(value) if value == "none" => false,
        Some(value) if value == "zlib" => true,
        Some(other) => {
            return Err(MzXmlError::InvalidAttributeValue(format!(
                "unsupported compressionType {other:?}"
            )))
        }
    };

    Ok(PeaksContext {
        precision,
        zlib,
        base64_data: String::new(),
    })
}

/// Decode a peaks block into (m/z, intensity) pairs.
///
/// Pipeline: Base64 decode, optional zlib inflate, then interpret the bytes
/// as big-endian floats interleaved m/z-first.
fn decode_peaks(ctx: &PeaksContext) -> Result<Vec<(f64, f64)>, MzXmlError> {
    let trimmed = ctx.base64_data.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let decoded = BASE64_STANDARD.decode(trimmed)?;

    let bytes = if ctx.zlib {
        let mut inflated = Vec::new();
        ZlibDecoder::new(&decoded[..]).read_to_end(&mut inflated)?;
        inflated
    } else {
        decoded
    };

    let value_size = match ctx.precision {
        PeaksPrecision::Float32 => 4,
        PeaksPrecision::Float64 => 8,
    };
    if bytes.len() % (value_size * 2) != 0 {
        return Err(MzXmlError::InvalidStructure(format!(
            "peaks block of {} bytes is not a whole number of {}-bit pairs",
            bytes.len(),
            value_size * 8
        )));
    }

    let pair_count = bytes.len() / (value_size * 2);
    let mut cursor = &bytes[..];
    let mut pairs = Vec::with_capacity(pair_count);
    for _ in 0..pair_count {
        let (mz, intensity) = match ctx.precision {
            PeaksPrecision::Float32 => (
                cursor.read_f32::<BigEndian>()? as f64,
                cursor.read_f32::<BigEndian>()? as f64,
            ),
            PeaksPrecision::Float64 => (
                cursor.read_f64::<BigEndian>()?,
                cursor.read_f64::<BigEndian>()?,
            ),
        };
        pairs.push((mz, intensity));
    }

    debug!("decoded {} peaks", pairs.len());
    Ok(pairs)
}

fn get_attribute(e: &BytesStart, name: &str) -> Result<Option<String>, MzXmlError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| MzXmlError::XmlError(quick_xml::Error::from(e)))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = std::str::from_utf8(&attr.value)?.to_string();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn encode_pairs_f32(pairs: &[(f32, f32)]) -> String {
        let mut bytes = Vec::new();
        for &(mz, intensity) in pairs {
            bytes.extend_from_slice(&mz.to_be_bytes());
            bytes.extend_from_slice(&intensity.to_be_bytes());
        }
        BASE64_STANDARD.encode(bytes)
    }

    fn encode_pairs_f64_zlib(pairs: &[(f64, f64)]) -> String {
        let mut bytes = Vec::new();
        for &(mz, intensity) in pairs {
            bytes.extend_from_slice(&mz.to_be_bytes());
            bytes.extend_from_slice(&intensity.to_be_bytes());
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).unwrap();
        BASE64_STANDARD.encode(encoder.finish().unwrap())
    }

    #[test]
    fn parses_iso_duration_retention_time() {
        assert_eq!(parse_retention_time("PT1328.91S").unwrap(), 1328.91);
        assert_eq!(parse_retention_time("PT0.5S").unwrap(), 0.5);
        assert_eq!(parse_retention_time("42.5").unwrap(), 42.5);
        assert!(parse_retention_time("PTxyzS").is_err());
    }

    #[test]
    fn converts_uncompressed_f32_scan() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("sample.mzXML");
        let peaks = encode_pairs_f32(&[(400.5, 1000.0), (655.25, 2500.0)]);
        std::fs::write(
            &raw,
            format!(
                r#"<?xml version="1.0"?>
<mzXML>
 <msRun scanCount="1">
  <scan num="1" msLevel="1" retentionTime="PT12.5S">
   <peaks precision="32" byteOrder="network" contentType="m/z-int">{peaks}</peaks>
  </scan>
 </msRun>
</mzXML>"#
            ),
        )
        .unwrap();

        let out = MzXmlConverter::new().convert_file(&raw).unwrap();
        assert_eq!(out, dir.path().join("sample.csv"));

        let body = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "mz,rt,intensity");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("400.5,12.5,"));
        assert!(lines[2].starts_with("655.25,12.5,"));
    }

    #[test]
    fn converts_zlib_f64_nested_scans() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("nested.mzXML");
        let ms1 = encode_pairs_f64_zlib(&[(500.125, 9000.0)]);
        let ms2 = encode_pairs_f64_zlib(&[(120.0625, 300.0)]);
        std::fs::write(
            &raw,
            format!(
                r#"<?xml version="1.0"?>
<mzXML>
 <msRun scanCount="2">
  <scan num="1" msLevel="1" retentionTime="PT60S">
   <peaks precision="64" byteOrder="network" compressionType="zlib">{ms1}</peaks>
   <scan num="2" msLevel="2" retentionTime="PT61S">
    <peaks precision="64" byteOrder="network" compressionType="zlib">{ms2}</peaks>
   </scan>
  </scan>
 </msRun>
</mzXML>"#
            ),
        )
        .unwrap();

        let out = MzXmlConverter::new().convert_file(&raw).unwrap();
        let body = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "500.125,60.0,9000.0");
        assert_eq!(lines[2], "120.0625,61.0,300.0");
    }

    #[test]
    fn scan_without_peaks_is_fine() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("empty.mzXML");
        std::fs::write(
            &raw,
            r#"<?xml version="1.0"?>
<mzXML>
 <msRun scanCount="1">
  <scan num="1" msLevel="1" retentionTime="PT1S">
   <peaks precision="32" byteOrder="network"></peaks>
  </scan>
 </msRun>
</mzXML>"#,
        )
        .unwrap();

        let out = MzXmlConverter::new().convert_file(&raw).unwrap();
        let body = std::fs::read_to_string(&out).unwrap();
        assert_eq!(body.trim(), "mz,rt,intensity");
    }

    #[test]
    fn truncated_peaks_block_is_rejected() {
        let ctx = PeaksContext {
            precision: PeaksPrecision::Float32,
            zlib: false,
            // 6 bytes: not a whole number of 4-byte pairs.
            base64_data: BASE64_STANDARD.encode([0u8; 6]),
        };
        assert!(matches!(
            decode_peaks(&ctx),
            Err(MzXmlError::InvalidStructure(_))
        ));
    }

    #[test]
    fn little_endian_marker_is_rejected() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("bad.mzXML");
        std::fs::write(
            &raw,
            r#"<mzXML><msRun><scan num="1" retentionTime="PT1S">
<peaks precision="32" byteOrder="little"></peaks></scan></msRun></mzXML>"#,
        )
        .unwrap();

        assert!(MzXmlConverter::new().convert_file(&raw).is_err());
    }
}
