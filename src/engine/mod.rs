//! The external vector engine: dataset introspection and normalization.

mod ogr;

use anyhow::{Context, Result};
use geojson::GeoJson;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

pub use ogr::OgrEngine;

pub const GEOJSONSEQ_DRIVER: &str = "GeoJSONSeq";
pub const WGS84_NAME: &str = "WGS 84";

// First records larger than this are left to the engine to identify.
const PROBE_LIMIT: u64 = 16 * 1024 * 1024;

/// Driver and spatial reference of a dataset's first layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    pub driver: String,
    pub srs_name: Option<String>,
}

impl DatasetInfo {
    pub fn is_wgs84_geojsonseq(&self) -> bool {
        self.driver == GEOJSONSEQ_DRIVER && self.srs_name.as_deref() == Some(WGS84_NAME)
    }
}

pub trait VectorEngine {
    /// Open a dataset and report its driver and spatial reference.
    fn probe(&self, path: &Path) -> Result<DatasetInfo>;

    /// Write `source` to `destination` as GeoJSONSeq in CRS:84, with extra options appended.
    fn translate(&self, source: &Path, destination: &Path, options: &[String]) -> Result<()>;
}

/// Recognize GeoJSONSeq without the engine: the first record is a GeoJSON
/// Feature with no `crs` member (RFC 8142 sequences are always WGS 84).
pub fn probe_geojsonseq(path: &Path) -> Result<Option<DatasetInfo>> {
    let file = File::open(path).with_context(|| format!("Engine: Failed to open {:?}", path))?;
    let mut reader = BufReader::new(file).take(PROBE_LIMIT);

    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        let Ok(line) = std::str::from_utf8(&buf) else {
            return Ok(None);
        };
        let line = line.trim_start_matches('\u{1e}').trim();
        if line.is_empty() {
            continue;
        }

        return Ok(match line.parse::<GeoJson>() {
            Ok(GeoJson::Feature(feature))
                if !feature
                    .foreign_members
                    .as_ref()
                    .is_some_and(|members| members.contains_key("crs")) =>
            {
                Some(DatasetInfo {
                    driver: GEOJSONSEQ_DRIVER.to_string(),
                    srs_name: Some(WGS84_NAME.to_string()),
                })
            }
            _ => None,
        });
    }
}
