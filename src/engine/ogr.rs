use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::{DatasetInfo, VectorEngine, probe_geojsonseq};
use crate::options::NORMALIZE_DIRECTIVES;

/// GDAL's command-line programs as the vector engine.
#[derive(Debug, Clone)]
pub struct OgrEngine {
    ogr2ogr: PathBuf,
    ogrinfo: PathBuf,
}

impl OgrEngine {
    pub fn new(ogr2ogr: impl Into<PathBuf>, ogrinfo: impl Into<PathBuf>) -> Self {
        Self {
            ogr2ogr: ogr2ogr.into(),
            ogrinfo: ogrinfo.into(),
        }
    }

    fn run(program: &Path, command: &mut Command) -> Result<Output> {
        tracing::debug!("Engine: running {:?}", command);
        let output = command
            .output()
            .with_context(|| format!("Engine: Failed to run {:?}; is GDAL installed?", program))?;
        if !output.status.success() {
            bail!(
                "Engine: {:?} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

impl VectorEngine for OgrEngine {
    fn probe(&self, path: &Path) -> Result<DatasetInfo> {
        if let Some(info) = probe_geojsonseq(path)? {
            return Ok(info);
        }

        let output = Self::run(
            &self.ogrinfo,
            Command::new(&self.ogrinfo)
                .args(["-json", "-ro", "-so"])
                .arg(path),
        )
        .with_context(|| format!("Engine: Could not open {:?}", path))?;
        parse_ogrinfo_report(&output.stdout)
    }

    fn translate(&self, source: &Path, destination: &Path, options: &[String]) -> Result<()> {
        tracing::info!(
            "Converting {:?} to GeoJSONSeq and saving to {:?}...",
            source,
            destination
        );
        Self::run(
            &self.ogr2ogr,
            Command::new(&self.ogr2ogr)
                .args(NORMALIZE_DIRECTIVES)
                .args(options)
                .arg(destination)
                .arg(source),
        )
        .with_context(|| format!("Engine: Failed to normalize {:?}", source))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct OgrInfoReport {
    #[serde(rename = "driverShortName")]
    driver_short_name: String,
    #[serde(default)]
    layers: Vec<OgrInfoLayer>,
}

#[derive(Debug, Deserialize)]
struct OgrInfoLayer {
    #[serde(default, rename = "geometryFields")]
    geometry_fields: Vec<OgrInfoGeometryField>,
}

#[derive(Debug, Deserialize)]
struct OgrInfoGeometryField {
    #[serde(default, rename = "coordinateSystem")]
    coordinate_system: Option<OgrInfoCrs>,
}

#[derive(Debug, Deserialize)]
struct OgrInfoCrs {
    #[serde(default)]
    wkt: Option<String>,
    #[serde(default)]
    projjson: Option<Value>,
}

impl OgrInfoCrs {
    fn name(&self) -> Option<String> {
        if let Some(name) = self
            .projjson
            .as_ref()
            .and_then(|projjson| projjson.get("name"))
            .and_then(Value::as_str)
        {
            return Some(name.to_string());
        }
        // GEOGCRS["WGS 84",...
        let wkt = self.wkt.as_deref()?;
        let start = wkt.find('"')? + 1;
        let len = wkt[start..].find('"')?;
        Some(wkt[start..start + len].to_string())
    }
}

/// Read driver and first-layer SRS name from `ogrinfo -json` output.
fn parse_ogrinfo_report(stdout: &[u8]) -> Result<DatasetInfo> {
    let report: OgrInfoReport =
        serde_json::from_slice(stdout).context("Engine: Unexpected ogrinfo output")?;
    let srs_name = report
        .layers
        .first()
        .and_then(|layer| layer.geometry_fields.first())
        .and_then(|field| field.coordinate_system.as_ref())
        .and_then(OgrInfoCrs::name);

    Ok(DatasetInfo {
        driver: report.driver_short_name,
        srs_name,
    })
}
