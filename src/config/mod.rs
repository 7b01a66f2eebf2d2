use anyhow::{Context, Result, anyhow, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::schema::ColumnType;

pub const DEFAULT_COLUMNS: &str = r#"{"geometry":"geometry"}"#;

/// Optional YAML settings file. Command-line flags take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub columns: Option<ColumnsSpec>,
    pub convert_options: Option<String>,
    pub keep_intermediate: bool,
    pub skip_schemas: bool,
    pub create_parents: bool,
    pub on_error: Option<ErrorPolicy>,
    pub ogr2ogr: Option<PathBuf>,
    pub ogrinfo: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()
            .with_context(|| format!("Config: Failed to read settings file {:?}", path))?;
        settings
            .try_deserialize()
            .with_context(|| format!("Config: Invalid settings in {:?}", path))
    }
}

/// What to do when a target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Fail,
    Rename,
    Overwrite,
}

/// What a directory batch does when one file fails.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    #[default]
    Abort,
    Continue,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "abort" => Ok(ErrorPolicy::Abort),
            "continue" => Ok(ErrorPolicy::Continue),
            _ => Err(format!("invalid on_error policy: {value}")),
        }
    }
}

/// Resolved, read-only settings shared by every file of a run.
#[derive(Debug, Clone)]
pub struct ConvertSettings {
    pub columns: GeoColumns,
    pub convert_options: Vec<String>,
    pub conflict: ConflictPolicy,
    pub keep_intermediate: bool,
    pub skip_schemas: bool,
    pub on_error: ErrorPolicy,
    pub output_directory: Option<PathBuf>,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            columns: GeoColumns::default(),
            convert_options: Vec::new(),
            conflict: ConflictPolicy::Rename,
            keep_intermediate: false,
            skip_schemas: false,
            on_error: ErrorPolicy::Abort,
            output_directory: None,
        }
    }
}

/// The geometry-derived output columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoColumn {
    /// Geometry as JSON text, loaded as GEOGRAPHY.
    Geometry,
    /// The whole record as GeoJSON text.
    Geojson,
    /// Geometry as GeoJSON text, loaded as STRING.
    GeojsonGeometry,
}

impl GeoColumn {
    pub const ALL: [GeoColumn; 3] = [
        GeoColumn::Geometry,
        GeoColumn::Geojson,
        GeoColumn::GeojsonGeometry,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            GeoColumn::Geometry => "geometry",
            GeoColumn::Geojson => "geojson",
            GeoColumn::GeojsonGeometry => "geojson_geometry",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|column| column.key() == key)
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            GeoColumn::Geometry => ColumnType::Geography,
            GeoColumn::Geojson | GeoColumn::GeojsonGeometry => ColumnType::String,
        }
    }
}

/// Which geometry-derived columns to emit, and under what names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoColumns {
    names: [Option<String>; 3],
}

impl Default for GeoColumns {
    fn default() -> Self {
        Self::none().with(GeoColumn::Geometry, "geometry")
    }
}

impl GeoColumns {
    pub fn none() -> Self {
        Self {
            names: [None, None, None],
        }
    }

    pub fn with(mut self, column: GeoColumn, name: impl Into<String>) -> Self {
        self.names[column as usize] = Some(name.into());
        self
    }

    pub fn name(&self, column: GeoColumn) -> Option<&str> {
        self.names[column as usize].as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.names.iter().all(Option::is_none)
    }

    /// Enabled columns in output order: geometry, geojson, geojson_geometry.
    pub fn iter(&self) -> impl Iterator<Item = (GeoColumn, &str)> {
        GeoColumn::ALL
            .into_iter()
            .filter_map(|column| self.name(column).map(|name| (column, name)))
    }
}

/// Column selection as written by the user: a list of keys or a key -> name map.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum ColumnsSpec {
    Keys(Vec<String>),
    Names(IndexMap<String, String>),
}

impl ColumnsSpec {
    pub fn resolve(&self) -> Result<GeoColumns> {
        let mut columns = GeoColumns::none();
        match self {
            ColumnsSpec::Keys(keys) => {
                if keys.is_empty() {
                    tracing::warn!(
                        "--columns / -c contained an empty JSON array. No geographic columns will be included in the schema."
                    );
                    return Ok(columns);
                }
                for key in keys {
                    match GeoColumn::from_key(key) {
                        Some(column) => columns = columns.with(column, key.as_str()),
                        None => tracing::warn!("Unknown column \"{}\".", key),
                    }
                }
            }
            ColumnsSpec::Names(names) => {
                if names.is_empty() {
                    tracing::warn!(
                        "--columns / -c contained an empty JSON object. No geographic columns will be included in the schema."
                    );
                    return Ok(columns);
                }
                for (key, name) in names {
                    let Some(column) = GeoColumn::from_key(key) else {
                        tracing::warn!("Unknown column \"{}\".", key);
                        continue;
                    };
                    if name.is_empty() {
                        bail!("Invalid Columns: the \"{}\" column cannot be renamed to an empty string", key);
                    }
                    columns = columns.with(column, name.as_str());
                }
            }
        }

        let mut taken: Vec<&str> = Vec::new();
        for (_, name) in columns.iter() {
            if taken.contains(&name) {
                bail!(
                    "Invalid Columns: \"{}\" is used as the name of more than one column",
                    name
                );
            }
            taken.push(name);
        }

        if columns.is_empty() {
            let valid: Vec<&str> = GeoColumn::ALL.iter().map(|c| c.key()).collect();
            bail!(
                "Invalid Columns: All column names given in --columns / -c were invalid. Valid column names are: {}.",
                valid.join(", ")
            );
        }
        Ok(columns)
    }
}

/// Parse the `--columns` argument: a JSON array of keys or a JSON object of key/name pairs.
pub fn parse_columns_arg(raw: &str) -> Result<GeoColumns> {
    if raw.trim().is_empty() {
        tracing::warn!(
            "--columns / -c contained an empty string. No geographic columns will be included in the schema."
        );
        return Ok(GeoColumns::none());
    }

    let value: serde_json::Value = serde_json::from_str(raw).map_err(|err| {
        anyhow!(
            "Invalid Columns: An error occurred when attempting to parse the value for --columns / -c: \"{}\". Make sure you entered valid JSON and have escaped quotation marks.",
            err
        )
    })?;
    let spec: ColumnsSpec = serde_json::from_value(value).map_err(|_| {
        anyhow!(
            "Invalid Columns: --columns / -c must be a JSON array of column keys or a JSON object of key/name pairs"
        )
    })?;
    spec.resolve()
}
