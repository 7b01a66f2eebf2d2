//! Streams GeoJSONSeq records into output rows while inferring the schema.

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value};
use std::io::{BufRead, Lines};

use crate::config::{GeoColumn, GeoColumns};
use crate::schema::{Schema, SchemaReducer};

/// One output line: property columns in source order, then geometry-derived columns.
pub type OutputRow = Map<String, Value>;

/// A feature read from the intermediate file. The whole object is kept for
/// the `geojson` column.
#[derive(Debug, Clone)]
pub struct Record {
    raw: Map<String, Value>,
}

impl Record {
    pub fn parse(line: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(raw) => Ok(Self { raw }),
            other => bail!("expected a JSON object, found {}", kind_of(&other)),
        }
    }

    /// `None` when the member is missing or null.
    pub fn properties(&self) -> Result<Option<&Map<String, Value>>> {
        match self.raw.get("properties") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(properties)) => Ok(Some(properties)),
            Some(other) => bail!("\"properties\" must be an object, found {}", kind_of(other)),
        }
    }

    pub fn geometry(&self) -> Option<&Value> {
        self.raw.get("geometry")
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.raw)?)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Lazy row sequence over a GeoJSONSeq reader.
///
/// Yields one row per record in input order and stops after the first
/// error. Once exhausted, [`RowStreamer::into_schema`] returns the inferred
/// schema.
pub struct RowStreamer<R> {
    lines: Lines<R>,
    columns: GeoColumns,
    reducer: SchemaReducer,
    line_number: usize,
    collision_warned: bool,
    failed: bool,
}

impl<R: BufRead> RowStreamer<R> {
    pub fn new(reader: R, columns: GeoColumns) -> Self {
        Self {
            lines: reader.lines(),
            columns,
            reducer: SchemaReducer::new(),
            line_number: 0,
            collision_warned: false,
            failed: false,
        }
    }

    pub fn into_schema(self) -> Schema {
        self.reducer.finish(&self.columns)
    }

    fn build_row(&mut self, record: &Record) -> Result<OutputRow> {
        let mut row = OutputRow::new();
        if let Some(properties) = record.properties()? {
            for (key, value) in properties {
                self.reducer.observe(key, value);
                row.insert(key.clone(), value.clone());
            }
        }

        for (column, name) in self.columns.iter() {
            let value = match column {
                GeoColumn::Geojson => Value::String(record.to_json()?),
                GeoColumn::Geometry | GeoColumn::GeojsonGeometry => match record.geometry() {
                    None => bail!(
                        "record has no \"geometry\" member but the \"{}\" column is configured",
                        column.key()
                    ),
                    Some(Value::Null) => Value::Null,
                    Some(geometry) => Value::String(serde_json::to_string(geometry)?),
                },
            };
            if !self.collision_warned && row.contains_key(name) {
                tracing::warn!(
                    "Column \"{}\" holds the {} column and replaces the property of the same name",
                    name,
                    column.key()
                );
                self.collision_warned = true;
            }
            row.insert(name.to_string(), value);
        }

        Ok(row)
    }
}

impl<R: BufRead> Iterator for RowStreamer<R> {
    type Item = Result<OutputRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(anyhow!(err).context(format!(
                        "Pipeline: Failed reading line {}",
                        self.line_number + 1
                    ))));
                }
            };
            self.line_number += 1;

            let text = line.trim_start_matches('\u{1e}').trim();
            if text.is_empty() {
                continue;
            }

            let line_number = self.line_number;
            let result = Record::parse(text)
                .and_then(|record| self.build_row(&record))
                .with_context(|| format!("Pipeline: Malformed record at line {}", line_number));
            if result.is_err() {
                self.failed = true;
            }
            return Some(result);
        }
    }
}
