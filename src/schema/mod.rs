//! Column type inference for BigQuery-style schemas.

mod writer;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::config::GeoColumns;

pub use writer::{SchemaFiles, write_schema_files};

/// Running classification of a property column.
///
/// The merge is the join of the lattice
/// `Unknown < {Boolean, Integer < Float} < Conflict < String`, so the result
/// does not depend on the order values arrive in. `Conflict` marks booleans
/// mixed with numbers and is written out as UNKNOWN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InferredType {
    #[default]
    Unknown,
    Boolean,
    Integer,
    Float,
    Conflict,
    String,
}

impl InferredType {
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::Null => InferredType::Unknown,
            Value::Bool(_) => InferredType::Boolean,
            Value::Number(n) if is_integer_literal(&n.to_string()) => InferredType::Integer,
            Value::Number(_) => InferredType::Float,
            Value::String(_) | Value::Array(_) | Value::Object(_) => InferredType::String,
        }
    }

    pub fn merge(self, other: Self) -> Self {
        use InferredType::*;
        match (self, other) {
            (Unknown, t) | (t, Unknown) => t,
            (a, b) if a == b => a,
            (String, _) | (_, String) => String,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Conflict,
        }
    }
}

// Numbers keep their source text, so integers beyond 64 bits stay integers.
fn is_integer_literal(text: &str) -> bool {
    !text.contains(['.', 'e', 'E'])
}

/// Output column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Unknown,
    String,
    Integer,
    Float,
    Boolean,
    Geography,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Unknown => "UNKNOWN",
            ColumnType::String => "STRING",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Geography => "GEOGRAPHY",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InferredType> for ColumnType {
    fn from(value: InferredType) -> Self {
        match value {
            InferredType::Unknown | InferredType::Conflict => ColumnType::Unknown,
            InferredType::Boolean => ColumnType::Boolean,
            InferredType::Integer => ColumnType::Integer,
            InferredType::Float => ColumnType::Float,
            InferredType::String => ColumnType::String,
        }
    }
}

/// Column name -> type, in column order.
pub type Schema = IndexMap<String, ColumnType>;

/// Folds property values into per-column types.
#[derive(Debug, Default)]
pub struct SchemaReducer {
    columns: IndexMap<String, InferredType>,
}

impl SchemaReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, key: &str, value: &Value) {
        let observed = InferredType::classify(value);
        match self.columns.get_mut(key) {
            Some(state) => *state = state.merge(observed),
            None => {
                self.columns.insert(key.to_string(), observed);
            }
        }
    }

    /// Final schema: property columns in first-seen order, then the
    /// geometry-derived columns with their fixed types.
    pub fn finish(self, geo_columns: &GeoColumns) -> Schema {
        let mut schema: Schema = self
            .columns
            .into_iter()
            .map(|(name, inferred)| (name, ColumnType::from(inferred)))
            .collect();
        for (column, name) in geo_columns.iter() {
            schema.insert(name.to_string(), column.column_type());
        }
        schema
    }
}

pub fn unknown_columns(schema: &Schema) -> Vec<&str> {
    schema
        .iter()
        .filter(|(_, column_type)| **column_type == ColumnType::Unknown)
        .map(|(name, _)| name.as_str())
        .collect()
}
