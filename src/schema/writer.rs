use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{Schema, unknown_columns};
use crate::config::ConflictPolicy;
use crate::paths::{resolve_target, schema_paths_for};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFiles {
    pub json: PathBuf,
    pub plaintext: PathBuf,
}

/// `name:TYPE` entries joined by `,\n`, with no trailing separator.
pub fn render_plaintext(schema: &Schema) -> String {
    schema
        .iter()
        .map(|(name, column_type)| format!("{name}:{column_type}"))
        .collect::<Vec<_>>()
        .join(",\n")
}

/// Write `<stem>_SCHEMA.json` and `<stem>_SCHEMA.txt` next to `output`.
pub fn write_schema_files(
    schema: &Schema,
    output: &Path,
    policy: ConflictPolicy,
) -> Result<SchemaFiles> {
    let (json_candidate, text_candidate) = schema_paths_for(output);

    let json_path = resolve_target(&json_candidate, policy)?;
    tracing::info!(
        "Saving schema json file to {:?}. You can use it when creating a BigQuery table programmatically.",
        json_path
    );
    let file = File::create(&json_path)
        .with_context(|| format!("Schema: Failed to create {:?}", json_path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, schema)?;
    writer.flush()?;

    let text_path = resolve_target(&text_candidate, policy)?;
    tracing::info!(
        "Saving plaintext schema file to {:?}. You can use it to copy/paste the schema when creating a table using the BigQuery Console.",
        text_path
    );
    std::fs::write(&text_path, render_plaintext(schema))
        .with_context(|| format!("Schema: Failed to write {:?}", text_path))?;

    warn_unknown_columns(schema);

    Ok(SchemaFiles {
        json: json_path,
        plaintext: text_path,
    })
}

pub fn warn_unknown_columns(schema: &Schema) {
    let unknown = unknown_columns(schema);
    if unknown.is_empty() {
        return;
    }
    tracing::warn!(
        "Schema has one or more columns whose values could not be determined: {}. Edit the schema files and enter the proper datatype(s) before using them.",
        unknown.join(", ")
    );
}
