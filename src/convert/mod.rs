//! Per-file and per-directory conversion: normalize, stream rows, write schemas.

use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::config::{ConvertSettings, ErrorPolicy, GeoColumns};
use crate::engine::VectorEngine;
use crate::paths::{
    OUTPUT_EXTENSION, intermediate_path_for, matches_extension, output_path_for, parent_dir,
    resolve_target,
};
use crate::pipeline::RowStreamer;
use crate::schema::{Schema, SchemaFiles, write_schema_files};
use crate::sinks::{NdjsonSink, RowSink};
use crate::utils::ProgressCounter;

#[derive(Debug)]
pub struct Converted {
    pub source: PathBuf,
    pub output: PathBuf,
    pub rows: u64,
    pub schema: Schema,
    pub schema_files: Option<SchemaFiles>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<Converted>,
    pub failed: Vec<(PathBuf, anyhow::Error)>,
}

/// A normalized copy of the source, removed on drop unless kept.
struct Intermediate {
    path: PathBuf,
    keep: bool,
}

impl Drop for Intermediate {
    fn drop(&mut self) {
        if self.keep {
            if self.path.exists() {
                tracing::info!("Keeping GeoJSONSeq file {:?}", self.path);
            }
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("Failed to remove GeoJSONSeq file {:?}: {}", self.path, err);
        }
    }
}

/// Convert one source file.
///
/// `output` is used as given; the caller has already dealt with any
/// existing file there. Without it the output is derived from the source
/// name and resolved with `settings.conflict`.
pub fn convert_file(
    engine: &dyn VectorEngine,
    source: &Path,
    output: Option<&Path>,
    settings: &ConvertSettings,
) -> Result<Converted> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => resolve_target(
            &output_path_for(source, OUTPUT_EXTENSION, settings.output_directory.as_deref()),
            settings.conflict,
        )?,
    };

    let needs_normalizing = !settings.convert_options.is_empty()
        || !engine
            .probe(source)
            .with_context(|| format!("Invalid Source: {:?} could not be opened", source))?
            .is_wgs84_geojsonseq();

    let intermediate = if needs_normalizing {
        let intermediate = Intermediate {
            path: intermediate_path_for(&output),
            keep: settings.keep_intermediate,
        };
        engine.translate(source, &intermediate.path, &settings.convert_options)?;
        Some(intermediate)
    } else {
        tracing::info!("{:?} is already GeoJSONSeq in WGS 84", source);
        None
    };

    let records = intermediate
        .as_ref()
        .map(|intermediate| intermediate.path.as_path())
        .unwrap_or(source);
    let (rows, schema) = write_ndjson(records, &output, &settings.columns)?;
    drop(intermediate);

    let schema_files = if settings.skip_schemas {
        None
    } else {
        Some(write_schema_files(&schema, &output, settings.conflict)?)
    };

    Ok(Converted {
        source: source.to_path_buf(),
        output,
        rows,
        schema,
        schema_files,
    })
}

/// Stream a GeoJSONSeq file into `output`. The output only appears once
/// every record converted.
pub fn write_ndjson(records: &Path, output: &Path, columns: &GeoColumns) -> Result<(u64, Schema)> {
    tracing::info!(
        "Converting GeoJSONSeq file at {:?} to ndjson and saving to {:?}...",
        records,
        output
    );
    let file = File::open(records)
        .with_context(|| format!("Pipeline: Failed to open {:?}", records))?;
    let mut streamer = RowStreamer::new(BufReader::new(file), columns.clone());

    let mut staged = NamedTempFile::new_in(parent_dir(output))
        .with_context(|| format!("Pipeline: Failed to stage output for {:?}", output))?;
    let rows = {
        let mut sink = NdjsonSink::new(&mut staged);
        let mut progress = ProgressCounter::new("Streaming rows", 10_000);
        for row in streamer.by_ref() {
            sink.add_row(row?)?;
            progress.inc(1);
        }
        sink.finish()?;
        progress.finish();
        sink.rows_written()
    };

    staged
        .persist(output)
        .map_err(|err| anyhow!(err.error))
        .with_context(|| format!("Pipeline: Failed to write {:?}", output))?;

    Ok((rows, streamer.into_schema()))
}

/// Files directly inside `directory` with the given extension, by name.
pub fn list_sources(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(directory)
        .with_context(|| format!("Invalid Source: Failed to read directory {:?}", directory))?
    {
        let path = entry?.path();
        if path.is_file() && matches_extension(&path, extension) {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

/// Convert every matching file in `directory`, one after another.
pub fn convert_directory(
    engine: &dyn VectorEngine,
    directory: &Path,
    extension: &str,
    settings: &ConvertSettings,
) -> Result<BatchReport> {
    let sources = list_sources(directory, extension)?;
    let output_directory = settings.output_directory.as_deref().unwrap_or(directory);
    tracing::info!(
        "Converting {} .{} file(s) in {:?} and saving them to {:?}...",
        sources.len(),
        extension.trim_start_matches('.'),
        directory,
        output_directory
    );

    let mut report = BatchReport::default();
    for source in sources {
        match convert_file(engine, &source, None, settings) {
            Ok(converted) => report.converted.push(converted),
            Err(err) => match settings.on_error {
                ErrorPolicy::Abort => {
                    return Err(err.context(format!("Batch: Failed converting {:?}", source)));
                }
                ErrorPolicy::Continue => {
                    tracing::error!("Batch: Failed converting {:?}: {:#}", source, err);
                    report.failed.push((source, err));
                }
            },
        }
    }

    Ok(report)
}
