use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use crate::config::{
    ConflictPolicy, ConvertSettings, DEFAULT_COLUMNS, ErrorPolicy, GeoColumns, Settings,
    parse_columns_arg,
};
use crate::convert::{BatchReport, convert_directory, convert_file};
use crate::engine::{OgrEngine, VectorEngine};
use crate::options::parse_convert_options;
use crate::paths::{create_missing_directories, fresh_path, parent_dir};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Convert files with simple features data (shp, geojson, etc) to newline delimited JSON files that can be imported into BigQuery, along with schema files for creating the tables.",
    long_about = None
)]
pub struct Cli {
    /// Source file, or directory together with --extension
    pub source: String,

    /// Overwrite existing files instead of appending _01, _02, ... to new names
    #[arg(short = 'f', long)]
    pub force_overwrite: bool,

    /// Keep the intermediate <name>_GeoJSONSeq.geojson files (never overwritten)
    #[arg(short = 'k', long)]
    pub keep_intermediate: bool,

    /// Geographic columns as JSON: ["geometry","geojson","geojson_geometry"] or {"geometry":"name",...}
    #[arg(short = 'c', long)]
    pub columns: Option<String>,

    /// Directory for converted files (ignored with --output-filepath)
    #[arg(short = 'd', long)]
    pub output_directory: Option<PathBuf>,

    /// Extension of the files to convert when the source is a directory
    #[arg(short = 'e', long)]
    pub extension: Option<String>,

    /// Path of the converted file (single source file only)
    #[arg(short = 'o', long)]
    pub output_filepath: Option<PathBuf>,

    /// Create missing output directories and their parents
    #[arg(short = 'p', long)]
    pub create_parents: bool,

    /// Skip generating schema files
    #[arg(short = 's', long)]
    pub skip_schemas: bool,

    /// Extra ogr2ogr options for the normalization step (-f, -of and -t_srs are reserved)
    #[arg(short = 'v', long, allow_hyphen_values = true)]
    pub convert_options: Option<String>,

    /// What a directory run does when a file fails: abort or continue
    #[arg(long)]
    pub on_error: Option<ErrorPolicy>,

    /// YAML settings file with defaults for these options
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// ogr2ogr program
    #[arg(long, env = "GEONDJSON_OGR2OGR")]
    pub ogr2ogr: Option<PathBuf>,

    /// ogrinfo program
    #[arg(long, env = "GEONDJSON_OGRINFO")]
    pub ogrinfo: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,
}

/// The operator's answer when an explicit output file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    UseSuggested,
    Overwrite,
    Exit,
}

pub fn run(cli: &Cli) -> Result<()> {
    let file_settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let engine = OgrEngine::new(
        cli.ogr2ogr
            .clone()
            .or_else(|| file_settings.ogr2ogr.clone())
            .unwrap_or_else(|| PathBuf::from("ogr2ogr")),
        cli.ogrinfo
            .clone()
            .or_else(|| file_settings.ogrinfo.clone())
            .unwrap_or_else(|| PathBuf::from("ogrinfo")),
    );

    let create_parents = cli.create_parents || file_settings.create_parents;
    let source = validate_source(&cli.source, cli.extension.is_some(), &engine)?;
    if cli.output_filepath.is_some() && source.is_dir() {
        bail!(
            "Invalid Option: --output-filepath / -o cannot be used when the source path is a directory. Use --output-directory / -d instead."
        );
    }

    let convert_options = match cli
        .convert_options
        .as_deref()
        .or(file_settings.convert_options.as_deref())
    {
        Some(raw) => parse_convert_options(raw)?,
        None => Vec::new(),
    };

    let output_directory = if cli.output_filepath.is_none() {
        cli.output_directory.clone()
    } else {
        None
    };
    if let Some(directory) = &output_directory {
        validate_output_directory(directory, create_parents)?;
    }

    let output = match &cli.output_filepath {
        Some(path) => Some(resolve_explicit_output(
            path,
            cli.force_overwrite,
            create_parents,
        )?),
        None => None,
    };

    let columns = resolve_columns(cli, &file_settings)?;
    tracing::info!("Geographic columns: {}", describe_columns(&columns));

    let settings = ConvertSettings {
        columns,
        convert_options,
        conflict: if cli.force_overwrite {
            ConflictPolicy::Overwrite
        } else {
            ConflictPolicy::Rename
        },
        keep_intermediate: cli.keep_intermediate || file_settings.keep_intermediate,
        skip_schemas: cli.skip_schemas || file_settings.skip_schemas,
        on_error: cli.on_error.or(file_settings.on_error).unwrap_or_default(),
        output_directory,
    };

    if create_parents {
        if let Some(path) = &output {
            create_missing_directories(path, false)?;
        } else if let Some(directory) = &settings.output_directory {
            create_missing_directories(directory, true)?;
        }
    }

    match &cli.extension {
        Some(extension) => {
            let report = convert_directory(&engine, &source, extension, &settings)?;
            summarize_batch(&report)
        }
        None => {
            let converted = convert_file(&engine, &source, output.as_deref(), &settings)?;
            tracing::info!(
                "Wrote {} rows from {:?} to {:?} ({} columns)",
                converted.rows,
                converted.source,
                converted.output,
                converted.schema.len()
            );
            if let Some(files) = &converted.schema_files {
                tracing::info!("Schema files: {:?}, {:?}", files.json, files.plaintext);
            }
            Ok(())
        }
    }
}

fn resolve_columns(cli: &Cli, file_settings: &Settings) -> Result<GeoColumns> {
    match (&cli.columns, &file_settings.columns) {
        (Some(raw), _) => parse_columns_arg(raw),
        (None, Some(spec)) => spec.resolve(),
        (None, None) => parse_columns_arg(DEFAULT_COLUMNS),
    }
}

fn describe_columns(columns: &GeoColumns) -> String {
    if columns.is_empty() {
        return "none".to_string();
    }
    columns
        .iter()
        .map(|(column, name)| format!("{} -> {}", column.key(), name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn summarize_batch(report: &BatchReport) -> Result<()> {
    let rows: u64 = report.converted.iter().map(|c| c.rows).sum();
    tracing::info!(
        "Converted {} file(s), {} rows in total",
        report.converted.len(),
        rows
    );
    if !report.failed.is_empty() {
        let names: Vec<String> = report
            .failed
            .iter()
            .map(|(path, _)| path.display().to_string())
            .collect();
        bail!(
            "Batch: {} of {} file(s) failed: {}",
            report.failed.len(),
            report.failed.len() + report.converted.len(),
            names.join(", ")
        );
    }
    Ok(())
}

/// Check the source path and return it.
pub fn validate_source(
    source: &str,
    should_be_dir: bool,
    engine: &dyn VectorEngine,
) -> Result<PathBuf> {
    if source.is_empty() {
        bail!("Invalid Source: source cannot be an empty string.");
    }
    let path = PathBuf::from(source);
    if !path.exists() {
        bail!("Invalid Source: \"{}\" does not exist.", source);
    }

    if should_be_dir {
        if path.is_file() {
            bail!(
                "Invalid Option: The --extension / -e option cannot be used when the source path is to a file."
            );
        }
    } else if path.is_dir() {
        bail!(
            "Missing Option: --extension / -e is required when the source path is to a directory."
        );
    } else if let Err(err) = engine.probe(&path) {
        tracing::debug!("Probe failed: {:#}", err);
        bail!(
            "Invalid Source: \"{}\" is not recognized as a supported geofile format by gdal.",
            source
        );
    }

    Ok(path)
}

pub fn validate_output_directory(directory: &Path, create_parents: bool) -> Result<()> {
    if !create_parents && !directory.exists() {
        bail!(
            "Invalid Output Path: \"{}\" does not exist. Use the --create-parents option to create missing directories and their parents during execution.",
            directory.display()
        );
    }
    Ok(())
}

/// Settle where an explicitly requested output file goes.
pub fn resolve_explicit_output(
    path: &Path,
    force_overwrite: bool,
    create_parents: bool,
) -> Result<PathBuf> {
    if !force_overwrite && path.exists() {
        let suggested = fresh_path(path);
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            bail!(
                "Invalid Output File: \"{}\" already exists. Use --force-overwrite / -f to overwrite it.",
                path.display()
            );
        }
        let choice = prompt_conflict(path, &suggested, stdin.lock(), std::io::stderr())?;
        return match choice {
            ConflictChoice::UseSuggested => {
                tracing::info!("Will save output to {:?}", suggested);
                Ok(suggested)
            }
            ConflictChoice::Overwrite => {
                tracing::info!("Will overwrite {:?}", path);
                Ok(path.to_path_buf())
            }
            ConflictChoice::Exit => bail!("Exiting"),
        };
    }

    if !create_parents && !parent_dir(path).exists() {
        bail!(
            "Invalid Output File: Cannot create \"{}\" because its directory does not exist. Use the --create-parents option to create missing directories and their parents during execution.",
            path.display()
        );
    }
    Ok(path.to_path_buf())
}

/// Ask until the answer is 1 (suggested path), 2 (overwrite), 3 or nothing (exit).
pub fn prompt_conflict<R: BufRead, W: Write>(
    path: &Path,
    suggested: &Path,
    mut input: R,
    mut output: W,
) -> Result<ConflictChoice> {
    writeln!(
        output,
        "\nThe output file \"{}\" already exists.\nDo you want to save the converted file to \"{}\" instead?\nNote: use -f / --force-overwrite in the future to overwrite existing files automatically.",
        path.display(),
        suggested.display()
    )?;

    let mut answer = String::new();
    loop {
        writeln!(
            output,
            "\nType \"1\" to use the new file, \"2\" to overwrite the existing file, \"3\" (or nothing) to exit, then press Enter:"
        )?;
        output.flush()?;

        answer.clear();
        let read = input
            .read_line(&mut answer)
            .context("CLI: Failed to read answer")?;
        match answer.trim() {
            "1" => return Ok(ConflictChoice::UseSuggested),
            "2" => return Ok(ConflictChoice::Overwrite),
            "" | "3" => return Ok(ConflictChoice::Exit),
            _ if read == 0 => return Ok(ConflictChoice::Exit),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DatasetInfo;
    use std::io::Cursor;

    struct RejectingEngine;

    impl VectorEngine for RejectingEngine {
        fn probe(&self, path: &Path) -> Result<DatasetInfo> {
            if path.extension().is_some_and(|ext| ext == "shp") {
                return Ok(DatasetInfo {
                    driver: "ESRI Shapefile".to_string(),
                    srs_name: None,
                });
            }
            bail!("not a dataset")
        }

        fn translate(&self, _: &Path, _: &Path, _: &[String]) -> Result<()> {
            unreachable!()
        }
    }

    fn answer(input: &str) -> ConflictChoice {
        let mut shown = Vec::new();
        let choice = prompt_conflict(
            Path::new("out.json"),
            Path::new("out_01.json"),
            Cursor::new(input.to_string()),
            &mut shown,
        )
        .unwrap();
        assert!(String::from_utf8(shown).unwrap().contains("out_01.json"));
        choice
    }

    #[test]
    fn prompt_answers() {
        assert_eq!(answer("1\n"), ConflictChoice::UseSuggested);
        assert_eq!(answer("2\n"), ConflictChoice::Overwrite);
        assert_eq!(answer("3\n"), ConflictChoice::Exit);
        assert_eq!(answer("\n"), ConflictChoice::Exit);
        assert_eq!(answer(""), ConflictChoice::Exit);
        assert_eq!(answer("yes\nmaybe\n2\n"), ConflictChoice::Overwrite);
        assert_eq!(answer("yes"), ConflictChoice::Exit);
    }

    #[test]
    fn source_validation() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("roads.shp");
        let txt = dir.path().join("notes.txt");
        std::fs::write(&shp, "").unwrap();
        std::fs::write(&txt, "").unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let shp_str = shp.to_str().unwrap();

        let err = |source: &str, should_be_dir: bool| -> String {
            validate_source(source, should_be_dir, &RejectingEngine)
                .unwrap_err()
                .to_string()
        };
        assert!(err("", false).contains("empty string"));
        assert!(err(format!("{dir_str}/missing.shp").as_str(), false).contains("does not exist"));
        assert!(err(shp_str, true).starts_with("Invalid Option:"));
        assert!(err(dir_str, false).starts_with("Missing Option:"));
        assert!(err(txt.to_str().unwrap(), false).contains("not recognized"));

        assert_eq!(validate_source(shp_str, false, &RejectingEngine).unwrap(), shp);
        assert!(validate_source(dir_str, true, &RejectingEngine).is_ok());
    }

    #[test]
    fn output_directory_must_exist_unless_created() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(validate_output_directory(dir.path(), false).is_ok());
        assert!(validate_output_directory(&missing, false).is_err());
        assert!(validate_output_directory(&missing, true).is_ok());
    }

    #[test]
    fn explicit_output_checks() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("out.json");
        assert_eq!(resolve_explicit_output(&fresh, false, false).unwrap(), fresh);

        let nested = dir.path().join("a/b/out.json");
        assert!(resolve_explicit_output(&nested, false, false).is_err());
        assert_eq!(resolve_explicit_output(&nested, false, true).unwrap(), nested);

        std::fs::write(&fresh, "").unwrap();
        assert_eq!(resolve_explicit_output(&fresh, true, false).unwrap(), fresh);
    }

    #[test]
    fn columns_precedence() {
        let cli = Cli::parse_from(["geondjson", "x.shp"]);
        let columns = resolve_columns(&cli, &Settings::default()).unwrap();
        assert_eq!(columns, GeoColumns::default());

        let file_settings = Settings {
            columns: Some(crate::config::ColumnsSpec::Keys(vec!["geojson".to_string()])),
            ..Settings::default()
        };
        let columns = resolve_columns(&cli, &file_settings).unwrap();
        assert_eq!(describe_columns(&columns), "geojson -> geojson");

        let cli = Cli::parse_from(["geondjson", "x.shp", "-c", "[]"]);
        let columns = resolve_columns(&cli, &file_settings).unwrap();
        assert_eq!(describe_columns(&columns), "none");
    }

    #[test]
    fn convert_options_accept_leading_hyphens() {
        let cli = Cli::parse_from(["geondjson", "x.shp", "-v", "-nlt PROMOTE_TO_MULTI"]);
        assert_eq!(cli.convert_options.as_deref(), Some("-nlt PROMOTE_TO_MULTI"));
        let cli = Cli::parse_from(["geondjson", "x.shp", "--on-error", "continue"]);
        assert_eq!(cli.on_error, Some(ErrorPolicy::Continue));
    }
}
