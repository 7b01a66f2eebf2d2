//! Output path generation: derived names, collision suffixes, directories.

use anyhow::{Context, Result, bail};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::ConflictPolicy;

pub const OUTPUT_EXTENSION: &str = "json";
pub const INTERMEDIATE_SUFFIX: &str = "_GeoJSONSeq";
pub const INTERMEDIATE_EXTENSION: &str = "geojson";
pub const SCHEMA_SUFFIX: &str = "_SCHEMA";

/// Return `path` if it may be written, otherwise the first free `<stem>_NN<.ext>`.
///
/// Suffixes start at `_01` and use at least two digits (`_99`, `_100`, ...).
pub fn safe_path(path: &Path, can_overwrite: bool) -> PathBuf {
    if can_overwrite || !path.exists() {
        return path.to_path_buf();
    }
    fresh_path(path)
}

/// First free `<stem>_NN<.ext>` sibling of `path`, never `path` itself.
pub fn fresh_path(path: &Path) -> PathBuf {
    let mut n = 1u32;
    loop {
        let candidate = numbered_path(path, n);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

pub fn numbered_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.file_stem().map(OsString::from).unwrap_or_default();
    name.push(format!("_{n:02}"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Apply a conflict policy to a target path.
pub fn resolve_target(path: &Path, policy: ConflictPolicy) -> Result<PathBuf> {
    match policy {
        ConflictPolicy::Overwrite => Ok(path.to_path_buf()),
        ConflictPolicy::Rename => Ok(safe_path(path, false)),
        ConflictPolicy::Fail => {
            if path.exists() {
                bail!("Invalid Output File: {:?} already exists", path);
            }
            Ok(path.to_path_buf())
        }
    }
}

/// `<output_directory or source dir>/<source stem>.<extension>`
pub fn output_path_for(source: &Path, extension: &str, output_directory: Option<&Path>) -> PathBuf {
    let directory = output_directory
        .or_else(|| source.parent())
        .unwrap_or_else(|| Path::new(""));
    let mut name = source.file_stem().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(extension);
    directory.join(name)
}

/// Sibling path sharing the output's stem: `<dir>/<stem><suffix>.<extension>`.
pub fn sibling_path(output: &Path, suffix: &str, extension: &str) -> PathBuf {
    let mut name = output.file_stem().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    name.push(".");
    name.push(extension);
    output.with_file_name(name)
}

/// Where the normalized GeoJSONSeq copy of a source goes. Never an existing file.
pub fn intermediate_path_for(output: &Path) -> PathBuf {
    safe_path(
        &sibling_path(output, INTERMEDIATE_SUFFIX, INTERMEDIATE_EXTENSION),
        false,
    )
}

/// JSON and plaintext schema paths for an output file.
pub fn schema_paths_for(output: &Path) -> (PathBuf, PathBuf) {
    (
        sibling_path(output, SCHEMA_SUFFIX, "json"),
        sibling_path(output, SCHEMA_SUFFIX, "txt"),
    )
}

/// Extension match ignoring a leading dot and ASCII case.
pub fn matches_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

/// The directory a file path will be written into (`.` for bare file names).
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Create `path` (or its parent when `is_dir` is false) and missing ancestors.
pub fn create_missing_directories(path: &Path, is_dir: bool) -> Result<()> {
    let directory = if is_dir { path } else { parent_dir(path) };
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Error creating missing directories {:?}", directory))
}
