//! Pass-through options for the normalization step.

mod lexer;

use anyhow::{Result, anyhow, bail};

pub use lexer::tokenize;

/// Options the normalizer sets itself; callers may not override them.
pub const RESERVED_OPTIONS: [&str; 3] = ["-f", "-of", "-t_srs"];

/// Directive prepended to every normalization: GeoJSONSeq in lon/lat WGS 84.
pub const NORMALIZE_DIRECTIVES: [&str; 4] = ["-f", "GeoJSONSeq", "-t_srs", "CRS:84"];

/// Tokenize `--convert-options` and reject reserved options.
pub fn parse_convert_options(raw: &str) -> Result<Vec<String>> {
    let tokens = tokenize(raw).map_err(|err| {
        anyhow!("Invalid Option: --convert-options / -v could not be parsed: {}", err)
    })?;

    if let Some(reserved) = tokens.iter().find(|token| is_reserved(token)) {
        bail!(
            "Invalid Option: \"{}\" is reserved and cannot be used within --convert-options / -v",
            reserved
        );
    }

    Ok(tokens)
}

fn is_reserved(token: &str) -> bool {
    RESERVED_OPTIONS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(token))
}
