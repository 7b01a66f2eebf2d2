//! Tokenizer for pass-through option strings.
//!
//! Follows the GDAL option-string rules: tokens are separated by whitespace,
//! double-quoted segments keep their whitespace and lose the quotes, and a
//! backslash inside quotes escapes `"` or `\`. Adjacent bare and quoted
//! segments join into one token (`-nln "my layer"x` -> `my layerx`).

use winnow::ascii::multispace0;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{any, take_while};

type PResult<T> = Result<T, ErrMode<ContextError>>;

fn skip_whitespace<'i>(input: &mut &'i str) -> PResult<&'i str> {
    multispace0.parse_next(input)
}

fn bare_segment<'i>(input: &mut &'i str) -> PResult<&'i str> {
    take_while(1.., |c: char| !c.is_whitespace() && c != '"').parse_next(input)
}

fn quoted_run<'i>(input: &mut &'i str) -> PResult<&'i str> {
    take_while(0.., |c: char| c != '"' && c != '\\').parse_next(input)
}

fn next_char(input: &mut &str) -> PResult<char> {
    any.parse_next(input)
}

fn quoted_segment(input: &mut &str) -> PResult<String> {
    let mut segment = String::new();
    // opening quote
    next_char(input)?;
    loop {
        segment.push_str(quoted_run(input)?);
        match next_char(input) {
            Ok('"') => return Ok(segment),
            Ok(_) => match input.chars().next() {
                Some(escaped @ ('"' | '\\')) => {
                    segment.push(escaped);
                    next_char(input)?;
                }
                _ => segment.push('\\'),
            },
            Err(_) => return Err(ErrMode::Cut(ContextError::new())),
        }
    }
}

fn lex_token(input: &mut &str) -> PResult<String> {
    let mut token = String::new();
    loop {
        match input.chars().next() {
            Some('"') => token.push_str(&quoted_segment(input)?),
            Some(c) if !c.is_whitespace() => token.push_str(bare_segment(input)?),
            _ => return Ok(token),
        }
    }
}

/// Split an option string into arguments.
pub fn tokenize(input: &str) -> Result<Vec<String>, String> {
    let mut remaining = input;
    let mut tokens = Vec::new();

    loop {
        skip_whitespace(&mut remaining)
            .map_err(|e| format!("Lexer error at '{}': {:?}", remaining, e))?;
        if remaining.is_empty() {
            break;
        }
        match lex_token(&mut remaining) {
            Ok(token) => tokens.push(token),
            Err(_) => return Err(format!("unterminated quote in '{}'", input)),
        }
    }

    Ok(tokens)
}
