//! Interpretation of `analyze` output into diagnostics.
//!
//! The compiler reports at most one error per run: free text with zero,
//! one, or two 1-based `[line:col]` tokens and a trailing colon-delimited
//! message. Whitespace-only output means the document is clean. That
//! single-diagnostic contract is part of the compiler's interface; this
//! module never fabricates more.

use std::sync::LazyLock;

use regex::Regex;

use crate::protocol::{Diagnostic, Position, Range, SEVERITY_ERROR};

/// Source tag attached to every published diagnostic.
pub const SOURCE: &str = "quillc";

static SPAN_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+):(\d+)\]").expect("span token pattern is valid"));

/// Interpret captured `analyze` output into zero or one diagnostics.
#[must_use]
pub fn interpret(output: &str) -> Vec<Diagnostic> {
    if output.trim().is_empty() {
        return Vec::new();
    }
    vec![Diagnostic {
        range: error_range(output),
        severity: SEVERITY_ERROR,
        source: SOURCE,
        message: error_message(output).to_string(),
    }]
}

/// The text after the last `:`, or the whole output when there is none.
/// Leading whitespace is preserved as the compiler wrote it.
fn error_message(output: &str) -> &str {
    output.rsplit(':').next().unwrap_or(output)
}

/// Range from the bracketed tokens, converted from 1-based to 0-based.
///
/// No token → zero-width range at the document start. One token → a
/// zero-width range at that position. Two tokens → start and end in the
/// order they appear; the compiler's ordering is trusted, not validated.
fn error_range(output: &str) -> Range {
    let mut tokens = SPAN_TOKEN.captures_iter(output).filter_map(|caps| {
        let line: u32 = caps[1].parse().ok()?;
        let col: u32 = caps[2].parse().ok()?;
        Some(Position::new(line.saturating_sub(1), col.saturating_sub(1)))
    });

    match (tokens.next(), tokens.next()) {
        (Some(start), Some(end)) => Range::new(start, end),
        (Some(only), None) => Range::new(only, only),
        (None, _) => Range::new(Position::new(0, 0), Position::new(0, 0)),
    }
}
