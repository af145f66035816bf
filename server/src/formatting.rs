//! Interpretation of `fmt` output into document edits.
//!
//! The formatter emits the complete reformatted document or nothing at all,
//! so the edit list is whole-document replacement or empty. No diffing.

use crate::protocol::{Position, Range, TextEdit};

/// Build the edit list for a formatting request.
///
/// A whitespace-only document is never formatted, and whitespace-only
/// formatter output means the formatter declined (or had no change). Either
/// way the answer is "no edits".
#[must_use]
pub fn interpret(document_text: &str, output: &str) -> Vec<TextEdit> {
    if document_text.trim().is_empty() || output.trim().is_empty() {
        return Vec::new();
    }

    let line_count = document_text.split('\n').count() as u32;
    vec![TextEdit {
        range: Range::new(Position::new(0, 0), Position::new(line_count, 0)),
        new_text: output.to_string(),
    }]
}
