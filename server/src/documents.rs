//! Open-document tracker with incremental content synchronization.
//!
//! Documents are keyed by URI string. The client sends positions as line +
//! UTF-16 code-unit offsets; edits are spliced after converting to byte
//! offsets, clamping anything past the end of the text.

use std::collections::HashMap;

use crate::protocol::{ContentChange, Position};

/// One open document.
#[derive(Debug)]
pub struct Document {
    text: String,
    version: i32,
}

impl Document {
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Line count as editors report it: `"a\n"` has two lines (the second
    /// empty), and the empty document has one.
    #[must_use]
    pub fn line_count(&self) -> u32 {
        self.text.split('\n').count() as u32
    }

    fn apply(&mut self, change: &ContentChange) {
        match change.range {
            Some(range) => {
                let start = byte_offset(&self.text, range.start);
                let end = byte_offset(&self.text, range.end).max(start);
                self.text.replace_range(start..end, &change.text);
            }
            // No range: the client sent the full replacement text.
            None => self.text.clone_from(&change.text),
        }
    }
}

/// All currently open documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: HashMap<String, Document>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, uri: String, version: i32, text: String) {
        self.docs.insert(uri, Document { text, version });
    }

    /// Remove a closed document. Returns whether it was open.
    pub fn close(&mut self, uri: &str) -> bool {
        self.docs.remove(uri).is_some()
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&Document> {
        self.docs.get(uri)
    }

    /// Apply a `didChange` batch in order. Changes for an unknown URI are
    /// dropped (the client raced a close); returns whether the document
    /// was found.
    pub fn apply_changes(&mut self, uri: &str, version: i32, changes: &[ContentChange]) -> bool {
        let Some(doc) = self.docs.get_mut(uri) else {
            return false;
        };
        for change in changes {
            doc.apply(change);
        }
        doc.version = version;
        true
    }

    /// URIs of every open document, for bulk revalidation.
    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        self.docs.keys().cloned().collect()
    }
}

/// Convert an LSP position to a byte offset into `text`.
///
/// Positions past the last line, or past the end of a line, clamp to the
/// nearest valid boundary; offsets always land on a char boundary.
fn byte_offset(text: &str, pos: Position) -> usize {
    let mut line_start = 0usize;
    for _ in 0..pos.line {
        match text[line_start..].find('\n') {
            Some(nl) => line_start += nl + 1,
            None => return text.len(),
        }
    }

    let rest = &text[line_start..];
    let line_end = rest.find('\n').unwrap_or(rest.len());
    let mut units = 0u32;
    for (idx, ch) in rest[..line_end].char_indices() {
        if units >= pos.character {
            return line_start + idx;
        }
        units += ch.len_utf16() as u32;
    }
    line_start + line_end
}
