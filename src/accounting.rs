//! Heuristic logical-line counting.
//!
//! This is not a tokenizer. Comment markers inside string, template or regex
//! literals are treated as real comments, and a line that merely contains a
//! block-comment start (even after code) is not counted.

use crate::error::{Error, Result};
use std::{fs, path::Path};

/// Comment markers recognised by the [`LineAccountant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSyntax {
    /// Marker that starts a whole-line comment
    pub line: &'static str,
    /// Marker that opens a block comment
    pub block_start: &'static str,
    /// Marker that closes a block comment
    pub block_end: &'static str,
}

impl CommentSyntax {
    /// C-family syntax (`//`, `/* */`), used for JavaScript.
    pub const C_STYLE: Self = Self {
        line: "//",
        block_start: "/*",
        block_end: "*/",
    };
}

impl Default for CommentSyntax {
    fn default() -> Self {
        Self::C_STYLE
    }
}

/// Counts logical lines: non-blank lines that are not classified as comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineAccountant {
    syntax: CommentSyntax,
}

impl LineAccountant {
    /// Creates an accountant for the given comment syntax.
    #[must_use]
    pub const fn new(syntax: CommentSyntax) -> Self {
        Self { syntax }
    }

    /// Counts the logical lines in `text`.
    ///
    /// # Algorithm
    ///
    /// 1. Blank lines (after trimming) are skipped
    /// 2. Inside a block comment, lines are skipped up to and including the
    ///    one containing the end marker
    /// 3. Lines containing a block start are skipped and open a block comment,
    ///    unless the same line also contains the end marker (this includes a
    ///    line comment that mentions the block start)
    /// 4. Lines starting with the line-comment marker are skipped
    /// 5. Every other line counts once
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        let mut in_block = false;
        let mut count = 0;

        for line in text.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }

            if in_block {
                if trimmed.contains(self.syntax.block_end) {
                    in_block = false;
                }
                continue;
            }

            if trimmed.contains(self.syntax.block_start) {
                in_block = !trimmed.contains(self.syntax.block_end);
                continue;
            }

            if trimmed.starts_with(self.syntax.line) {
                continue;
            }

            count += 1;
        }

        count
    }

    /// Reads `path` and counts its logical lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read as UTF-8 text.
    pub fn count_file(&self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
        Ok(self.count(&text))
    }
}

/// Counts logical lines in `text` using C-style comment markers.
#[must_use]
pub fn count_logical_lines(text: &str) -> usize {
    LineAccountant::default().count(text)
}
