//! Source position tracking.
//!
//! Positions are byte-accurate: `offset` is the absolute byte offset into the
//! UTF-8 source, `line` is 1-based and `column` 0-based, matching the spans
//! reported by the syntax tree provider.

use serde::{Deserialize, Serialize};

/// A single position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePoint {
    /// Line number (1-based).
    pub line: usize,
    /// Column number (0-based).
    pub column: usize,
    /// Absolute byte offset.
    pub offset: usize,
}

impl SourcePoint {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// A half-open span between two source points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: SourcePoint,
    pub end: SourcePoint,
}

impl SourceRange {
    pub fn new(start: SourcePoint, end: SourcePoint) -> Self {
        Self { start, end }
    }

    /// Byte length of the spanned text.
    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A source range together with the file it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    pub range: SourceRange,
    pub file: String,
}

impl SourceLocation {
    pub fn new(range: SourceRange, file: impl Into<String>) -> Self {
        Self { range, file: file.into() }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file, self.range.start.line, self.range.start.column
        )
    }
}
