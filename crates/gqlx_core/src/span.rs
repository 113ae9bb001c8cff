//! Source spans and line/column mapping.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A span in source text, represented as byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: u32,
    /// End byte offset (exclusive).
    pub end: u32,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    #[inline]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Creates an empty span at a position.
    #[must_use]
    #[inline]
    pub const fn empty(pos: u32) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Returns the length of this span in bytes.
    #[must_use]
    #[inline]
    pub const fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns a span that covers both spans.
    #[must_use]
    #[inline]
    pub fn merge(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start as usize..span.end as usize
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        miette::SourceSpan::new(
            miette::SourceOffset::from(span.start as usize),
            (span.end - span.start) as usize,
        )
    }
}

/// A 1-based line and column, as reported in GraphQL error `locations`.
///
/// `0` in either position means the location is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl LineCol {
    /// An unknown location.
    pub const UNKNOWN: Self = Self { line: 0, column: 0 };

    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Returns true when both line and column are known.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.line > 0 && self.column > 0
    }
}

impl std::fmt::Display for LineCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets of a source text to line/column pairs.
///
/// Columns count characters, not bytes, so multi-byte text before a token
/// does not shift the reported column.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    /// Byte offset at which every line starts. Always begins with `0`.
    line_starts: Vec<u32>,
}

impl<'a> LineIndex<'a> {
    /// Builds the index for `source`.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        let bytes = source.as_bytes();
        for pos in memchr::memchr2_iter(b'\n', b'\r', bytes) {
            // "\r\n" is a single line terminator.
            if bytes[pos] == b'\r' && bytes.get(pos + 1) == Some(&b'\n') {
                continue;
            }
            line_starts.push((pos + 1) as u32);
        }
        Self {
            source,
            line_starts,
        }
    }

    /// Returns the number of lines in the source.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Returns the 1-based line/column for a byte offset.
    #[must_use]
    pub fn line_col(&self, offset: u32) -> LineCol {
        let offset = offset.min(self.source.len() as u32);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line] as usize;
        let column = self
            .source
            .get(start..offset as usize)
            .map_or(offset as usize - start, |prefix| prefix.chars().count());
        LineCol::new(line as u32 + 1, column as u32 + 1)
    }

    /// Returns the location of the start of a span.
    #[must_use]
    pub fn span_start(&self, span: Span) -> LineCol {
        self.line_col(span.start)
    }
}
