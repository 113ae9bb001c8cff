//! Diagnostic reporting for the query parser.

use crate::span::Span;

/// A syntax error found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Error code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Source location.
    pub span: Span,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    pub fn error(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
        }
    }
}

/// A collection of diagnostics.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    /// Creates a new empty diagnostic bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Adds an error diagnostic.
    pub fn error(&mut self, code: &'static str, message: impl Into<String>, span: Span) {
        self.add(Diagnostic::error(code, message, span));
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Returns the first error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.diagnostics.first()
    }
}

/// Diagnostic codes produced by the query parser.
pub mod codes {
    pub const UNEXPECTED_TOKEN: &str = "E0001";
    pub const UNEXPECTED_EOF: &str = "E0002";
    pub const INVALID_SYNTAX: &str = "E0003";
    pub const INVALID_STRING: &str = "E0004";
    pub const INVALID_NUMBER: &str = "E0005";
    pub const UNSUPPORTED_DEFINITION: &str = "E0006";
    pub const NESTING_TOO_DEEP: &str = "E0007";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_bag() {
        let mut bag = DiagnosticBag::new();
        assert!(!bag.has_errors());
        assert!(bag.first_error().is_none());

        bag.error(codes::INVALID_SYNTAX, "first", Span::new(0, 10));
        bag.add(Diagnostic::error(codes::UNEXPECTED_EOF, "second", Span::new(10, 10)));

        assert!(bag.has_errors());
        assert_eq!(bag.error_count(), 2);
        let first = bag.first_error().unwrap();
        assert_eq!((first.code, first.message.as_str()), ("E0003", "first"));
        assert_eq!(
            bag.iter().map(|d| d.span).collect::<Vec<_>>(),
            vec![Span::new(0, 10), Span::new(10, 10)]
        );
    }
}
