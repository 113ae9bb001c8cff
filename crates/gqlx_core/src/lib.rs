//! Core utilities for gqlx.
//!
//! This crate provides foundational types used throughout gqlx:
//! - `span`: Source location tracking and line/column mapping
//! - `diagnostics`: Error reporting for the query parser

pub mod diagnostics;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticBag};
pub use span::{LineCol, LineIndex, Span};
