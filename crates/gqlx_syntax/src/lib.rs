//! Syntax layer for gqlx.
//!
//! This crate turns GraphQL executable documents into an AST:
//! - `token`: Token kinds and token structures
//! - `lexer`: Tokenization
//! - `ast`: Operations, fragments, selections and values
//! - `parser`: Recursive descent parser

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse, ParseResult, MAX_DEPTH};
pub use token::{Token, TokenKind};
