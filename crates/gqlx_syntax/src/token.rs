//! Token kinds and structures for GraphQL executable documents.

use gqlx_core::Span;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of a token.
///
/// Keywords such as `query` or `on` are lexed as [`TokenKind::Name`]; GraphQL
/// allows them as field and argument names, so the parser decides by context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum TokenKind {
    // Special tokens
    Eof,
    Error,

    // Literals
    Name,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    BlockStringLiteral,

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Spread,
    Eq,
    Pipe,
    Amp,
    At,
    Bang,
    Dollar,
}

impl TokenKind {
    #[must_use]
    pub const fn is_punctuation(self) -> bool {
        !matches!(
            self,
            Self::Eof
                | Self::Error
                | Self::Name
                | Self::IntLiteral
                | Self::FloatLiteral
                | Self::StringLiteral
                | Self::BlockStringLiteral
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eof => "<eof>",
            Self::Error => "<error>",
            Self::Name => "<name>",
            Self::IntLiteral => "<int>",
            Self::FloatLiteral => "<float>",
            Self::StringLiteral => "<string>",
            Self::BlockStringLiteral => "<block-string>",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Colon => ":",
            Self::Spread => "...",
            Self::Eq => "=",
            Self::Pipe => "|",
            Self::Amp => "&",
            Self::At => "@",
            Self::Bang => "!",
            Self::Dollar => "$",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token with its kind and span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}
