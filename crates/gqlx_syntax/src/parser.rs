//! Recursive descent parser for GraphQL executable documents.

use crate::ast::*;
use crate::lexer::{block_string_value, unescape_string, Lexer};
use crate::token::{Token, TokenKind};
use gqlx_core::{diagnostics::codes, DiagnosticBag, Span};

/// Deepest nesting of selection sets, list and object values, and list
/// types the parser accepts.
pub const MAX_DEPTH: usize = 128;

/// Parser for GraphQL executable documents.
///
/// The parser stops at the first syntax error: the remaining input is not
/// consumed and the partial document is returned together with the diagnostic.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    /// End offset of the previously consumed token.
    prev_end: u32,
    depth: usize,
    diagnostics: DiagnosticBag,
}

/// Result of parsing.
#[derive(Debug)]
pub struct ParseResult {
    pub document: Document,
    pub diagnostics: DiagnosticBag,
}

impl ParseResult {
    /// Returns the document if parsing produced no errors.
    pub fn into_result(self) -> Result<Document, DiagnosticBag> {
        if self.diagnostics.has_errors() {
            Err(self.diagnostics)
        } else {
            Ok(self.document)
        }
    }
}

/// Parses a source string into a document.
pub fn parse(source: &str) -> ParseResult {
    let mut parser = Parser::new(source);
    let document = parser.parse_document();
    ParseResult {
        document,
        diagnostics: parser.diagnostics,
    }
}

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            prev_end: 0,
            depth: 0,
            diagnostics: DiagnosticBag::new(),
        }
    }

    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    #[inline]
    fn failed(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// True when a list production should stop: at `close`, at end of input,
    /// or after an error.
    #[inline]
    fn at_list_end(&self, close: TokenKind) -> bool {
        self.at_kind(close) || self.at_kind(TokenKind::Eof) || self.failed()
    }

    #[inline]
    fn at_keyword(&self, keyword: &str) -> bool {
        self.at_kind(TokenKind::Name) && self.current_text() == keyword
    }

    fn advance(&mut self) {
        self.prev_end = self.current.span.end;
        self.current = self.lexer.next_token();
    }

    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.at_kind(kind) {
            self.advance();
            true
        } else {
            self.error_expected(kind.as_str());
            false
        }
    }

    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>) {
        if !self.failed() {
            self.diagnostics.error(code, message, self.current.span);
        }
    }

    /// Enters one nesting level, or reports that the document is too deep.
    fn descend(&mut self) -> bool {
        if self.depth >= MAX_DEPTH {
            self.error(
                codes::NESTING_TOO_DEEP,
                format!("document is nested more than {MAX_DEPTH} levels deep"),
            );
            return false;
        }
        self.depth += 1;
        true
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn error_expected(&mut self, expected: &str) {
        let found = match self.at() {
            TokenKind::Eof => {
                self.error(codes::UNEXPECTED_EOF, format!("expected {expected}, found <eof>"));
                return;
            }
            TokenKind::Name | TokenKind::Error => format!("\"{}\"", self.current_text()),
            kind => kind.as_str().to_string(),
        };
        self.error(
            codes::UNEXPECTED_TOKEN,
            format!("expected {expected}, found {found}"),
        );
    }

    /// Parses a document.
    pub fn parse_document(&mut self) -> Document {
        let start = self.current.span.start;
        let mut definitions = Vec::new();

        if self.at_kind(TokenKind::Eof) {
            self.error(codes::UNEXPECTED_EOF, "document contains no definitions");
        }

        while !self.at_kind(TokenKind::Eof) && !self.failed() {
            if let Some(def) = self.parse_definition() {
                definitions.push(def);
            }
        }

        Document {
            definitions,
            span: Span::new(start, self.current.span.end),
        }
    }

    fn parse_definition(&mut self) -> Option<Definition> {
        if self.at_kind(TokenKind::LBrace) {
            return Some(Definition::Operation(self.parse_operation()));
        }

        if self.at_kind(TokenKind::Name) {
            match self.current_text() {
                "query" | "mutation" | "subscription" => {
                    return Some(Definition::Operation(self.parse_operation()))
                }
                "fragment" => return Some(Definition::Fragment(self.parse_fragment_definition())),
                "schema" | "type" | "interface" | "union" | "enum" | "input" | "scalar"
                | "directive" | "extend" => {
                    let keyword = self.current_text();
                    self.error(
                        codes::UNSUPPORTED_DEFINITION,
                        format!("type system definition \"{keyword}\" is not allowed in an executable document"),
                    );
                    return None;
                }
                _ => {}
            }
        }

        self.error_expected("definition");
        None
    }

    fn parse_name(&mut self) -> Name {
        if self.at_kind(TokenKind::Name) {
            let name = Name::new(self.current_text(), self.current.span);
            self.advance();
            name
        } else {
            self.error_expected("name");
            Name::new("", self.current.span)
        }
    }

    fn parse_operation(&mut self) -> OperationDefinition {
        let start = self.current.span.start;

        if self.at_kind(TokenKind::LBrace) {
            let selection_set = self.parse_selection_set();
            return OperationDefinition {
                operation: OperationType::Query,
                name: None,
                variables: Vec::new(),
                directives: Vec::new(),
                selection_set,
                span: self.span_from(start),
            };
        }

        let operation = match self.current_text() {
            "mutation" => OperationType::Mutation,
            "subscription" => OperationType::Subscription,
            _ => OperationType::Query,
        };
        self.advance();

        let name = self.at_kind(TokenKind::Name).then(|| self.parse_name());

        let variables = if self.at_kind(TokenKind::LParen) {
            self.advance();
            let vars = self.parse_variable_definitions();
            self.expect(TokenKind::RParen);
            vars
        } else {
            Vec::new()
        };

        let directives = self.parse_directives();
        let selection_set = self.parse_selection_set();

        OperationDefinition {
            operation,
            name,
            variables,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    fn parse_variable_definitions(&mut self) -> Vec<VariableDefinition> {
        let mut vars = Vec::new();
        if self.at_kind(TokenKind::RParen) {
            self.error_expected("variable definition");
        }
        while !self.at_list_end(TokenKind::RParen) {
            vars.push(self.parse_variable_definition());
        }
        vars
    }

    fn parse_variable_definition(&mut self) -> VariableDefinition {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar);
        let name = self.parse_name();
        self.expect(TokenKind::Colon);
        let ty = self.parse_type();

        let default_value = if self.at_kind(TokenKind::Eq) {
            self.advance();
            Some(self.parse_value(true))
        } else {
            None
        };

        let directives = self.parse_directives();

        VariableDefinition {
            name,
            ty,
            default_value,
            directives,
            span: self.span_from(start),
        }
    }

    fn parse_type(&mut self) -> Type {
        let start = self.current.span.start;

        let ty = if self.at_kind(TokenKind::LBracket) {
            if !self.descend() {
                return Type::Named(Name::new("", self.current.span));
            }
            self.advance();
            let inner = self.parse_type();
            self.expect(TokenKind::RBracket);
            self.ascend();
            Type::List(Box::new(inner), self.span_from(start))
        } else {
            Type::Named(self.parse_name())
        };

        if self.at_kind(TokenKind::Bang) {
            self.advance();
            Type::NonNull(Box::new(ty), self.span_from(start))
        } else {
            ty
        }
    }

    fn parse_fragment_definition(&mut self) -> FragmentDefinition {
        let start = self.current.span.start;
        self.advance(); // fragment

        let name = self.parse_name();
        if name.value == "on" {
            self.diagnostics.error(
                codes::INVALID_SYNTAX,
                "a fragment cannot be named \"on\"",
                name.span,
            );
        }
        if !self.at_keyword("on") {
            self.error_expected("\"on\"");
        }
        self.advance();
        let type_condition = self.parse_name();
        let directives = self.parse_directives();
        let selection_set = self.parse_selection_set();

        FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    fn parse_selection_set(&mut self) -> SelectionSet {
        let start = self.current.span.start;
        if !self.descend() {
            return SelectionSet {
                selections: Vec::new(),
                span: Span::empty(start),
            };
        }
        self.expect(TokenKind::LBrace);

        let mut selections = Vec::new();
        if self.at_kind(TokenKind::RBrace) {
            self.error_expected("selection");
        }
        while !self.at_list_end(TokenKind::RBrace) {
            selections.push(self.parse_selection());
        }
        self.expect(TokenKind::RBrace);
        self.ascend();

        SelectionSet {
            selections,
            span: self.span_from(start),
        }
    }

    fn parse_selection(&mut self) -> Selection {
        if !self.at_kind(TokenKind::Spread) {
            return Selection::Field(self.parse_field());
        }

        let start = self.current.span.start;
        self.advance();

        if self.at_keyword("on") {
            self.advance();
            let type_condition = Some(self.parse_name());
            let directives = self.parse_directives();
            let selection_set = self.parse_selection_set();
            Selection::InlineFragment(InlineFragment {
                type_condition,
                directives,
                selection_set,
                span: self.span_from(start),
            })
        } else if self.at_kind(TokenKind::LBrace) || self.at_kind(TokenKind::At) {
            let directives = self.parse_directives();
            let selection_set = self.parse_selection_set();
            Selection::InlineFragment(InlineFragment {
                type_condition: None,
                directives,
                selection_set,
                span: self.span_from(start),
            })
        } else {
            let name = self.parse_name();
            let directives = self.parse_directives();
            Selection::FragmentSpread(FragmentSpread {
                name,
                directives,
                span: self.span_from(start),
            })
        }
    }

    fn parse_field(&mut self) -> Field {
        let start = self.current.span.start;

        let first_name = self.parse_name();
        let (alias, name) = if self.at_kind(TokenKind::Colon) {
            self.advance();
            (Some(first_name), self.parse_name())
        } else {
            (None, first_name)
        };

        let arguments = self.parse_arguments(false);
        let directives = self.parse_directives();

        let selection_set = if self.at_kind(TokenKind::LBrace) {
            self.parse_selection_set()
        } else {
            SelectionSet {
                selections: Vec::new(),
                span: Span::empty(self.prev_end),
            }
        };

        Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    fn parse_directives(&mut self) -> Vec<Directive> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) && !self.failed() {
            let start = self.current.span.start;
            self.advance();
            let name = self.parse_name();
            let arguments = self.parse_arguments(false);
            directives.push(Directive {
                name,
                arguments,
                span: self.span_from(start),
            });
        }
        directives
    }

    fn parse_arguments(&mut self, constant: bool) -> Vec<Argument> {
        if !self.at_kind(TokenKind::LParen) {
            return Vec::new();
        }
        self.advance();

        let mut args = Vec::new();
        if self.at_kind(TokenKind::RParen) {
            self.error_expected("argument");
        }
        while !self.at_list_end(TokenKind::RParen) {
            let start = self.current.span.start;
            let name = self.parse_name();
            self.expect(TokenKind::Colon);
            let value = self.parse_value(constant);
            args.push(Argument {
                name,
                value,
                span: self.span_from(start),
            });
        }
        self.expect(TokenKind::RParen);
        args
    }

    /// Parses a value. Variables are rejected when `constant` is set.
    fn parse_value(&mut self, constant: bool) -> Value {
        let start = self.current.span.start;
        let span = self.current.span;

        match self.at() {
            TokenKind::Dollar if !constant => {
                self.advance();
                Value::Variable(self.parse_name())
            }
            TokenKind::IntLiteral => {
                let text = self.current_text();
                match text.parse::<i64>() {
                    Ok(value) => {
                        self.advance();
                        Value::Int(value, span)
                    }
                    Err(_) => {
                        self.error(
                            codes::INVALID_NUMBER,
                            format!("integer literal {text} is out of range"),
                        );
                        Value::Null(span)
                    }
                }
            }
            TokenKind::FloatLiteral => {
                let text = self.current_text();
                match text.parse::<f64>() {
                    Ok(value) if value.is_finite() => {
                        self.advance();
                        Value::Float(value, span)
                    }
                    _ => {
                        self.error(
                            codes::INVALID_NUMBER,
                            format!("float literal {text} is out of range"),
                        );
                        Value::Null(span)
                    }
                }
            }
            TokenKind::StringLiteral => match unescape_string(self.current_text()) {
                Ok(value) => {
                    self.advance();
                    Value::String(value, span)
                }
                Err(message) => {
                    self.error(codes::INVALID_STRING, message);
                    Value::Null(span)
                }
            },
            TokenKind::BlockStringLiteral => {
                let value = block_string_value(self.current_text());
                self.advance();
                Value::String(value, span)
            }
            TokenKind::LBracket => {
                if !self.descend() {
                    return Value::Null(span);
                }
                self.advance();
                let mut values = Vec::new();
                while !self.at_list_end(TokenKind::RBracket) {
                    values.push(self.parse_value(constant));
                }
                self.expect(TokenKind::RBracket);
                self.ascend();
                Value::List(values, self.span_from(start))
            }
            TokenKind::LBrace => {
                if !self.descend() {
                    return Value::Null(span);
                }
                self.advance();
                let mut fields: Vec<(Name, Value)> = Vec::new();
                while !self.at_list_end(TokenKind::RBrace) {
                    let name = self.parse_name();
                    if fields.iter().any(|(existing, _)| existing.value == name.value) {
                        self.diagnostics.error(
                            codes::INVALID_SYNTAX,
                            format!("duplicate input object field \"{name}\""),
                            name.span,
                        );
                    }
                    self.expect(TokenKind::Colon);
                    let value = self.parse_value(constant);
                    fields.push((name, value));
                }
                self.expect(TokenKind::RBrace);
                self.ascend();
                Value::Object(fields, self.span_from(start))
            }
            TokenKind::Name => {
                let name = self.parse_name();
                match name.value.as_str() {
                    "true" => Value::Boolean(true, name.span),
                    "false" => Value::Boolean(false, name.span),
                    "null" => Value::Null(name.span),
                    _ => Value::Enum(name),
                }
            }
            TokenKind::Error => {
                let text = self.current_text();
                let code = if text.starts_with('"') {
                    codes::INVALID_STRING
                } else {
                    codes::INVALID_NUMBER
                };
                self.error(code, format!("invalid literal {text}"));
                Value::Null(span)
            }
            _ => {
                if constant && self.at_kind(TokenKind::Dollar) {
                    self.error(
                        codes::INVALID_SYNTAX,
                        "variables are not allowed in default values",
                    );
                } else {
                    self.error_expected("value");
                }
                Value::Null(span)
            }
        }
    }
}
