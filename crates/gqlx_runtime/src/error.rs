//! Error types for schema building, query preparation and execution.

use gqlx_core::LineCol;
use miette::{Diagnostic, SourceSpan};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The category of an error recorded during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required argument was null, or an argument failed to decode.
    Argument,
    /// A resolver returned an error or panicked.
    Resolve,
    /// An awaited value returned an error.
    Async,
    /// A runtime value did not conform to the selected type.
    Type,
    /// A non-null position resolved to null.
    Nullability,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Argument => "ARGUMENT",
            Self::Resolve => "RESOLVE",
            Self::Async => "ASYNC",
            Self::Type => "TYPE",
            Self::Nullability => "NULLABILITY",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced while resolving a field.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct FieldError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FieldError {
    /// Creates a resolve error.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Resolve, message)
    }

    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Argument, message)
    }

    pub fn async_error(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Async, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Type, message)
    }

    /// The error reported when a non-null position holds null.
    #[must_use]
    pub fn not_null() -> Self {
        Self::with_kind(ErrorKind::Nullability, "Not null field was null")
    }

    /// The error reported for work on a cancelled context.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::async_error("context cancelled")
    }

    /// The error reported for work past the context deadline.
    #[must_use]
    pub fn deadline_exceeded() -> Self {
        Self::async_error("context deadline exceeded")
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<ArgumentError> for FieldError {
    fn from(err: ArgumentError) -> Self {
        Self::argument(err.to_string())
    }
}

/// One component of an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// An error as it appears in the `errors` array of a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionError {
    pub message: String,
    pub path: Vec<PathSegment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<LineCol>,
    #[serde(skip)]
    pub kind: ErrorKind,
}

impl ExecutionError {
    /// Creates an error whose path has `depth` slots waiting to be stamped.
    pub(crate) fn at_depth(error: FieldError, location: LineCol, depth: usize) -> Self {
        Self {
            message: error.message,
            path: vec![PathSegment::Index(0); depth],
            locations: if location.is_known() {
                vec![location]
            } else {
                Vec::new()
            },
            kind: error.kind,
        }
    }
}

/// Errors detected while building a schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("type \"{0}\" is defined more than once")]
    DuplicateType(String),

    #[error("unknown type \"{name}\" referenced by {referrer}")]
    UnknownType { name: String, referrer: String },

    #[error("root {operation} type \"{name}\" must be an object type")]
    InvalidRootType { operation: String, name: String },

    #[error("{referrer} must be an output type, but \"{name}\" is an input object")]
    NotAnOutputType { name: String, referrer: String },

    #[error("{referrer} must be an input type, but \"{name}\" is not")]
    NotAnInputType { name: String, referrer: String },

    #[error("type \"{object}\" implements \"{interface}\", which is not an interface")]
    NotAnInterface { object: String, interface: String },

    #[error("type \"{object}\" does not declare field \"{field}\" required by interface \"{interface}\"")]
    MissingInterfaceField {
        object: String,
        interface: String,
        field: String,
    },

    #[error("union \"{union}\" member \"{member}\" must be an object type")]
    InvalidUnionMember { union: String, member: String },

    #[error("enum \"{0}\" must declare at least one value")]
    EmptyEnum(String),

    #[error("\"{0}\" is a reserved name")]
    ReservedName(String),
}

/// The category of a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    UnknownField,
    UnknownArgument,
    UnknownFragment,
    FragmentCycle,
    UnknownType,
    InvalidTypeCondition,
    InvalidSelection,
    FieldConflict,
    InvalidDirective,
    InvalidVariable,
    UnsupportedOperation,
}

impl CompileErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownField => "unknown field",
            Self::UnknownArgument => "unknown argument",
            Self::UnknownFragment => "unknown fragment",
            Self::FragmentCycle => "fragment cycle",
            Self::UnknownType => "unknown type",
            Self::InvalidTypeCondition => "invalid type condition",
            Self::InvalidSelection => "invalid selection",
            Self::FieldConflict => "field conflict",
            Self::InvalidDirective => "invalid directive",
            Self::InvalidVariable => "invalid variable",
            Self::UnsupportedOperation => "unsupported operation",
        }
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural or semantic problem in a query, found while compiling it.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
#[error("{message}")]
#[diagnostic(code(gqlx::compile))]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub location: LineCol,
    #[label("{kind}")]
    pub span: SourceSpan,
}

/// Errors returned by `prepare_query`.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum PrepareError {
    #[error("syntax error: {message}")]
    #[diagnostic(code(gqlx::syntax))]
    Syntax {
        message: String,
        location: LineCol,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("document does not contain any operation")]
    #[diagnostic(code(gqlx::operation))]
    NoOperation,

    #[error("unknown operation \"{0}\"")]
    #[diagnostic(code(gqlx::operation))]
    UnknownOperation(String),

    #[error("operation name is required when the document contains more than one operation")]
    #[diagnostic(code(gqlx::operation))]
    AmbiguousOperation,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),
}

impl PrepareError {
    /// The source location of the error, when it has one.
    #[must_use]
    pub fn location(&self) -> LineCol {
        match self {
            Self::Syntax { location, .. } => *location,
            Self::Compile(err) => err.location,
            _ => LineCol::UNKNOWN,
        }
    }
}

/// Errors produced while coercing an input value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("required value was not supplied")]
    Required,

    #[error("variable \"${0}\" of a non-null type was not supplied")]
    MissingVariable(String),

    #[error("{type_name} cannot represent {found}")]
    InvalidValue { type_name: String, found: String },

    #[error("enum \"{type_name}\" has no value \"{value}\"")]
    UnknownEnumValue { type_name: String, value: String },

    #[error("field \"{field}\" is not defined by input type \"{type_name}\"")]
    UnknownInputField { type_name: String, field: String },

    #[error("{0}")]
    Validation(String),

    #[error("argument \"{name}\": {source}")]
    Argument {
        name: String,
        #[source]
        source: Box<ArgumentError>,
    },

    #[error("field \"{name}\": {source}")]
    InputField {
        name: String,
        #[source]
        source: Box<ArgumentError>,
    },
}

impl ArgumentError {
    pub fn invalid(type_name: impl Into<String>, found: impl fmt::Display) -> Self {
        Self::InvalidValue {
            type_name: type_name.into(),
            found: found.to_string(),
        }
    }

    pub fn for_argument(self, name: &str) -> Self {
        Self::Argument {
            name: name.to_string(),
            source: Box::new(self),
        }
    }

    pub fn for_input_field(self, name: &str) -> Self {
        Self::InputField {
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

/// Errors produced while parsing request variables.
#[derive(Error, Debug)]
pub enum VariablesError {
    #[error("variables must be a JSON object or null, found {0}")]
    NotAnObject(&'static str),

    #[error("invalid variables JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_error_messages_nest() {
        let err = ArgumentError::Required
            .for_input_field("name")
            .for_argument("input");
        assert_eq!(
            err.to_string(),
            "argument \"input\": field \"name\": required value was not supplied"
        );
        let field: FieldError = err.into();
        assert_eq!(field.kind, ErrorKind::Argument);
    }

    #[test]
    fn test_execution_error_serializes_without_unknown_location() {
        let mut err = ExecutionError::at_depth(FieldError::new("boom"), LineCol::UNKNOWN, 2);
        err.path[0] = PathSegment::Key("a".into());
        err.path[1] = PathSegment::Index(3);
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"message":"boom","path":["a",3]}"#
        );

        let err = ExecutionError::at_depth(FieldError::new("x"), LineCol::new(2, 2), 0);
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"message":"x","path":[],"locations":[{"line":2,"column":2}]}"#
        );
    }
}
