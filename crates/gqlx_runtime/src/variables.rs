//! Request variables.

use crate::error::{ArgumentError, VariablesError};
use crate::literal::Literal;
use crate::schema::TypeRef;
use gqlx_syntax::ast;
use indexmap::IndexMap;

/// Variables supplied with a request, by name.
pub type Variables = IndexMap<String, Literal>;

/// Parses variables from JSON text: an object, `null`, or empty input.
pub fn parse_variables(json: &str) -> Result<Variables, VariablesError> {
    if json.trim().is_empty() {
        return Ok(Variables::new());
    }
    variables_from_json(serde_json::from_str(json)?)
}

/// Converts an already parsed JSON document into variables.
pub fn variables_from_json(json: serde_json::Value) -> Result<Variables, VariablesError> {
    match Literal::from_json(json) {
        Literal::Map(fields) => Ok(fields),
        Literal::Null => Ok(Variables::new()),
        other => Err(VariablesError::NotAnObject(other.kind_name())),
    }
}

/// A variable declared by the operation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VariablePlan {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Literal>,
}

/// Supplied variables seen through the operation's declarations.
pub(crate) struct VariableValues<'a> {
    supplied: Option<&'a Variables>,
    declared: &'a [VariablePlan],
}

impl<'a> VariableValues<'a> {
    pub(crate) fn new(supplied: &'a Variables, declared: &'a [VariablePlan]) -> Self {
        Self {
            supplied: Some(supplied),
            declared,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            supplied: None,
            declared: &[],
        }
    }

    /// Looks up a variable, falling back to its declared default.
    ///
    /// An absent variable of a non-null type without default is an error.
    pub(crate) fn get(&self, name: &str) -> Result<Option<&'a Literal>, ArgumentError> {
        if let Some(value) = self.supplied.and_then(|vars| vars.get(name)) {
            return Ok(Some(value));
        }
        match self.declared.iter().find(|v| v.name == name) {
            Some(VariablePlan {
                default: Some(default),
                ..
            }) => Ok(Some(default)),
            Some(VariablePlan { ty, .. }) if ty.is_not_nil() => {
                Err(ArgumentError::MissingVariable(name.to_string()))
            }
            _ => Ok(None),
        }
    }
}

impl TypeRef {
    /// Converts a type written in a document.
    #[must_use]
    pub fn from_ast(ty: &ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => Self::named(name.value.clone()),
            ast::Type::List(inner, _) => Self::from_ast(inner).list(),
            ast::Type::NonNull(inner, _) => Self::from_ast(inner).not_nil(),
        }
    }
}
