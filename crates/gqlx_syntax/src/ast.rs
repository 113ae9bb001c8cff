//! Abstract syntax tree for GraphQL executable documents.

use gqlx_core::Span;

/// A complete document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub definitions: Vec<Definition>,
    pub span: Span,
}

impl Document {
    /// Returns the operations in source order.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Operation(op) => Some(op),
            Definition::Fragment(_) => None,
        })
    }

    /// Returns the fragments in source order.
    pub fn fragments(&self) -> impl Iterator<Item = &FragmentDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Fragment(fragment) => Some(fragment),
            Definition::Operation(_) => None,
        })
    }
}

/// A top-level definition.
#[derive(Debug, Clone)]
pub enum Definition {
    Operation(OperationDefinition),
    Fragment(FragmentDefinition),
}

/// Type of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation definition.
#[derive(Debug, Clone)]
pub struct OperationDefinition {
    pub operation: OperationType,
    pub name: Option<Name>,
    pub variables: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Variable definition.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: Name,
    pub ty: Type,
    pub default_value: Option<Value>,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// Type reference in a variable definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Named type: `User`
    Named(Name),
    /// List type: `[User]`
    List(Box<Type>, Span),
    /// Non-null type: `User!`
    NonNull(Box<Type>, Span),
}

impl Type {
    /// Returns the innermost named type.
    #[must_use]
    pub fn named(&self) -> &Name {
        match self {
            Self::Named(name) => name,
            Self::List(inner, _) | Self::NonNull(inner, _) => inner.named(),
        }
    }

    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Named(name) => name.span,
            Self::List(_, span) | Self::NonNull(_, span) => *span,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => f.write_str(&name.value),
            Self::List(inner, _) => write!(f, "[{inner}]"),
            Self::NonNull(inner, _) => write!(f, "{inner}!"),
        }
    }
}

/// Fragment definition.
#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    pub name: Name,
    pub type_condition: Name,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Directive usage.
#[derive(Debug, Clone)]
pub struct Directive {
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub span: Span,
}

impl Directive {
    /// Looks up an argument by name.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|arg| arg.name.value == name)
    }
}

/// Argument.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: Name,
    pub value: Value,
    pub span: Span,
}

/// Selection set.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
    pub span: Span,
}

impl SelectionSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

/// Selection.
#[derive(Debug, Clone)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

impl Selection {
    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        match self {
            Self::Field(field) => &field.directives,
            Self::FragmentSpread(spread) => &spread.directives,
            Self::InlineFragment(fragment) => &fragment.directives,
        }
    }

    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Field(field) => field.span,
            Self::FragmentSpread(spread) => spread.span,
            Self::InlineFragment(fragment) => fragment.span,
        }
    }
}

/// Field selection.
#[derive(Debug, Clone)]
pub struct Field {
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

impl Field {
    /// The key under which this field appears in the response.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_ref().unwrap_or(&self.name).value.as_str()
    }

    /// Looks up an argument by name.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|arg| arg.name.value == name)
    }
}

/// Fragment spread.
#[derive(Debug, Clone)]
pub struct FragmentSpread {
    pub name: Name,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// Inline fragment.
#[derive(Debug, Clone)]
pub struct InlineFragment {
    pub type_condition: Option<Name>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Input value as written in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(Name),
    Int(i64, Span),
    Float(f64, Span),
    String(String, Span),
    Boolean(bool, Span),
    Null(Span),
    Enum(Name),
    List(Vec<Value>, Span),
    Object(Vec<(Name, Value)>, Span),
}

impl Value {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Variable(name) | Self::Enum(name) => name.span,
            Self::Int(_, span)
            | Self::Float(_, span)
            | Self::String(_, span)
            | Self::Boolean(_, span)
            | Self::Null(span)
            | Self::List(_, span)
            | Self::Object(_, span) => *span,
        }
    }

    /// Returns true if the value contains no variable references.
    #[must_use]
    pub fn is_const(&self) -> bool {
        match self {
            Self::Variable(_) => false,
            Self::List(items, _) => items.iter().all(Value::is_const),
            Self::Object(fields, _) => fields.iter().all(|(_, v)| v.is_const()),
            _ => true,
        }
    }

    /// Visits every variable referenced by this value.
    pub fn for_each_variable(&self, f: &mut impl FnMut(&Name)) {
        match self {
            Self::Variable(name) => f(name),
            Self::List(items, _) => items.iter().for_each(|v| v.for_each_variable(f)),
            Self::Object(fields, _) => fields.iter().for_each(|(_, v)| v.for_each_variable(f)),
            _ => {}
        }
    }
}

/// Name with span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    pub value: String,
    pub span: Span,
}

impl Name {
    pub fn new(value: impl Into<String>, span: Span) -> Self {
        Self {
            value: value.into(),
            span,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}
