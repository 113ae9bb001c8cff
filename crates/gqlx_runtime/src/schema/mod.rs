//! Schema model: types, fields, resolvers and the validating builder.
//!
//! A [`Schema`] is immutable once built and is shared behind an `Arc` by
//! every prepared query compiled against it.

pub mod list;
pub mod scalars;

use crate::argument::InputObjectDecodeContext;
use crate::context::Context;
use crate::error::{ArgumentError, FieldError, SchemaError};
use crate::exec::ResolverContext;
use crate::literal::Literal;
use crate::value::{TypedValue, Value};
use gqlx_syntax::OperationType;
use indexmap::IndexMap;
use list::{InputListCreator, ValueListCreator};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// A reference to a type by name, with list and non-null wrappers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NotNil(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    #[must_use]
    pub fn list(self) -> Self {
        Self::List(Box::new(self))
    }

    #[must_use]
    pub fn not_nil(self) -> Self {
        Self::NotNil(Box::new(self))
    }

    /// Returns the innermost type name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NotNil(inner) => inner.name(),
        }
    }

    #[must_use]
    pub fn is_not_nil(&self) -> bool {
        matches!(self, Self::NotNil(_))
    }

    /// Parses GraphQL type notation such as `[Int!]!`.
    ///
    /// Malformed notation is kept as a single name, which `SchemaBuilder::build`
    /// then reports as an unknown type.
    #[must_use]
    pub fn parse(notation: &str) -> Self {
        let notation = notation.trim();
        if let Some(inner) = notation.strip_suffix('!') {
            return Self::parse(inner).not_nil();
        }
        if let Some(inner) = notation
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return Self::parse(inner).list();
        }
        Self::named(notation)
    }
}

impl From<&str> for TypeRef {
    fn from(notation: &str) -> Self {
        Self::parse(notation)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NotNil(inner) => write!(f, "{inner}!"),
        }
    }
}

pub type SimpleResolverFn = dyn Fn(&Value) -> Result<Value, FieldError> + Send + Sync;
pub type ContextResolverFn = dyn Fn(&Context, &Value) -> Result<Value, FieldError> + Send + Sync;
pub type FullResolverFn =
    dyn Fn(&ResolverContext<'_>, &Value) -> Result<Value, FieldError> + Send + Sync;

/// How a field produces its value from the parent value.
#[derive(Clone, Default)]
pub enum Resolver {
    /// Reads the property named after the field from a map parent.
    #[default]
    Property,
    Simple(Arc<SimpleResolverFn>),
    Context(Arc<ContextResolverFn>),
    /// Receives the resolver context, which exposes the field's arguments.
    Full(Arc<FullResolverFn>),
}

impl Resolver {
    pub fn simple<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        Self::Simple(Arc::new(f))
    }

    pub fn context<F>(f: F) -> Self
    where
        F: Fn(&Context, &Value) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        Self::Context(Arc::new(f))
    }

    pub fn full<F>(f: F) -> Self
    where
        F: Fn(&ResolverContext<'_>, &Value) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        Self::Full(Arc::new(f))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Property => "Property",
            Self::Simple(_) => "Simple",
            Self::Context(_) => "Context",
            Self::Full(_) => "Full",
        })
    }
}

/// A directive applied to a schema element.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDirective {
    pub name: String,
    pub arguments: IndexMap<String, Literal>,
}

impl AppliedDirective {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

/// An argument accepted by a field.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDef {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Literal>,
    pub description: Option<String>,
}

impl ArgumentDef {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Literal>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A field of an object or interface type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, ArgumentDef>,
    pub resolver: Resolver,
    /// The resolver never panics, so it is called without a recovery boundary.
    pub safe: bool,
    pub description: Option<String>,
    pub deprecation: Option<String>,
    pub directives: Vec<AppliedDirective>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            arguments: IndexMap::new(),
            resolver: Resolver::Property,
            safe: false,
            description: None,
            deprecation: None,
            directives: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets a simple resolver.
    #[must_use]
    pub fn resolve<F>(self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        self.with_resolver(Resolver::simple(f))
    }

    /// Sets a context resolver.
    #[must_use]
    pub fn resolve_with_context<F>(self, f: F) -> Self
    where
        F: Fn(&Context, &Value) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        self.with_resolver(Resolver::context(f))
    }

    /// Sets a full resolver.
    #[must_use]
    pub fn resolve_full<F>(self, f: F) -> Self
    where
        F: Fn(&ResolverContext<'_>, &Value) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        self.with_resolver(Resolver::full(f))
    }

    #[must_use]
    pub fn with_argument(mut self, argument: ArgumentDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    /// Marks the resolver as unable to panic.
    #[must_use]
    pub fn safe(mut self) -> Self {
        self.safe = true;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_directive(mut self, directive: AppliedDirective) -> Self {
        self.directives.push(directive);
        self
    }
}

/// Maps a value of an abstract type to its unwrapped value and concrete type name.
pub type Discriminator = Arc<dyn Fn(&Value) -> Result<(Value, String), FieldError> + Send + Sync>;

/// The default discriminator.
///
/// Reads the `__typename` entry of a map, or unwraps a value built with
/// [`Value::typed`].
pub fn default_discriminator(value: &Value) -> Result<(Value, String), FieldError> {
    if let Some(name) = value.get("__typename").and_then(Value::as_str) {
        return Ok((value.clone(), name.to_string()));
    }
    if let Some(typed) = value.downcast_ref::<TypedValue>() {
        return Ok((typed.value.clone(), typed.type_name.clone()));
    }
    Err(FieldError::type_error(format!(
        "cannot determine the concrete type of a {} value",
        value.kind_name()
    )))
}

/// An object type.
#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub fields: IndexMap<String, Arc<FieldDef>>,
    pub interfaces: Vec<String>,
    pub description: Option<String>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            interfaces: Vec::new(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), Arc::new(field));
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Arc<FieldDef>> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn implements_interface(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}

/// An interface type.
#[derive(Clone)]
pub struct InterfaceType {
    pub name: String,
    pub fields: IndexMap<String, Arc<FieldDef>>,
    pub discriminator: Discriminator,
    /// Object types implementing this interface, filled in by the builder.
    pub implementers: Vec<String>,
    pub description: Option<String>,
}

impl InterfaceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            discriminator: Arc::new(default_discriminator),
            implementers: Vec::new(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), Arc::new(field));
        self
    }

    #[must_use]
    pub fn with_discriminator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(Value, String), FieldError> + Send + Sync + 'static,
    {
        self.discriminator = Arc::new(f);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceType")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("implementers", &self.implementers)
            .finish_non_exhaustive()
    }
}

/// A union type.
#[derive(Clone)]
pub struct UnionType {
    pub name: String,
    pub members: Vec<String>,
    pub discriminator: Discriminator,
    pub description: Option<String>,
}

impl UnionType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            discriminator: Arc::new(default_discriminator),
            description: None,
        }
    }

    #[must_use]
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.members.push(member.into());
        self
    }

    #[must_use]
    pub fn with_discriminator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(Value, String), FieldError> + Send + Sync + 'static,
    {
        self.discriminator = Arc::new(f);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionType")
            .field("name", &self.name)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

pub type EncodeFn = dyn Fn(&Value) -> Result<Literal, FieldError> + Send + Sync;
pub type DecodeFn = dyn Fn(&Literal) -> Result<Value, ArgumentError> + Send + Sync;

/// A scalar type.
#[derive(Clone)]
pub struct ScalarType {
    pub name: String,
    pub description: Option<String>,
    encode: Arc<EncodeFn>,
    decode: Arc<DecodeFn>,
    list_creator: Arc<dyn InputListCreator>,
}

impl ScalarType {
    pub fn new<E, D>(name: impl Into<String>, encode: E, decode: D) -> Self
    where
        E: Fn(&Value) -> Result<Literal, FieldError> + Send + Sync + 'static,
        D: Fn(&Literal) -> Result<Value, ArgumentError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            encode: Arc::new(encode),
            decode: Arc::new(decode),
            list_creator: Arc::new(ValueListCreator),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_list_creator(mut self, creator: Arc<dyn InputListCreator>) -> Self {
        self.list_creator = creator;
        self
    }

    /// Converts a runtime value into its output literal.
    pub fn encode(&self, value: &Value) -> Result<Literal, FieldError> {
        (self.encode)(value)
    }

    /// Converts an input literal into a runtime value.
    pub fn decode(&self, literal: &Literal) -> Result<Value, ArgumentError> {
        (self.decode)(literal)
    }

    #[must_use]
    pub fn list_creator(&self) -> &Arc<dyn InputListCreator> {
        &self.list_creator
    }
}

impl fmt::Debug for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarType")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A value of an enum type.
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub name: String,
    /// The runtime value the name stands for.
    pub value: Value,
    pub description: Option<String>,
    pub deprecation: Option<String>,
}

impl EnumValue {
    /// Creates an enum value whose runtime value is its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            value: Value::String(name.clone()),
            name,
            description: None,
            deprecation: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    #[must_use]
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation = Some(reason.into());
        self
    }
}

/// An enum type.
#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub values: IndexMap<String, EnumValue>,
    pub description: Option<String>,
}

impl EnumType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: IndexMap::new(),
            description: None,
        }
    }

    /// Adds a value whose runtime value is its name.
    #[must_use]
    pub fn with_value(self, name: impl Into<String>) -> Self {
        self.with_enum_value(EnumValue::new(name))
    }

    #[must_use]
    pub fn with_enum_value(mut self, value: EnumValue) -> Self {
        self.values.insert(value.name.clone(), value);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Converts a runtime value into the name of the matching enum value.
    pub fn encode(&self, value: &Value) -> Result<Literal, FieldError> {
        if let Some(found) = self.values.values().find(|v| &v.value == value) {
            return Ok(Literal::String(found.name.clone()));
        }
        match value {
            Value::String(name) if self.values.contains_key(name) => {
                Ok(Literal::String(name.clone()))
            }
            _ => Err(FieldError::type_error(format!(
                "enum \"{}\" cannot represent {value:?}",
                self.name
            ))),
        }
    }

    /// Converts an enum value name into its runtime value.
    pub fn decode(&self, literal: &Literal) -> Result<Value, ArgumentError> {
        match literal {
            Literal::String(name) => self
                .values
                .get(name)
                .map(|v| v.value.clone())
                .ok_or_else(|| ArgumentError::UnknownEnumValue {
                    type_name: self.name.clone(),
                    value: name.clone(),
                }),
            _ => Err(ArgumentError::invalid(&self.name, literal)),
        }
    }
}

/// A field of an input object type.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Literal>,
    pub description: Option<String>,
}

impl InputFieldDef {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Literal>) -> Self {
        self.default = Some(default.into());
        self
    }
}

pub type InputDecodeFn =
    dyn Fn(&mut InputObjectDecodeContext<'_>) -> Result<Value, ArgumentError> + Send + Sync;
pub type InputValidatorFn = dyn Fn(&Value) -> Result<(), ArgumentError> + Send + Sync;

/// An input object type.
#[derive(Clone)]
pub struct InputObjectType {
    pub name: String,
    pub fields: IndexMap<String, InputFieldDef>,
    pub description: Option<String>,
    decode: Option<Arc<InputDecodeFn>>,
    validator: Option<Arc<InputValidatorFn>>,
    list_creator: Arc<dyn InputListCreator>,
}

impl InputObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            description: None,
            decode: None,
            validator: None,
            list_creator: Arc::new(ValueListCreator),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: InputFieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Replaces the default decode, which builds a map of the supplied fields.
    #[must_use]
    pub fn with_decode<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut InputObjectDecodeContext<'_>) -> Result<Value, ArgumentError>
            + Send
            + Sync
            + 'static,
    {
        self.decode = Some(Arc::new(f));
        self
    }

    /// Runs after decoding; an error rejects the input.
    #[must_use]
    pub fn with_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), ArgumentError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_list_creator(mut self, creator: Arc<dyn InputListCreator>) -> Self {
        self.list_creator = creator;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub(crate) fn custom_decode(&self) -> Option<&Arc<InputDecodeFn>> {
        self.decode.as_ref()
    }

    pub(crate) fn validator(&self) -> Option<&Arc<InputValidatorFn>> {
        self.validator.as_ref()
    }

    #[must_use]
    pub fn list_creator(&self) -> &Arc<dyn InputListCreator> {
        &self.list_creator
    }
}

impl fmt::Debug for InputObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputObjectType")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// A named type of the schema.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Scalar(Arc<ScalarType>),
    Enum(Arc<EnumType>),
    Object(Arc<ObjectType>),
    Interface(Arc<InterfaceType>),
    Union(Arc<UnionType>),
    InputObject(Arc<InputObjectType>),
}

impl TypeDef {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(t) => &t.name,
            Self::Enum(t) => &t.name,
            Self::Object(t) => &t.name,
            Self::Interface(t) => &t.name,
            Self::Union(t) => &t.name,
            Self::InputObject(t) => &t.name,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Enum(_) => "enum",
            Self::Object(_) => "object",
            Self::Interface(_) => "interface",
            Self::Union(_) => "union",
            Self::InputObject(_) => "input object",
        }
    }

    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_) | Self::InputObject(_))
    }

    #[must_use]
    pub fn is_output(&self) -> bool {
        !matches!(self, Self::InputObject(_))
    }

    /// Returns true for objects, interfaces and unions.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Interface(_) | Self::Union(_))
    }
}

/// A validated, immutable schema.
#[derive(Debug)]
pub struct Schema {
    types: IndexMap<String, TypeDef>,
    query: Arc<ObjectType>,
    mutation: Option<Arc<ObjectType>>,
    subscription: Option<Arc<ObjectType>>,
}

impl Schema {
    /// Starts building a schema whose query root is `query`.
    pub fn builder(query: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(query)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    #[must_use]
    pub fn object(&self, name: &str) -> Option<&Arc<ObjectType>> {
        match self.types.get(name) {
            Some(TypeDef::Object(object)) => Some(object),
            _ => None,
        }
    }

    #[must_use]
    pub fn query_type(&self) -> &Arc<ObjectType> {
        &self.query
    }

    #[must_use]
    pub fn mutation_type(&self) -> Option<&Arc<ObjectType>> {
        self.mutation.as_ref()
    }

    #[must_use]
    pub fn subscription_type(&self) -> Option<&Arc<ObjectType>> {
        self.subscription.as_ref()
    }

    /// Returns the root type for an operation type, if the schema has one.
    #[must_use]
    pub fn root_type(&self, operation: OperationType) -> Option<&Arc<ObjectType>> {
        match operation {
            OperationType::Query => Some(&self.query),
            OperationType::Mutation => self.mutation.as_ref(),
            OperationType::Subscription => self.subscription.as_ref(),
        }
    }

    /// Returns the object types a value of type `name` can have at runtime.
    #[must_use]
    pub fn possible_types(&self, name: &str) -> Vec<&str> {
        match self.types.get(name) {
            Some(TypeDef::Object(object)) => vec![object.name.as_str()],
            Some(TypeDef::Interface(interface)) => {
                interface.implementers.iter().map(String::as_str).collect()
            }
            Some(TypeDef::Union(union)) => union.members.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true if some object type is a possible type of both `a` and `b`.
    #[must_use]
    pub fn types_overlap(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let b_types = self.possible_types(b);
        self.possible_types(a).iter().any(|t| b_types.contains(t))
    }
}

/// Builds and validates a [`Schema`].
///
/// The built-in scalars are pre-registered; registering a scalar with the
/// same name replaces the built-in.
pub struct SchemaBuilder {
    types: IndexMap<String, TypeDef>,
    user_defined: FxHashSet<String>,
    duplicates: Vec<String>,
    query: String,
    mutation: Option<String>,
    subscription: Option<String>,
}

impl SchemaBuilder {
    pub fn new(query: impl Into<String>) -> Self {
        let types = scalars::builtins()
            .into_iter()
            .map(|scalar| (scalar.name.clone(), TypeDef::Scalar(Arc::new(scalar))))
            .collect();
        Self {
            types,
            user_defined: FxHashSet::default(),
            duplicates: Vec::new(),
            query: query.into(),
            mutation: None,
            subscription: None,
        }
    }

    #[must_use]
    pub fn mutation(mut self, name: impl Into<String>) -> Self {
        self.mutation = Some(name.into());
        self
    }

    #[must_use]
    pub fn subscription(mut self, name: impl Into<String>) -> Self {
        self.subscription = Some(name.into());
        self
    }

    fn register(mut self, ty: TypeDef) -> Self {
        let name = ty.name().to_string();
        if !self.user_defined.insert(name.clone()) {
            self.duplicates.push(name.clone());
        }
        self.types.insert(name, ty);
        self
    }

    #[must_use]
    pub fn object(self, object: ObjectType) -> Self {
        self.register(TypeDef::Object(Arc::new(object)))
    }

    #[must_use]
    pub fn interface(self, interface: InterfaceType) -> Self {
        self.register(TypeDef::Interface(Arc::new(interface)))
    }

    #[must_use]
    pub fn union(self, union: UnionType) -> Self {
        self.register(TypeDef::Union(Arc::new(union)))
    }

    #[must_use]
    pub fn scalar(self, scalar: ScalarType) -> Self {
        self.register(TypeDef::Scalar(Arc::new(scalar)))
    }

    #[must_use]
    pub fn enumeration(self, enumeration: EnumType) -> Self {
        self.register(TypeDef::Enum(Arc::new(enumeration)))
    }

    #[must_use]
    pub fn input_object(self, input: InputObjectType) -> Self {
        self.register(TypeDef::InputObject(Arc::new(input)))
    }

    /// Validates every type reference and builds the schema.
    pub fn build(mut self) -> Result<Arc<Schema>, SchemaError> {
        if let Some(name) = self.duplicates.first() {
            return Err(SchemaError::DuplicateType(name.clone()));
        }
        if let Some(name) = self.types.keys().find(|name| name.starts_with("__")) {
            return Err(SchemaError::ReservedName(name.clone()));
        }

        for ty in self.types.values() {
            self.validate_type(ty)?;
        }
        self.link_implementers();

        let query = self.root(&self.query, OperationType::Query)?;
        let mutation = match &self.mutation {
            Some(name) => Some(self.root(name, OperationType::Mutation)?),
            None => None,
        };
        let subscription = match &self.subscription {
            Some(name) => Some(self.root(name, OperationType::Subscription)?),
            None => None,
        };

        tracing::debug!(types = self.types.len(), "schema built");
        Ok(Arc::new(Schema {
            types: self.types,
            query,
            mutation,
            subscription,
        }))
    }

    fn root(&self, name: &str, operation: OperationType) -> Result<Arc<ObjectType>, SchemaError> {
        match self.types.get(name) {
            Some(TypeDef::Object(object)) => Ok(Arc::clone(object)),
            _ => Err(SchemaError::InvalidRootType {
                operation: operation.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn lookup(&self, ty: &TypeRef, referrer: impl FnOnce() -> String) -> Result<&TypeDef, SchemaError> {
        self.types
            .get(ty.name())
            .ok_or_else(|| SchemaError::UnknownType {
                name: ty.name().to_string(),
                referrer: referrer(),
            })
    }

    fn validate_output(&self, owner: &str, field: &FieldDef) -> Result<(), SchemaError> {
        let referrer = || format!("field \"{owner}.{}\"", field.name);
        let target = self.lookup(&field.ty, referrer)?;
        if !target.is_output() {
            return Err(SchemaError::NotAnOutputType {
                name: target.name().to_string(),
                referrer: referrer(),
            });
        }
        for arg in field.arguments.values() {
            let referrer = || format!("argument \"{owner}.{}({})\"", field.name, arg.name);
            let target = self.lookup(&arg.ty, referrer)?;
            if !target.is_input() {
                return Err(SchemaError::NotAnInputType {
                    name: target.name().to_string(),
                    referrer: referrer(),
                });
            }
        }
        Ok(())
    }

    fn validate_type(&self, ty: &TypeDef) -> Result<(), SchemaError> {
        match ty {
            TypeDef::Scalar(_) => Ok(()),
            TypeDef::Enum(enumeration) => {
                if enumeration.values.is_empty() {
                    return Err(SchemaError::EmptyEnum(enumeration.name.clone()));
                }
                Ok(())
            }
            TypeDef::Object(object) => {
                for field in object.fields.values() {
                    self.validate_output(&object.name, field)?;
                }
                for interface_name in &object.interfaces {
                    let Some(TypeDef::Interface(interface)) = self.types.get(interface_name) else {
                        return Err(SchemaError::NotAnInterface {
                            object: object.name.clone(),
                            interface: interface_name.clone(),
                        });
                    };
                    if let Some(missing) = interface
                        .fields
                        .keys()
                        .find(|name| !object.fields.contains_key(*name))
                    {
                        return Err(SchemaError::MissingInterfaceField {
                            object: object.name.clone(),
                            interface: interface.name.clone(),
                            field: missing.clone(),
                        });
                    }
                }
                Ok(())
            }
            TypeDef::Interface(interface) => {
                for field in interface.fields.values() {
                    self.validate_output(&interface.name, field)?;
                }
                Ok(())
            }
            TypeDef::Union(union) => {
                for member in &union.members {
                    match self.types.get(member) {
                        Some(TypeDef::Object(_)) => {}
                        Some(_) => {
                            return Err(SchemaError::InvalidUnionMember {
                                union: union.name.clone(),
                                member: member.clone(),
                            })
                        }
                        None => {
                            return Err(SchemaError::UnknownType {
                                name: member.clone(),
                                referrer: format!("union \"{}\"", union.name),
                            })
                        }
                    }
                }
                Ok(())
            }
            TypeDef::InputObject(input) => {
                for field in input.fields.values() {
                    let referrer = || format!("input field \"{}.{}\"", input.name, field.name);
                    let target = self.lookup(&field.ty, referrer)?;
                    if !target.is_input() {
                        return Err(SchemaError::NotAnInputType {
                            name: target.name().to_string(),
                            referrer: referrer(),
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Records on every interface the objects that implement it.
    fn link_implementers(&mut self) {
        let mut links: Vec<(String, String)> = Vec::new();
        for ty in self.types.values() {
            if let TypeDef::Object(object) = ty {
                for interface in &object.interfaces {
                    links.push((interface.clone(), object.name.clone()));
                }
            }
        }
        for (interface, object) in links {
            if let Some(TypeDef::Interface(def)) = self.types.get_mut(&interface) {
                Arc::make_mut(def).implementers.push(object);
            }
        }
    }
}
