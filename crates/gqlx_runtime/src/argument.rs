//! Argument resolvers: compiled coercion from literals to runtime values.

use crate::error::ArgumentError;
use crate::literal::Literal;
use crate::schema::list::InputListCreator;
use crate::schema::{EnumType, InputObjectType, ScalarType, Schema, TypeDef, TypeRef};
use crate::value::Value;
use crate::variables::VariableValues;
use gqlx_syntax::ast;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::sync::Arc;

/// Decodes a literal of one input type.
pub(crate) enum ArgResolver {
    Scalar(Arc<ScalarType>),
    Enum(Arc<EnumType>),
    /// Index into the query's [`InputTable`]; recursive input types refer
    /// back to their own entry.
    InputObject(usize),
    List {
        element: Box<ArgResolver>,
        creator: Arc<dyn InputListCreator>,
    },
    NotNil(Box<ArgResolver>),
}

impl ArgResolver {
    pub(crate) fn resolve(
        &self,
        table: &InputTable,
        literal: &Literal,
    ) -> Result<Value, ArgumentError> {
        match self {
            Self::NotNil(inner) => {
                if literal.is_null() {
                    return Err(ArgumentError::Required);
                }
                inner.resolve(table, literal)
            }
            _ if literal.is_null() => Ok(Value::Null),
            Self::Scalar(scalar) => scalar.decode(literal),
            Self::Enum(enumeration) => match literal {
                Literal::String(_) => enumeration.decode(literal),
                _ => Err(ArgumentError::invalid(&enumeration.name, literal)),
            },
            Self::InputObject(index) => table.entries[*index].resolve(table, literal),
            Self::List { element, creator } => match literal {
                Literal::Array(items) => {
                    creator.create(items.len(), &mut |i| element.resolve(table, &items[i]))
                }
                single => creator.create(1, &mut |_| element.resolve(table, single)),
            },
        }
    }
}

struct InputFieldResolver {
    name: String,
    resolver: ArgResolver,
    default: Option<Literal>,
}

pub(crate) struct InputObjectResolver {
    ty: Arc<InputObjectType>,
    fields: Vec<InputFieldResolver>,
}

impl InputObjectResolver {
    fn resolve(&self, table: &InputTable, literal: &Literal) -> Result<Value, ArgumentError> {
        let Literal::Map(supplied) = literal else {
            return Err(ArgumentError::invalid(&self.ty.name, literal));
        };
        if let Some(unknown) = supplied.keys().find(|k| !self.ty.fields.contains_key(*k)) {
            return Err(ArgumentError::UnknownInputField {
                type_name: self.ty.name.clone(),
                field: unknown.clone(),
            });
        }

        let mut ctx = InputObjectDecodeContext {
            resolver: self,
            table,
            supplied,
        };
        let value = match self.ty.custom_decode() {
            Some(decode) => decode(&mut ctx)?,
            None => ctx.decode_all()?,
        };
        if let Some(validate) = self.ty.validator() {
            validate(&value)?;
        }
        Ok(value)
    }
}

/// Gives an input object's decode function access to its coerced fields.
pub struct InputObjectDecodeContext<'a> {
    resolver: &'a InputObjectResolver,
    table: &'a InputTable,
    supplied: &'a IndexMap<String, Literal>,
}

impl InputObjectDecodeContext<'_> {
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.resolver.ty.name
    }

    /// Returns true if the input supplied the field, even as null.
    #[must_use]
    pub fn is_supplied(&self, name: &str) -> bool {
        self.supplied.contains_key(name)
    }

    /// Coerces a field, applying its default when it was not supplied.
    pub fn field(&self, name: &str) -> Result<Value, ArgumentError> {
        let field = self
            .resolver
            .fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ArgumentError::UnknownInputField {
                type_name: self.resolver.ty.name.clone(),
                field: name.to_string(),
            })?;
        self.coerce(field)
    }

    fn coerce(&self, field: &InputFieldResolver) -> Result<Value, ArgumentError> {
        let literal = self
            .supplied
            .get(&field.name)
            .or(field.default.as_ref())
            .unwrap_or(&Literal::Null);
        field
            .resolver
            .resolve(self.table, literal)
            .map_err(|e| e.for_input_field(&field.name))
    }

    /// Decodes every supplied or defaulted field into an ordered map.
    pub fn decode_all(&self) -> Result<Value, ArgumentError> {
        let mut map = IndexMap::with_capacity(self.resolver.fields.len());
        for field in &self.resolver.fields {
            let present = self.supplied.contains_key(&field.name) || field.default.is_some();
            let value = self.coerce(field)?;
            if present {
                map.insert(field.name.clone(), value);
            }
        }
        Ok(Value::from(map))
    }
}

/// Input object resolvers of one prepared query, shared by all its arguments.
#[derive(Default)]
pub(crate) struct InputTable {
    entries: Vec<InputObjectResolver>,
    index: FxHashMap<String, usize>,
}

impl InputTable {
    /// Compiles the resolver for an input type reference.
    ///
    /// Fails with a message when the type is unknown or not an input type.
    pub(crate) fn compile(&mut self, schema: &Schema, ty: &TypeRef) -> Result<ArgResolver, String> {
        match ty {
            TypeRef::NotNil(inner) => Ok(ArgResolver::NotNil(Box::new(self.compile(schema, inner)?))),
            TypeRef::List(inner) => Ok(ArgResolver::List {
                element: Box::new(self.compile(schema, inner)?),
                creator: Self::creator(schema, inner)?,
            }),
            TypeRef::Named(name) => match schema.get(name) {
                Some(TypeDef::Scalar(scalar)) => Ok(ArgResolver::Scalar(Arc::clone(scalar))),
                Some(TypeDef::Enum(enumeration)) => Ok(ArgResolver::Enum(Arc::clone(enumeration))),
                Some(TypeDef::InputObject(input)) => self.compile_input(schema, input),
                Some(other) => Err(format!(
                    "\"{name}\" is an {} type, not an input type",
                    other.kind()
                )),
                None => Err(format!("unknown type \"{name}\"")),
            },
        }
    }

    fn compile_input(
        &mut self,
        schema: &Schema,
        input: &Arc<InputObjectType>,
    ) -> Result<ArgResolver, String> {
        if let Some(&index) = self.index.get(&input.name) {
            return Ok(ArgResolver::InputObject(index));
        }

        let index = self.entries.len();
        self.entries.push(InputObjectResolver {
            ty: Arc::clone(input),
            fields: Vec::new(),
        });
        self.index.insert(input.name.clone(), index);

        let mut fields = Vec::with_capacity(input.fields.len());
        for field in input.fields.values() {
            fields.push(InputFieldResolver {
                name: field.name.clone(),
                resolver: self.compile(schema, &field.ty)?,
                default: field.default.clone(),
            });
        }
        self.entries[index].fields = fields;
        Ok(ArgResolver::InputObject(index))
    }

    /// The list creator for lists whose elements have type `element`.
    fn creator(schema: &Schema, element: &TypeRef) -> Result<Arc<dyn InputListCreator>, String> {
        match element {
            TypeRef::NotNil(inner) => Self::creator(schema, inner),
            TypeRef::List(inner) => Ok(Self::creator(schema, inner)?.nested()),
            TypeRef::Named(name) => match schema.get(name) {
                Some(TypeDef::Scalar(scalar)) => Ok(Arc::clone(scalar.list_creator())),
                Some(TypeDef::InputObject(input)) => Ok(Arc::clone(input.list_creator())),
                Some(TypeDef::Enum(_)) => Ok(Arc::new(crate::schema::list::ValueListCreator)),
                Some(other) => Err(format!(
                    "\"{name}\" is an {} type, not an input type",
                    other.kind()
                )),
                None => Err(format!("unknown type \"{name}\"")),
            },
        }
    }
}

/// The value supplied for an argument, as compiled.
#[derive(Debug, Clone)]
pub(crate) enum ArgValue {
    Absent,
    Literal(Literal),
    /// Contains variables, substituted per execution.
    Deferred(ast::Value),
}

/// An argument of a selected field.
pub(crate) struct ArgumentPlan {
    pub name: String,
    pub value: ArgValue,
    pub default: Option<Literal>,
    pub resolver: ArgResolver,
}

impl ArgumentPlan {
    pub(crate) fn resolve(
        &self,
        table: &InputTable,
        variables: &VariableValues<'_>,
    ) -> Result<Value, ArgumentError> {
        let absent = || {
            self.default
                .as_ref()
                .map_or(Cow::Owned(Literal::Null), Cow::Borrowed)
        };
        let literal = match &self.value {
            ArgValue::Absent => absent(),
            ArgValue::Literal(literal) => Cow::Borrowed(literal),
            ArgValue::Deferred(ast::Value::Variable(name)) => {
                match variables.get(name.as_str()) {
                    Ok(Some(literal)) => Cow::Borrowed(literal),
                    Ok(None) => absent(),
                    Err(err) => return Err(err.for_argument(&self.name)),
                }
            }
            ArgValue::Deferred(value) => Cow::Owned(
                literal_from_ast(value, variables).map_err(|e| e.for_argument(&self.name))?,
            ),
        };
        self.resolver
            .resolve(table, &literal)
            .map_err(|e| e.for_argument(&self.name))
    }
}

/// Converts a document value into a literal, substituting variables.
///
/// Variables that were not supplied and have no default become null.
pub(crate) fn literal_from_ast(
    value: &ast::Value,
    variables: &VariableValues<'_>,
) -> Result<Literal, ArgumentError> {
    Ok(match value {
        ast::Value::Variable(name) => variables
            .get(name.as_str())?
            .cloned()
            .unwrap_or_default(),
        ast::Value::Int(i, _) => {
            #[allow(clippy::cast_precision_loss)]
            Literal::Number(*i as f64)
        }
        ast::Value::Float(f, _) => Literal::Number(*f),
        ast::Value::String(s, _) => Literal::String(s.clone()),
        ast::Value::Boolean(b, _) => Literal::Bool(*b),
        ast::Value::Null(_) => Literal::Null,
        ast::Value::Enum(name) => Literal::String(name.value.clone()),
        ast::Value::List(items, _) => Literal::Array(
            items
                .iter()
                .map(|item| literal_from_ast(item, variables))
                .collect::<Result<_, _>>()?,
        ),
        ast::Value::Object(fields, _) => Literal::Map(
            fields
                .iter()
                .map(|(name, value)| Ok((name.value.clone(), literal_from_ast(value, variables)?)))
                .collect::<Result<_, ArgumentError>>()?,
        ),
    })
}

/// Converts a value without variables into a literal.
pub(crate) fn const_literal(value: &ast::Value) -> Literal {
    literal_from_ast(value, &VariableValues::empty()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, InputFieldDef, ObjectType};

    fn schema() -> Arc<Schema> {
        Schema::builder("Query")
            .object(ObjectType::new("Query").with_field(FieldDef::new("x", "Int")))
            .input_object(
                InputObjectType::new("Node")
                    .with_field(InputFieldDef::new("id", "ID!"))
                    .with_field(InputFieldDef::new("weight", "Float").with_default(1.5))
                    .with_field(InputFieldDef::new("children", "[Node!]")),
            )
            .input_object(
                InputObjectType::new("Range")
                    .with_field(InputFieldDef::new("from", "Int!"))
                    .with_field(InputFieldDef::new("to", "Int!"))
                    .with_decode(|ctx| {
                        let from = ctx.field("from")?;
                        let to = ctx.field("to")?;
                        Ok(Value::list(vec![from, to]))
                    })
                    .with_validator(|value| {
                        let list = value.as_list().map(|l| (l.get(0), l.get(1)));
                        match list {
                            Some((Value::Int(a), Value::Int(b))) if a > b => {
                                Err(ArgumentError::Validation("from must not exceed to".into()))
                            }
                            _ => Ok(()),
                        }
                    }),
            )
            .build()
            .unwrap()
    }

    fn resolve(ty: &str, literal: Literal) -> Result<Value, ArgumentError> {
        let schema = schema();
        let mut table = InputTable::default();
        let resolver = table.compile(&schema, &TypeRef::parse(ty)).unwrap();
        resolver.resolve(&table, &literal)
    }

    fn json(value: serde_json::Value) -> Literal {
        Literal::from_json(value)
    }

    #[test]
    fn test_not_nil_rejects_null() {
        assert_eq!(resolve("Int!", Literal::Null), Err(ArgumentError::Required));
        assert_eq!(resolve("Int", Literal::Null), Ok(Value::Null));
    }

    #[test]
    fn test_single_value_is_wrapped_into_list() {
        let value = resolve("[Int]", Literal::Number(3.0)).unwrap();
        assert_eq!(value.downcast_list::<Vec<Option<i64>>>(), Some(&vec![Some(3)]));
    }

    #[test]
    fn test_nested_lists() {
        let value = resolve("[[Int!]]", json(serde_json::json!([[1, 2], null]))).unwrap();
        let outer = value.downcast_list::<Vec<Value>>().unwrap();
        assert_eq!(outer[0].downcast_list::<Vec<Option<i64>>>(), Some(&vec![Some(1), Some(2)]));
        assert_eq!(outer[1], Value::Null);

        let err = resolve("[Int!]", json(serde_json::json!([1, null]))).unwrap_err();
        assert_eq!(err, ArgumentError::Required);
    }

    #[test]
    fn test_recursive_input_object_with_defaults() {
        let value = resolve(
            "Node",
            json(serde_json::json!({"id": "a", "children": [{"id": 7, "weight": 2}]})),
        )
        .unwrap();
        assert_eq!(value.get("id"), Some(&Value::from("a")));
        assert_eq!(value.get("weight"), Some(&Value::Float(1.5)));
        let children = value.get("children").and_then(Value::as_list).unwrap();
        let child = children.get(0);
        assert_eq!(child.get("id"), Some(&Value::from("7")));
        assert_eq!(child.get("weight"), Some(&Value::Float(2.0)));
        assert_eq!(child.get("children"), None);
    }

    #[test]
    fn test_input_object_errors() {
        let err = resolve("Node", json(serde_json::json!({"weight": 1}))).unwrap_err();
        assert_eq!(err.to_string(), "field \"id\": required value was not supplied");

        let err = resolve("Node", json(serde_json::json!({"id": "a", "nope": 1}))).unwrap_err();
        assert!(matches!(err, ArgumentError::UnknownInputField { .. }));

        let err = resolve("Node", Literal::from("a")).unwrap_err();
        assert!(matches!(err, ArgumentError::InvalidValue { .. }));
    }

    #[test]
    fn test_custom_decode_and_validator() {
        let value = resolve("Range", json(serde_json::json!({"from": 1, "to": 4}))).unwrap();
        assert_eq!(value, Value::list(vec![Value::Int(1), Value::Int(4)]));

        let err = resolve("Range", json(serde_json::json!({"from": 5, "to": 4}))).unwrap_err();
        assert_eq!(err, ArgumentError::Validation("from must not exceed to".into()));
    }

    #[test]
    fn test_output_types_are_not_inputs() {
        let schema = schema();
        let mut table = InputTable::default();
        let err = table
            .compile(&schema, &TypeRef::named("Query"))
            .err()
            .unwrap();
        assert_eq!(err, "\"Query\" is an object type, not an input type");
    }
}
