//! Host values flowing through resolvers.

use crate::collector::ScalarSink;
use crate::error::FieldError;
use crate::pending::AsyncValue;
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A value produced by a resolver or decoded from an input.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Anything that can be iterated by index.
    List(Arc<dyn ListValue>),
    /// An ordered map. The default field resolver reads properties from it.
    Map(Arc<IndexMap<String, Value>>),
    /// An opaque host object, read back with [`Value::downcast_ref`].
    Object(Arc<dyn Any + Send + Sync>),
    /// A scalar that writes itself straight into the response.
    Scalar(Arc<dyn CollectableScalar>),
    /// Work whose result is awaited later.
    Pending(Arc<dyn AsyncValue>),
}

impl Value {
    /// Wraps a host object.
    pub fn object<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Object(Arc::new(value))
    }

    /// Creates a list of values.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Arc::new(items))
    }

    /// Creates an ordered map.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Wraps a pending computation.
    pub fn pending(value: impl AsyncValue + 'static) -> Self {
        Self::Pending(Arc::new(value))
    }

    /// Tags a value with its concrete object type, for the default
    /// interface and union discriminator.
    pub fn typed(type_name: impl Into<String>, value: Value) -> Self {
        Self::object(TypedValue {
            type_name: type_name.into(),
            value,
        })
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&dyn ListValue> {
        match self {
            Self::List(list) => Some(list.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Reads a property of a map value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Downcasts a host object.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Object(object) => object.downcast_ref(),
            _ => None,
        }
    }

    /// Downcasts a list to its concrete storage, e.g. `Vec<Option<i64>>`.
    #[must_use]
    pub fn downcast_list<T: 'static>(&self) -> Option<&T> {
        self.as_list().and_then(|list| list.as_any().downcast_ref())
    }

    /// Name of the variant, for error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Scalar(_) => "scalar",
            Self::Pending(_) => "pending value",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && (0..a.len()).all(|i| a.get(i) == b.get(i))
            }
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Scalar(a), Self::Scalar(b)) => Arc::ptr_eq(a, b),
            (Self::Pending(a), Self::Pending(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::List(list) => f
                .debug_list()
                .entries((0..list.len()).map(|i| list.get(i)))
                .finish(),
            Self::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Scalar(scalar) => write!(f, "Scalar({scalar:?})"),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self::Map(Arc::new(map))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Index-based access to list elements.
///
/// Implemented for `Vec<Value>` and for the typed vectors built when decoding
/// list arguments, so resolvers can downcast to concrete storage.
pub trait ListValue: Send + Sync + 'static {
    fn len(&self) -> usize;

    /// Returns the element at `index` as a value. Out of range yields null.
    fn get(&self, index: usize) -> Value;

    fn as_any(&self) -> &dyn Any;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ListValue for Vec<Value> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Value {
        self.as_slice().get(index).cloned().unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T> ListValue for Vec<Option<T>>
where
    T: Clone + Into<Value> + Send + Sync + 'static,
{
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Value {
        self.as_slice()
            .get(index)
            .cloned()
            .flatten()
            .map_or(Value::Null, Into::into)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A scalar that serializes itself without going through its type's encoder.
pub trait CollectableScalar: Send + Sync + fmt::Debug {
    fn collect(&self, sink: ScalarSink<'_>) -> Result<(), FieldError>;
}

/// A value tagged with the name of its concrete object type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    pub type_name: String,
    pub value: Value,
}
