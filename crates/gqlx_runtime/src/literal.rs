//! The literal value domain shared by arguments, variables and scalar coercion.

use indexmap::IndexMap;
use std::fmt;

/// Largest magnitude at which every integer is exactly representable as `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A literal input or output value.
///
/// Numbers use a single numeric type; whether a number is an integer is
/// decided by the decoder that consumes it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Literal {
    #[default]
    Null,
    Number(f64),
    String(String),
    Bool(bool),
    Array(Vec<Literal>),
    Map(IndexMap<String, Literal>),
}

impl Literal {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number as an integer when it has no fractional part.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => as_integer(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// A short name for the kind of literal, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Bool(_) => "boolean",
            Self::Array(_) => "list",
            Self::Map(_) => "object",
        }
    }

    /// Converts a JSON document into a literal.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(fields) => Self::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts the literal into a JSON value. Non-finite numbers become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => match as_integer(*n) {
                Some(i) => serde_json::Value::from(i),
                None => serde_json::Number::from_f64(*n)
                    .map_or(serde_json::Value::Null, serde_json::Value::Number),
            },
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// Returns `n` as an integer if it is integral and exactly representable.
#[must_use]
pub(crate) fn as_integer(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        #[allow(clippy::cast_possible_truncation)]
        Some(n as i64)
    } else {
        None
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<Vec<Literal>> for Literal {
    fn from(items: Vec<Literal>) -> Self {
        Self::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_field_order() {
        let lit = Literal::from_json(json!({"b": 1, "a": [true, null, "x"]}));
        let Literal::Map(fields) = &lit else {
            panic!("expected map");
        };
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(fields["b"], Literal::Number(1.0));
        assert_eq!(
            fields["a"],
            Literal::Array(vec![Literal::Bool(true), Literal::Null, "x".into()])
        );
    }

    #[test]
    fn test_integral_numbers_print_without_fraction() {
        assert_eq!(Literal::Number(3.0).to_string(), "3");
        assert_eq!(Literal::Number(-2.5).to_string(), "-2.5");
        assert_eq!(Literal::Number(1e300).to_string(), "1e+300");
        assert_eq!(Literal::Number(f64::NAN).to_string(), "null");
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(Literal::Number(42.0).as_i64(), Some(42));
        assert_eq!(Literal::Number(4.2).as_i64(), None);
        assert_eq!(Literal::String("42".into()).as_i64(), None);
    }
}
