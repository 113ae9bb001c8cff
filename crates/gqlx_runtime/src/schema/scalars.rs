//! Built-in scalar types: `Int`, `Float`, `String`, `Boolean` and `ID`.

use super::list::TypedListCreator;
use super::ScalarType;
use crate::error::{ArgumentError, FieldError};
use crate::literal::{as_integer, Literal};
use crate::value::Value;
use std::sync::Arc;

pub const INT: &str = "Int";
pub const FLOAT: &str = "Float";
pub const STRING: &str = "String";
pub const BOOLEAN: &str = "Boolean";
pub const ID: &str = "ID";

/// Returns the built-in scalar types.
pub(crate) fn builtins() -> Vec<ScalarType> {
    vec![int(), float(), string(), boolean(), id()]
}

fn cannot_encode(type_name: &str, value: &Value) -> FieldError {
    FieldError::type_error(format!("{type_name} cannot represent {}", value.kind_name()))
}

/// `Int`: a signed 32-bit integer.
#[must_use]
pub fn int() -> ScalarType {
    ScalarType::new(
        INT,
        |value| {
            let int = match value {
                Value::Int(i) => Some(*i),
                Value::Float(f) => as_integer(*f),
                _ => None,
            };
            match int.and_then(|i| i32::try_from(i).ok()) {
                Some(i) => Ok(Literal::from(i)),
                None => Err(cannot_encode(INT, value)),
            }
        },
        |literal| match literal.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => Ok(Value::Int(i)),
            _ => Err(ArgumentError::invalid(INT, literal)),
        },
    )
    .with_description("A signed 32-bit integer.")
    .with_list_creator(Arc::new(TypedListCreator::<i64>::new(|v| v.as_i64())))
}

/// `Float`: a double-precision number.
#[must_use]
pub fn float() -> ScalarType {
    ScalarType::new(
        FLOAT,
        |value| match value.as_f64() {
            Some(f) if f.is_finite() => Ok(Literal::Number(f)),
            _ => Err(cannot_encode(FLOAT, value)),
        },
        |literal| match literal.as_f64() {
            Some(f) if f.is_finite() => Ok(Value::Float(f)),
            _ => Err(ArgumentError::invalid(FLOAT, literal)),
        },
    )
    .with_description("A double-precision floating point number.")
    .with_list_creator(Arc::new(TypedListCreator::<f64>::new(|v| v.as_f64())))
}

/// `String`: UTF-8 text.
#[must_use]
pub fn string() -> ScalarType {
    ScalarType::new(
        STRING,
        |value| match value {
            Value::String(s) => Ok(Literal::String(s.clone())),
            _ => Err(cannot_encode(STRING, value)),
        },
        |literal| match literal {
            Literal::String(s) => Ok(Value::String(s.clone())),
            _ => Err(ArgumentError::invalid(STRING, literal)),
        },
    )
    .with_description("UTF-8 text.")
    .with_list_creator(Arc::new(TypedListCreator::<String>::new(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
    })))
}

/// `Boolean`: `true` or `false`.
#[must_use]
pub fn boolean() -> ScalarType {
    ScalarType::new(
        BOOLEAN,
        |value| match value {
            Value::Boolean(b) => Ok(Literal::Bool(*b)),
            _ => Err(cannot_encode(BOOLEAN, value)),
        },
        |literal| match literal {
            Literal::Bool(b) => Ok(Value::Boolean(*b)),
            _ => Err(ArgumentError::invalid(BOOLEAN, literal)),
        },
    )
    .with_description("true or false.")
    .with_list_creator(Arc::new(TypedListCreator::<bool>::new(|v| v.as_bool())))
}

/// `ID`: an opaque identifier, serialized as a string.
#[must_use]
pub fn id() -> ScalarType {
    ScalarType::new(
        ID,
        |value| match value {
            Value::String(s) => Ok(Literal::String(s.clone())),
            Value::Int(i) => Ok(Literal::String(i.to_string())),
            _ => Err(cannot_encode(ID, value)),
        },
        |literal| match literal {
            Literal::String(s) => Ok(Value::String(s.clone())),
            Literal::Number(_) => match literal.as_i64() {
                Some(i) => Ok(Value::String(i.to_string())),
                None => Err(ArgumentError::invalid(ID, literal)),
            },
            _ => Err(ArgumentError::invalid(ID, literal)),
        },
    )
    .with_description("A unique identifier.")
    .with_list_creator(Arc::new(TypedListCreator::<String>::new(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(scalar: &ScalarType, literal: Literal) -> Literal {
        let value = scalar.decode(&literal).unwrap();
        scalar.encode(&value).unwrap()
    }

    #[test]
    fn test_scalars_round_trip() {
        let cases = [
            (int(), vec![Literal::Number(0.0), Literal::Number(-7.0), Literal::from(i32::MAX)]),
            (float(), vec![Literal::Number(1.5), Literal::Number(-0.25), Literal::Number(3.0)]),
            (string(), vec![Literal::from(""), Literal::from("héllo")]),
            (boolean(), vec![Literal::Bool(true), Literal::Bool(false)]),
            (id(), vec![Literal::from("abc"), Literal::from("42")]),
        ];
        for (scalar, literals) in cases {
            for literal in literals {
                assert_eq!(round_trip(&scalar, literal.clone()), literal, "{}", scalar.name);
            }
        }
    }

    #[test]
    fn test_id_canonicalizes_numbers_to_strings() {
        assert_eq!(round_trip(&id(), Literal::Number(42.0)), Literal::from("42"));
    }

    #[test]
    fn test_int_range() {
        let int = int();
        assert!(int.decode(&Literal::Number(2_147_483_648.0)).is_err());
        assert!(int.decode(&Literal::Number(1.5)).is_err());
        assert!(int.decode(&Literal::from("1")).is_err());
        assert!(int.encode(&Value::Int(i64::from(i32::MAX) + 1)).is_err());
        assert_eq!(int.encode(&Value::Float(2.0)), Ok(Literal::Number(2.0)));
    }

    #[test]
    fn test_decode_errors_name_the_type() {
        let err = boolean().decode(&Literal::from("yes")).unwrap_err();
        assert_eq!(err.to_string(), "Boolean cannot represent \"yes\"");
    }
}
