//! Factories that materialize decoded list arguments.
//!
//! Every input type carries an [`InputListCreator`]. Built-in scalars build
//! typed vectors (`Vec<Option<i64>>` for `[Int]`) so resolvers can downcast
//! to concrete storage; nested lists and other types use `Vec<Value>`.

use crate::error::ArgumentError;
use crate::value::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Produces the element at an index of the list being decoded.
pub type ElementFn<'a> = dyn FnMut(usize) -> Result<Value, ArgumentError> + 'a;

/// Builds lists of one input type.
pub trait InputListCreator: Send + Sync {
    /// Builds a list of `len` elements.
    fn create(&self, len: usize, element: &mut ElementFn<'_>) -> Result<Value, ArgumentError>;

    /// The creator for lists whose elements are lists built by this creator.
    fn nested(&self) -> Arc<dyn InputListCreator>;
}

/// Builds `Vec<Value>` lists at any depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueListCreator;

impl InputListCreator for ValueListCreator {
    fn create(&self, len: usize, element: &mut ElementFn<'_>) -> Result<Value, ArgumentError> {
        let items = (0..len).map(element).collect::<Result<Vec<_>, _>>()?;
        Ok(Value::list(items))
    }

    fn nested(&self) -> Arc<dyn InputListCreator> {
        Arc::new(ValueListCreator)
    }
}

/// Builds `Vec<Option<T>>` lists, extracting each element with `extract`.
pub struct TypedListCreator<T> {
    extract: fn(Value) -> Option<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedListCreator<T> {
    #[must_use]
    pub const fn new(extract: fn(Value) -> Option<T>) -> Self {
        Self {
            extract,
            _marker: PhantomData,
        }
    }
}

impl<T> InputListCreator for TypedListCreator<T>
where
    T: Clone + Into<Value> + Send + Sync + 'static,
{
    fn create(&self, len: usize, element: &mut ElementFn<'_>) -> Result<Value, ArgumentError> {
        let mut items: Vec<Option<T>> = Vec::with_capacity(len);
        for index in 0..len {
            items.push(match element(index)? {
                Value::Null => None,
                value => {
                    let kind = value.kind_name();
                    Some((self.extract)(value).ok_or_else(|| {
                        ArgumentError::invalid(std::any::type_name::<T>(), kind)
                    })?)
                }
            });
        }
        Ok(Value::List(Arc::new(items)))
    }

    fn nested(&self) -> Arc<dyn InputListCreator> {
        Arc::new(ValueListCreator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_creator_builds_concrete_storage() {
        let creator = TypedListCreator::<i64>::new(|v| v.as_i64());
        let source = [Value::Int(1), Value::Null, Value::Int(3)];
        let list = creator
            .create(source.len(), &mut |i| Ok(source[i].clone()))
            .unwrap();
        assert_eq!(
            list.downcast_list::<Vec<Option<i64>>>(),
            Some(&vec![Some(1), None, Some(3)])
        );
    }

    #[test]
    fn test_nested_lists_fall_back_to_values() {
        let creator = TypedListCreator::<bool>::new(|v| v.as_bool());
        let inner = creator.create(1, &mut |_| Ok(Value::Boolean(true))).unwrap();
        let outer = creator
            .nested()
            .create(2, &mut |_| Ok(inner.clone()))
            .unwrap();
        let outer = outer.downcast_list::<Vec<Value>>().unwrap();
        assert_eq!(outer.len(), 2);
        assert_eq!(outer[0], inner);
    }

    #[test]
    fn test_element_errors_propagate() {
        let err = ValueListCreator
            .create(2, &mut |i| {
                if i == 1 {
                    Err(ArgumentError::Required)
                } else {
                    Ok(Value::Null)
                }
            })
            .unwrap_err();
        assert_eq!(err, ArgumentError::Required);
    }
}
