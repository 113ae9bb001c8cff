//! Query plans: the selector tree compiled from an operation.
//!
//! There is one selector per schema type constructor. Selectors are built
//! once per prepared query, never mutated afterwards, and shared by every
//! execution of that query.

mod compile;

pub(crate) use compile::{check_fragment_cycles, compile_operation, compile_variables};

use crate::argument::ArgumentPlan;
use crate::schema::{Discriminator, EnumType, FieldDef, ScalarType};
use crate::variables::VariableValues;
use crate::literal::Literal;
use gqlx_core::LineCol;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A compiled plan node.
pub(crate) enum Selector {
    Object(ObjectSelector),
    Interface(AbstractSelector),
    Union(AbstractSelector),
    List(Box<Selector>),
    NotNil(Box<Selector>),
    Scalar(Arc<ScalarType>),
    Enum(Arc<EnumType>),
}

/// Fields selected on one object type, in response order.
pub(crate) struct ObjectSelector {
    pub type_name: Arc<str>,
    pub fields: Vec<FieldPlan>,
}

/// An interface or union: one object selector per possible type.
pub(crate) struct AbstractSelector {
    pub type_name: String,
    pub discriminator: Discriminator,
    pub by_type: FxHashMap<String, ObjectSelector>,
}

pub(crate) enum FieldTarget {
    /// `__typename`, answered from the enclosing object selector.
    Typename,
    Field {
        def: Arc<FieldDef>,
        selector: Selector,
    },
}

/// A selected field after fragment expansion and merging.
pub(crate) struct FieldPlan {
    pub response_key: Arc<str>,
    pub name: String,
    pub location: LineCol,
    pub target: FieldTarget,
    pub arguments: Vec<ArgumentPlan>,
    pub guard: Guard,
}

/// Runtime inclusion test from `@skip`/`@include` with variable conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Guard {
    Always,
    /// Included when every condition of at least one group holds.
    AnyOf(Vec<Vec<Condition>>),
}

/// Holds when the boolean variable equals `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Condition {
    pub variable: String,
    pub expected: bool,
}

impl Guard {
    pub(crate) fn includes(&self, variables: &VariableValues<'_>) -> bool {
        match self {
            Self::Always => true,
            Self::AnyOf(groups) => groups
                .iter()
                .any(|group| group.iter().all(|c| c.holds(variables))),
        }
    }
}

impl Condition {
    fn holds(&self, variables: &VariableValues<'_>) -> bool {
        let value = matches!(
            variables.get(&self.variable),
            Ok(Some(Literal::Bool(true)))
        );
        value == self.expected
    }
}

#[cfg(test)]
impl Selector {
    /// A structural rendering used to compare plans in tests.
    pub(crate) fn shape(&self) -> String {
        match self {
            Self::Object(object) => object.shape(),
            Self::Interface(s) | Self::Union(s) => {
                let mut names: Vec<_> = s.by_type.keys().collect();
                names.sort();
                let parts: Vec<_> = names
                    .into_iter()
                    .map(|name| format!("{name}={}", s.by_type[name].shape()))
                    .collect();
                format!("{}<{}>", s.type_name, parts.join(","))
            }
            Self::List(inner) => format!("[{}]", inner.shape()),
            Self::NotNil(inner) => format!("{}!", inner.shape()),
            Self::Scalar(scalar) => scalar.name.clone(),
            Self::Enum(enumeration) => enumeration.name.clone(),
        }
    }
}

#[cfg(test)]
impl ObjectSelector {
    pub(crate) fn shape(&self) -> String {
        let fields: Vec<_> = self
            .fields
            .iter()
            .map(|field| match &field.target {
                FieldTarget::Typename => format!("{}:__typename", field.response_key),
                FieldTarget::Field { selector, .. } => {
                    format!("{}:{}", field.response_key, selector.shape())
                }
            })
            .collect();
        format!("{}{{{}}}", self.type_name, fields.join(" "))
    }
}
