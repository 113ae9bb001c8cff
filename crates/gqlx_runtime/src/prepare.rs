//! Query preparation: parse, select the operation, compile.

use crate::argument::InputTable;
use crate::batch::Batch;
use crate::context::Context;
use crate::error::{CompileError, CompileErrorKind, PrepareError};
use crate::listener::Listener;
use crate::plan::{check_fragment_cycles, compile_operation, compile_variables, ObjectSelector};
use crate::schema::Schema;
use crate::value::Value;
use crate::variables::{VariablePlan, Variables};
use gqlx_core::{DiagnosticBag, LineIndex};
use gqlx_syntax::{ast, OperationType};
use std::sync::Arc;

/// A query compiled against a schema, ready to execute any number of times.
pub struct PreparedQuery {
    schema: Arc<Schema>,
    operation: OperationType,
    name: Option<String>,
    pub(crate) variables: Vec<VariablePlan>,
    pub(crate) inputs: InputTable,
    root: ObjectSelector,
}

impl std::fmt::Debug for PreparedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedQuery")
            .field("operation", &self.operation)
            .field("name", &self.name)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

impl PreparedQuery {
    /// Parses `source` and compiles the operation named `operation_name`.
    ///
    /// An empty name selects the only operation of the document.
    pub fn prepare(
        schema: &Arc<Schema>,
        source: &str,
        operation_name: &str,
    ) -> Result<Self, PrepareError> {
        let lines = LineIndex::new(source);
        let document = gqlx_syntax::parse(source)
            .into_result()
            .map_err(|diagnostics| syntax_error(&diagnostics, &lines))?;
        let operation = select_operation(&document, operation_name)?;
        check_fragment_cycles(&document, &lines)?;

        let Some(root_type) = schema.root_type(operation.operation) else {
            return Err(CompileError {
                kind: CompileErrorKind::UnsupportedOperation,
                message: format!("schema does not support {} operations", operation.operation),
                location: lines.span_start(operation.span),
                span: operation.span.into(),
            }
            .into());
        };
        let variables = compile_variables(schema, &operation.variables, &lines)?;
        let mut inputs = InputTable::default();
        let root = compile_operation(
            schema,
            &document,
            operation,
            root_type,
            &variables,
            &lines,
            &mut inputs,
        )?;

        let name = operation.name.as_ref().map(|n| n.value.clone());
        tracing::debug!(
            operation = %operation.operation,
            name = name.as_deref().unwrap_or("<anonymous>"),
            fields = root.fields.len(),
            "query prepared"
        );
        Ok(Self {
            schema: Arc::clone(schema),
            operation: operation.operation,
            name,
            variables,
            inputs,
            root,
        })
    }

    /// Executes the query and returns the serialized response.
    pub fn execute(
        &self,
        ctx: &Context,
        root: Value,
        variables: &Variables,
        listener: Option<&dyn Listener>,
    ) -> Vec<u8> {
        let mut batch = Batch::new();
        batch.add(self, root, variables);
        batch.execute(ctx, listener).pop().unwrap_or_default()
    }

    #[must_use]
    pub fn operation_type(&self) -> OperationType {
        self.operation
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Names of the variables the operation declares.
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }

    pub(crate) fn root(&self) -> &ObjectSelector {
        &self.root
    }
}

/// Prepares a query; see [`PreparedQuery::prepare`].
pub fn prepare_query(
    schema: &Arc<Schema>,
    source: &str,
    operation_name: &str,
) -> Result<PreparedQuery, PrepareError> {
    PreparedQuery::prepare(schema, source, operation_name)
}

fn syntax_error(diagnostics: &DiagnosticBag, lines: &LineIndex<'_>) -> PrepareError {
    match diagnostics.first_error() {
        Some(diagnostic) => PrepareError::Syntax {
            message: diagnostic.message.clone(),
            location: lines.span_start(diagnostic.span),
            span: diagnostic.span.into(),
        },
        None => PrepareError::Syntax {
            message: "invalid document".to_string(),
            location: lines.line_col(0),
            span: (0, 0).into(),
        },
    }
}

fn select_operation<'d>(
    document: &'d ast::Document,
    name: &str,
) -> Result<&'d ast::OperationDefinition, PrepareError> {
    if name.is_empty() {
        let mut operations = document.operations();
        let first = operations.next().ok_or(PrepareError::NoOperation)?;
        if operations.next().is_some() {
            return Err(PrepareError::AmbiguousOperation);
        }
        return Ok(first);
    }
    document
        .operations()
        .find(|op| op.name.as_ref().is_some_and(|n| n.value == name))
        .ok_or_else(|| PrepareError::UnknownOperation(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, ObjectType};
    use gqlx_core::LineCol;

    fn schema() -> Arc<Schema> {
        Schema::builder("Query")
            .object(ObjectType::new("Query").with_field(FieldDef::new("a", "Int")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_operation_selection() {
        let source = "query One { a } query Two { a }";
        let query = PreparedQuery::prepare(&schema(), source, "Two").unwrap();
        assert_eq!(query.name(), Some("Two"));
        assert_eq!(query.operation_type(), OperationType::Query);

        let err = PreparedQuery::prepare(&schema(), source, "").unwrap_err();
        assert_eq!(err, PrepareError::AmbiguousOperation);
        let err = PreparedQuery::prepare(&schema(), source, "Three").unwrap_err();
        assert_eq!(err, PrepareError::UnknownOperation("Three".into()));
        let err = PreparedQuery::prepare(&schema(), "fragment F on Query { a }", "").unwrap_err();
        assert_eq!(err, PrepareError::NoOperation);
    }

    #[test]
    fn test_syntax_errors_carry_locations() {
        let err = PreparedQuery::prepare(&schema(), "{\n  a(\n}", "").unwrap_err();
        assert!(matches!(err, PrepareError::Syntax { .. }));
        assert_eq!(err.location(), LineCol::new(3, 1));
    }

    #[test]
    fn test_missing_root_type() {
        let err = PreparedQuery::prepare(&schema(), "mutation { a }", "").unwrap_err();
        let PrepareError::Compile(err) = err else {
            panic!("expected a compile error");
        };
        assert_eq!(err.kind, CompileErrorKind::UnsupportedOperation);
        assert_eq!(err.message, "schema does not support mutation operations");
    }

    #[test]
    fn test_variable_names() {
        let query =
            PreparedQuery::prepare(&schema(), "query($x: Int, $y: [String!]) { a }", "").unwrap();
        assert_eq!(query.variable_names().collect::<Vec<_>>(), ["x", "y"]);
    }
}
