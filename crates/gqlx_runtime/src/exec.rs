//! Plan execution.
//!
//! Selectors write into a [`Collector`] as they go. Whenever a value is still
//! pending, the remaining work for that subtree is captured in a
//! [`Continuation`]. The driver loop notifies the listener that the engine is
//! idle, then runs every continuation; each may leave more work behind.

use crate::collector::{Collector, NodeId, ScalarSink};
use crate::context::Context;
use crate::error::{ErrorKind, FieldError};
use crate::listener::{CompletionCallback, Listener, QueryField};
use crate::literal::Literal;
use crate::plan::{AbstractSelector, FieldPlan, FieldTarget, ObjectSelector, Selector};
use crate::prepare::PreparedQuery;
use crate::schema::{EnumType, FieldDef, Resolver, ScalarType};
use crate::value::Value;
use crate::variables::{VariableValues, Variables};
use gqlx_core::LineCol;
use gqlx_syntax::OperationType;
use indexmap::IndexMap;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Work left over after a value turned out to be pending.
pub(crate) struct Continuation<'p>(Box<dyn FnOnce(&mut Exec<'p>) -> Option<Continuation<'p>> + 'p>);

impl<'p> Continuation<'p> {
    fn new(f: impl FnOnce(&mut Exec<'p>) -> Option<Continuation<'p>> + 'p) -> Self {
        Self(Box::new(f))
    }

    fn run(self, exec: &mut Exec<'p>) -> Option<Self> {
        (self.0)(exec)
    }

    /// Runs every item once per round, keeping whatever they leave behind.
    pub(crate) fn all(mut items: Vec<Self>) -> Option<Self> {
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Self::new(move |exec| {
                let next = items.into_iter().filter_map(|item| item.run(exec)).collect();
                Self::all(next)
            })),
        }
    }
}

/// State shared by every query of one execution.
pub(crate) struct Exec<'p> {
    ctx: &'p Context,
    listener: &'p dyn Listener,
    collectors: Vec<Collector>,
}

/// One query of a batch.
#[derive(Clone, Copy)]
pub(crate) struct Frame<'p> {
    pub qid: usize,
    pub query: &'p PreparedQuery,
    pub variables: &'p Variables,
}

impl<'p> Frame<'p> {
    fn variable_values(&self) -> VariableValues<'p> {
        VariableValues::new(self.variables, &self.query.variables)
    }
}

impl<'p> Exec<'p> {
    pub(crate) fn new(
        ctx: &'p Context,
        listener: &'p dyn Listener,
        collectors: Vec<Collector>,
    ) -> Self {
        Self {
            ctx,
            listener,
            collectors,
        }
    }

    pub(crate) fn into_collectors(self) -> Vec<Collector> {
        self.collectors
    }

    fn collector(&mut self, frame: Frame<'_>) -> &mut Collector {
        &mut self.collectors[frame.qid]
    }

    fn fail(&mut self, frame: Frame<'_>, node: NodeId, error: FieldError, location: LineCol) {
        self.listener.notify_error(&error);
        self.collector(frame).set_error(node, error, location);
    }

    /// Drives continuations until no work remains.
    pub(crate) fn run(&mut self, mut next: Option<Continuation<'p>>) {
        let mut rounds = 0_usize;
        while let Some(continuation) = next {
            rounds += 1;
            self.listener.notify_idle();
            next = continuation.run(self);
        }
        if rounds > 0 {
            tracing::trace!(rounds, "pending values drained");
        }
    }
}

/// Executes a query's root selection against `root`.
pub(crate) fn execute_root<'p>(
    exec: &mut Exec<'p>,
    frame: Frame<'p>,
    root: &Value,
    node: NodeId,
) -> Option<Continuation<'p>> {
    let serial = frame.query.operation_type() == OperationType::Mutation;
    apply_object(exec, frame, frame.query.root(), root, node, serial)
}

fn apply<'p>(
    exec: &mut Exec<'p>,
    frame: Frame<'p>,
    selector: &'p Selector,
    value: Value,
    node: NodeId,
    location: LineCol,
) -> Option<Continuation<'p>> {
    match (selector, value) {
        (Selector::NotNil(inner), value) => {
            exec.collector(frame).set_required(node, location);
            apply(exec, frame, inner, value, node, location)
        }
        (_, Value::Pending(pending)) => Some(Continuation::new(move |exec| {
            match pending.await_value(exec.ctx) {
                Ok(value) => apply(exec, frame, selector, value, node, location),
                Err(err) => {
                    exec.fail(frame, node, async_error(err), location);
                    None
                }
            }
        })),
        (_, Value::Null) => {
            exec.collector(frame).set_null(node);
            None
        }
        (Selector::Object(object), value) => apply_object(exec, frame, object, &value, node, false),
        (Selector::Interface(selector) | Selector::Union(selector), value) => {
            apply_abstract(exec, frame, selector, &value, node, location)
        }
        (Selector::List(inner), value) => apply_list(exec, frame, inner, &value, node, location),
        (Selector::Scalar(scalar), value) => {
            if let Err(err) = write_scalar(exec.collector(frame), node, scalar, &value) {
                exec.fail(frame, node, err, location);
            }
            None
        }
        (Selector::Enum(enumeration), value) => {
            if let Err(err) = write_enum(exec.collector(frame), node, enumeration, &value) {
                exec.fail(frame, node, err, location);
            }
            None
        }
    }
}

/// Resolves the fields of one object. With `serial`, each field's pending
/// work is drained before the next field starts.
fn apply_object<'p>(
    exec: &mut Exec<'p>,
    frame: Frame<'p>,
    object: &'p ObjectSelector,
    parent: &Value,
    node: NodeId,
    serial: bool,
) -> Option<Continuation<'p>> {
    let variables = frame.variable_values();
    exec.collector(frame).begin_object(node, object.fields.len());

    let mut pending = Vec::new();
    for field in &object.fields {
        let child = exec
            .collector(frame)
            .add_field(node, Arc::clone(&field.response_key));
        if !field.guard.includes(&variables) {
            exec.collector(frame).set_skipped(child);
            continue;
        }
        let next = apply_field(exec, frame, object, field, parent, child);
        if serial {
            exec.run(next);
        } else if let Some(continuation) = next {
            pending.push(continuation);
        }
    }
    Continuation::all(pending)
}

fn apply_field<'p>(
    exec: &mut Exec<'p>,
    frame: Frame<'p>,
    object: &'p ObjectSelector,
    field: &'p FieldPlan,
    parent: &Value,
    node: NodeId,
) -> Option<Continuation<'p>> {
    let (def, selector) = match &field.target {
        FieldTarget::Typename => {
            exec.collector(frame).set_string(node, &object.type_name);
            return None;
        }
        FieldTarget::Field { def, selector } => (def, selector),
    };
    if matches!(selector, Selector::NotNil(_)) {
        exec.collector(frame).set_required(node, field.location);
    }

    let query_field = QueryField {
        name: &field.name,
        response_key: &field.response_key,
        location: field.location,
        parent_type: &object.type_name,
    };
    let callback = match exec.listener.notify_resolve(&query_field, def) {
        Ok(callback) => callback,
        Err(err) => {
            exec.fail(frame, node, err, field.location);
            return None;
        }
    };

    let result = invoke(exec, frame, object, field, def, parent);
    complete(exec, frame, selector, field.location, node, result, callback)
}

/// Hands a resolver result to its completion callback, once it is no
/// longer pending, and applies the child selector.
fn complete<'p>(
    exec: &mut Exec<'p>,
    frame: Frame<'p>,
    selector: &'p Selector,
    location: LineCol,
    node: NodeId,
    result: Result<Value, FieldError>,
    callback: Option<CompletionCallback>,
) -> Option<Continuation<'p>> {
    if let Ok(Value::Pending(pending)) = result {
        return Some(Continuation::new(move |exec| {
            let result = pending.await_value(exec.ctx).map_err(async_error);
            complete(exec, frame, selector, location, node, result, callback)
        }));
    }
    let result = match callback {
        Some(callback) => callback(result),
        None => result,
    };
    match result {
        Ok(value) => apply(exec, frame, selector, value, node, location),
        Err(err) => {
            exec.fail(frame, node, err, location);
            None
        }
    }
}

fn invoke(
    exec: &Exec<'_>,
    frame: Frame<'_>,
    object: &ObjectSelector,
    field: &FieldPlan,
    def: &FieldDef,
    parent: &Value,
) -> Result<Value, FieldError> {
    exec.ctx.check()?;
    let arguments = resolve_arguments(frame, field)?;

    let call = || match &def.resolver {
        Resolver::Property => property(parent, &def.name),
        Resolver::Simple(resolve) => resolve(parent),
        Resolver::Context(resolve) => resolve(exec.ctx, parent),
        Resolver::Full(resolve) => {
            let rc = ResolverContext {
                ctx: exec.ctx,
                arguments: &arguments,
                field,
                def,
                parent_type: &object.type_name,
            };
            resolve(&rc, parent)
        }
    };
    if def.safe {
        return call();
    }
    std::panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::warn!(
            field = %def.name,
            parent = %object.type_name,
            %message,
            "resolver panicked"
        );
        Err(FieldError::new(message))
    })
}

fn resolve_arguments(
    frame: Frame<'_>,
    field: &FieldPlan,
) -> Result<IndexMap<String, Value>, FieldError> {
    let variables = frame.variable_values();
    let mut arguments = IndexMap::with_capacity(field.arguments.len());
    for argument in &field.arguments {
        let value = argument.resolve(&frame.query.inputs, &variables)?;
        arguments.insert(argument.name.clone(), value);
    }
    Ok(arguments)
}

/// The default resolver: reads a map entry named after the field.
fn property(parent: &Value, name: &str) -> Result<Value, FieldError> {
    match parent {
        Value::Map(map) => Ok(map.get(name).cloned().unwrap_or_default()),
        Value::Null => Ok(Value::Null),
        other => Err(FieldError::type_error(format!(
            "cannot read field \"{name}\" from a {} value",
            other.kind_name()
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "resolver panicked".to_string()
}

fn async_error(mut err: FieldError) -> FieldError {
    if err.kind == ErrorKind::Resolve {
        err.kind = ErrorKind::Async;
    }
    err
}

fn apply_abstract<'p>(
    exec: &mut Exec<'p>,
    frame: Frame<'p>,
    selector: &'p AbstractSelector,
    value: &Value,
    node: NodeId,
    location: LineCol,
) -> Option<Continuation<'p>> {
    let resolved = (selector.discriminator)(value).and_then(|(value, type_name)| {
        match selector.by_type.get(&type_name) {
            Some(object) => Ok((value, object)),
            None => Err(FieldError::type_error(format!(
                "value of type \"{type_name}\" does not conform to \"{}\"",
                selector.type_name
            ))),
        }
    });
    match resolved {
        Ok((value, object)) => apply_object(exec, frame, object, &value, node, false),
        Err(err) => {
            exec.fail(frame, node, err, location);
            None
        }
    }
}

fn apply_list<'p>(
    exec: &mut Exec<'p>,
    frame: Frame<'p>,
    inner: &'p Selector,
    value: &Value,
    node: NodeId,
    location: LineCol,
) -> Option<Continuation<'p>> {
    let Value::List(list) = value else {
        let err = FieldError::type_error(format!("expected a list, found {}", value.kind_name()));
        exec.fail(frame, node, err, location);
        return None;
    };

    exec.collector(frame).begin_array(node, list.len());
    let mut pending = Vec::new();
    for index in 0..list.len() {
        let item = exec.collector(frame).add_item(node);
        if let Some(continuation) = apply(exec, frame, inner, list.get(index), item, location) {
            pending.push(continuation);
        }
    }
    Continuation::all(pending)
}

fn write_scalar(
    collector: &mut Collector,
    node: NodeId,
    scalar: &ScalarType,
    value: &Value,
) -> Result<(), FieldError> {
    if let Value::Scalar(custom) = value {
        return custom.collect(ScalarSink::new(collector, node));
    }
    let literal = scalar.encode(value)?;
    write_literal(collector, node, &literal);
    Ok(())
}

fn write_enum(
    collector: &mut Collector,
    node: NodeId,
    enumeration: &EnumType,
    value: &Value,
) -> Result<(), FieldError> {
    match enumeration.encode(value)? {
        Literal::String(name) => {
            collector.set_string(node, &name);
            Ok(())
        }
        other => Err(FieldError::type_error(format!(
            "enum \"{}\" encoded a {} instead of a value name",
            enumeration.name,
            other.kind_name()
        ))),
    }
}

fn write_literal(collector: &mut Collector, node: NodeId, literal: &Literal) {
    match literal {
        Literal::Null => collector.set_null(node),
        Literal::Number(n) => collector.set_float(node, *n),
        Literal::String(s) => collector.set_string(node, s),
        Literal::Bool(b) => collector.set_bool(node, *b),
        Literal::Array(items) => {
            collector.begin_array(node, items.len());
            for item in items {
                let child = collector.add_item(node);
                write_literal(collector, child, item);
            }
        }
        Literal::Map(fields) => {
            collector.begin_object(node, fields.len());
            for (key, value) in fields {
                let child = collector.add_field(node, Arc::from(key.as_str()));
                write_literal(collector, child, value);
            }
        }
    }
}

/// What a [`Resolver::Full`] resolver can see about its field.
pub struct ResolverContext<'a> {
    ctx: &'a Context,
    arguments: &'a IndexMap<String, Value>,
    field: &'a FieldPlan,
    def: &'a FieldDef,
    parent_type: &'a str,
}

impl<'a> ResolverContext<'a> {
    #[must_use]
    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    /// A coerced argument. Arguments that were neither supplied nor
    /// defaulted are null.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&'a Value> {
        self.arguments.get(name)
    }

    #[must_use]
    pub fn arguments(&self) -> &'a IndexMap<String, Value> {
        self.arguments
    }

    #[must_use]
    pub fn field_name(&self) -> &'a str {
        &self.field.name
    }

    /// The alias if the query used one, otherwise the field name.
    #[must_use]
    pub fn response_key(&self) -> &'a str {
        &self.field.response_key
    }

    #[must_use]
    pub fn location(&self) -> LineCol {
        self.field.location
    }

    #[must_use]
    pub fn parent_type(&self) -> &'a str {
        self.parent_type
    }

    #[must_use]
    pub fn schema_field(&self) -> &'a FieldDef {
        self.def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_resolver() {
        let parent = Value::map([("a", Value::Int(1))]);
        assert_eq!(property(&parent, "a"), Ok(Value::Int(1)));
        assert_eq!(property(&parent, "b"), Ok(Value::Null));
        assert_eq!(property(&Value::Null, "a"), Ok(Value::Null));
        let err = property(&Value::Int(3), "a").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
        assert_eq!(err.message, "cannot read field \"a\" from a int value");
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 1");
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }

    #[test]
    fn test_write_literal() {
        let mut collector = Collector::new();
        let root = collector.root();
        let literal = Literal::from_json(serde_json::json!({"a": [1, 2.5, null], "b": "x"}));
        write_literal(&mut collector, root, &literal);
        let (bytes, _) = collector.finish(root);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"data":{"a":[1,2.5,null],"b":"x"}}"#
        );
    }
}
