//! Compiles an operation's selection sets into selectors.
//!
//! Fragments are expanded in place: fields are collected per concrete object
//! type, merged by response key, and `@skip`/`@include` with literal
//! arguments are folded away. Conditions on variables survive as guards.

use super::{AbstractSelector, Condition, FieldPlan, FieldTarget, Guard, ObjectSelector, Selector};
use crate::argument::{const_literal, ArgValue, ArgumentPlan, InputTable};
use crate::error::{CompileError, CompileErrorKind};
use crate::schema::{FieldDef, InterfaceType, ObjectType, Schema, TypeDef, TypeRef, UnionType};
use crate::variables::VariablePlan;
use gqlx_core::{LineIndex, Span};
use gqlx_syntax::{ast, MAX_DEPTH};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

type Fragments<'a> = FxHashMap<&'a str, &'a ast::FragmentDefinition>;

/// Read-only state of one compilation, copied into every nested call.
#[derive(Clone, Copy)]
struct CompileContext<'a> {
    schema: &'a Schema,
    fragments: &'a Fragments<'a>,
    variables: &'a [VariablePlan],
    lines: &'a LineIndex<'a>,
    /// Where errors are reported.
    span: Span,
    /// Fields between the root and the current selection.
    depth: usize,
}

impl CompileContext<'_> {
    fn at(self, span: Span) -> Self {
        Self { span, ..self }
    }

    fn error(&self, kind: CompileErrorKind, message: impl Into<String>) -> CompileError {
        CompileError {
            kind,
            message: message.into(),
            location: self.lines.span_start(self.span),
            span: self.span.into(),
        }
    }

    fn check_variable(&self, name: &ast::Name) -> Result<(), CompileError> {
        if self.variables.iter().any(|v| v.name == name.value) {
            return Ok(());
        }
        Err(self.at(name.span).error(
            CompileErrorKind::InvalidVariable,
            format!("variable \"${name}\" is not defined"),
        ))
    }
}

/// A selection set together with the conditions it was reached under.
struct Scoped<'a> {
    set: &'a ast::SelectionSet,
    conditions: Vec<Condition>,
}

/// One appearance of a field in the expanded selection.
struct Occurrence<'a> {
    field: &'a ast::Field,
    conditions: Vec<Condition>,
}

type Grouped<'a> = IndexMap<&'a str, Vec<Occurrence<'a>>>;

/// Compiles the root selection set of `operation` against `root`.
pub(crate) fn compile_operation(
    schema: &Schema,
    document: &ast::Document,
    operation: &ast::OperationDefinition,
    root: &ObjectType,
    variables: &[VariablePlan],
    lines: &LineIndex<'_>,
    inputs: &mut InputTable,
) -> Result<ObjectSelector, CompileError> {
    let mut fragments = Fragments::default();
    let duplicate = document
        .fragments()
        .find(|fragment| fragments.insert(fragment.name.as_str(), fragment).is_some());

    let cx = CompileContext {
        schema,
        fragments: &fragments,
        variables,
        lines,
        span: operation.span,
        depth: 0,
    };
    if let Some(fragment) = duplicate {
        return Err(cx.at(fragment.name.span).error(
            CompileErrorKind::InvalidSelection,
            format!("fragment \"{}\" is defined more than once", fragment.name),
        ));
    }

    let sets = [Scoped {
        set: &operation.selection_set,
        conditions: Vec::new(),
    }];
    compile_object(cx, inputs, root, &root.name, &sets)
}

/// Compiles the operation's variable declarations.
pub(crate) fn compile_variables(
    schema: &Schema,
    definitions: &[ast::VariableDefinition],
    lines: &LineIndex<'_>,
) -> Result<Vec<VariablePlan>, CompileError> {
    let mut plans: Vec<VariablePlan> = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let name = &definition.name;
        let error = |kind, message: String| CompileError {
            kind,
            message,
            location: lines.span_start(definition.span),
            span: definition.span.into(),
        };
        if plans.iter().any(|plan| plan.name == name.value) {
            return Err(error(
                CompileErrorKind::InvalidVariable,
                format!("variable \"${name}\" is declared more than once"),
            ));
        }
        let ty = TypeRef::from_ast(&definition.ty);
        match schema.get(ty.name()) {
            Some(def) if def.is_input() => {}
            Some(_) => {
                return Err(error(
                    CompileErrorKind::InvalidVariable,
                    format!("variable \"${name}\" has type \"{ty}\", which is not an input type"),
                ))
            }
            None => {
                return Err(error(
                    CompileErrorKind::UnknownType,
                    format!("unknown type \"{}\"", ty.name()),
                ))
            }
        }
        plans.push(VariablePlan {
            name: name.value.clone(),
            ty,
            default: definition.default_value.as_ref().map(const_literal),
        });
    }
    Ok(plans)
}

/// Rejects fragments that spread themselves, directly or indirectly.
pub(crate) fn check_fragment_cycles(
    document: &ast::Document,
    lines: &LineIndex<'_>,
) -> Result<(), CompileError> {
    let fragments: Fragments<'_> = document
        .fragments()
        .map(|fragment| (fragment.name.as_str(), fragment))
        .collect();
    let mut done = FxHashSet::default();
    let mut path = Vec::new();
    for fragment in document.fragments() {
        visit_fragment(fragment, &fragments, &mut path, &mut done, lines)?;
    }
    Ok(())
}

fn visit_fragment<'a>(
    fragment: &'a ast::FragmentDefinition,
    fragments: &Fragments<'a>,
    path: &mut Vec<&'a str>,
    done: &mut FxHashSet<&'a str>,
    lines: &LineIndex<'_>,
) -> Result<(), CompileError> {
    let name = fragment.name.as_str();
    if done.contains(name) {
        return Ok(());
    }
    if path.len() >= MAX_DEPTH {
        return Err(CompileError {
            kind: CompileErrorKind::InvalidSelection,
            message: format!("fragment spreads are nested more than {MAX_DEPTH} levels deep"),
            location: lines.span_start(fragment.name.span),
            span: fragment.name.span.into(),
        });
    }
    path.push(name);

    let mut spreads = Vec::new();
    collect_spreads(&fragment.selection_set, &mut spreads);
    for spread in spreads {
        let target = spread.name.as_str();
        if let Some(start) = path.iter().position(|visited| *visited == target) {
            let mut cycle = path[start..].join(" -> ");
            cycle.push_str(" -> ");
            cycle.push_str(target);
            return Err(CompileError {
                kind: CompileErrorKind::FragmentCycle,
                message: format!("fragment spreads form a cycle: {cycle}"),
                location: lines.span_start(spread.span),
                span: spread.span.into(),
            });
        }
        if let Some(next) = fragments.get(target) {
            visit_fragment(next, fragments, path, done, lines)?;
        }
    }

    path.pop();
    done.insert(name);
    Ok(())
}

fn collect_spreads<'a>(set: &'a ast::SelectionSet, out: &mut Vec<&'a ast::FragmentSpread>) {
    for selection in &set.selections {
        match selection {
            ast::Selection::Field(field) => collect_spreads(&field.selection_set, out),
            ast::Selection::FragmentSpread(spread) => out.push(spread),
            ast::Selection::InlineFragment(inline) => collect_spreads(&inline.selection_set, out),
        }
    }
}

/// Folds `@skip` and `@include`.
///
/// Returns `None` when a literal argument excludes the selection, otherwise
/// the conditions left to check at execution time.
fn directive_conditions(
    cx: CompileContext<'_>,
    directives: &[ast::Directive],
) -> Result<Option<Vec<Condition>>, CompileError> {
    let mut conditions = Vec::new();
    for directive in directives {
        let expected = match directive.name.as_str() {
            "skip" => false,
            "include" => true,
            _ => continue,
        };
        let cx = cx.at(directive.span);
        let Some(argument) = directive.argument("if") else {
            return Err(cx.error(
                CompileErrorKind::InvalidDirective,
                format!("directive \"@{}\" requires an \"if\" argument", directive.name),
            ));
        };
        match &argument.value {
            ast::Value::Boolean(value, _) => {
                if *value != expected {
                    return Ok(None);
                }
            }
            ast::Value::Variable(variable) => {
                cx.check_variable(variable)?;
                conditions.push(Condition {
                    variable: variable.value.clone(),
                    expected,
                });
            }
            other => {
                return Err(cx.at(other.span()).error(
                    CompileErrorKind::InvalidDirective,
                    format!(
                        "argument \"if\" of \"@{}\" must be a boolean or a variable",
                        directive.name
                    ),
                ))
            }
        }
    }
    Ok(Some(conditions))
}

/// Collects the fields of `set` that apply to type `target`, grouped by
/// response key. `scope` is the type the selection set is written against.
fn collect_fields<'a>(
    cx: CompileContext<'a>,
    target: &str,
    scope: &str,
    set: &'a ast::SelectionSet,
    inherited: &[Condition],
    out: &mut Grouped<'a>,
) -> Result<(), CompileError> {
    for selection in &set.selections {
        let Some(own) = directive_conditions(cx, selection.directives())? else {
            continue;
        };
        let mut conditions = inherited.to_vec();
        conditions.extend(own);

        match selection {
            ast::Selection::Field(field) => {
                out.entry(field.response_key())
                    .or_default()
                    .push(Occurrence { field, conditions });
            }
            ast::Selection::InlineFragment(inline) => {
                let inner_scope = match &inline.type_condition {
                    Some(condition) => {
                        if !type_condition_applies(cx, condition, target, scope)? {
                            continue;
                        }
                        condition.as_str()
                    }
                    None => scope,
                };
                collect_fields(cx, target, inner_scope, &inline.selection_set, &conditions, out)?;
            }
            ast::Selection::FragmentSpread(spread) => {
                let Some(&fragment) = cx.fragments.get(spread.name.as_str()) else {
                    return Err(cx.at(spread.name.span).error(
                        CompileErrorKind::UnknownFragment,
                        format!("unknown fragment \"{}\"", spread.name),
                    ));
                };
                let condition = &fragment.type_condition;
                if type_condition_applies(cx, condition, target, scope)? {
                    collect_fields(
                        cx,
                        target,
                        condition.as_str(),
                        &fragment.selection_set,
                        &conditions,
                        out,
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn type_condition_applies(
    cx: CompileContext<'_>,
    condition: &ast::Name,
    target: &str,
    scope: &str,
) -> Result<bool, CompileError> {
    let cx = cx.at(condition.span);
    let name = condition.as_str();
    match cx.schema.get(name) {
        None => Err(cx.error(
            CompileErrorKind::UnknownType,
            format!("unknown type \"{name}\" in type condition"),
        )),
        Some(def) if !def.is_composite() => Err(cx.error(
            CompileErrorKind::InvalidTypeCondition,
            format!("fragment cannot condition on {} type \"{name}\"", def.kind()),
        )),
        Some(_) if !cx.schema.types_overlap(name, scope) => Err(cx.error(
            CompileErrorKind::InvalidTypeCondition,
            format!("fragment on \"{name}\" can never apply within \"{scope}\""),
        )),
        Some(_) => Ok(applies(cx.schema, name, target)),
    }
}

/// Whether a fragment conditioned on `condition` applies to `target`.
fn applies(schema: &Schema, condition: &str, target: &str) -> bool {
    if condition == target {
        return true;
    }
    let Some(object) = schema.object(target) else {
        return false;
    };
    match schema.get(condition) {
        Some(TypeDef::Interface(_)) => object.implements_interface(condition),
        Some(TypeDef::Union(union)) => union.members.iter().any(|m| *m == object.name),
        _ => false,
    }
}

fn compile_object<'a>(
    cx: CompileContext<'a>,
    inputs: &mut InputTable,
    object: &ObjectType,
    scope: &str,
    sets: &[Scoped<'a>],
) -> Result<ObjectSelector, CompileError> {
    let mut grouped = Grouped::new();
    for scoped in sets {
        collect_fields(cx, &object.name, scope, scoped.set, &scoped.conditions, &mut grouped)?;
    }

    let mut fields = Vec::with_capacity(grouped.len());
    for (key, occurrences) in &grouped {
        fields.push(compile_field(cx, inputs, object, key, occurrences)?);
    }
    Ok(ObjectSelector {
        type_name: Arc::from(object.name.as_str()),
        fields,
    })
}

fn compile_field<'a>(
    cx: CompileContext<'a>,
    inputs: &mut InputTable,
    object: &ObjectType,
    key: &str,
    occurrences: &[Occurrence<'a>],
) -> Result<FieldPlan, CompileError> {
    let first = occurrences[0].field;
    let cx = CompileContext {
        depth: cx.depth + 1,
        ..cx.at(first.span)
    };
    if cx.depth > MAX_DEPTH {
        return Err(cx.error(
            CompileErrorKind::InvalidSelection,
            format!("selection is nested more than {MAX_DEPTH} levels deep"),
        ));
    }
    for other in &occurrences[1..] {
        let other = other.field;
        if other.name.value != first.name.value {
            return Err(cx.at(other.span).error(
                CompileErrorKind::FieldConflict,
                format!(
                    "\"{key}\" selects both \"{}\" and \"{}\"; use different aliases",
                    first.name, other.name
                ),
            ));
        }
        if !same_arguments(&first.arguments, &other.arguments) {
            return Err(cx.at(other.span).error(
                CompileErrorKind::FieldConflict,
                format!("\"{key}\" is selected with different arguments"),
            ));
        }
    }

    let guard = if occurrences.iter().any(|o| o.conditions.is_empty()) {
        Guard::Always
    } else {
        Guard::AnyOf(occurrences.iter().map(|o| o.conditions.clone()).collect())
    };
    let location = cx.lines.span_start(first.span);
    let name = first.name.value.clone();

    if name == "__typename" {
        if occurrences.iter().any(|o| !o.field.selection_set.is_empty()) {
            return Err(cx.error(
                CompileErrorKind::InvalidSelection,
                "\"__typename\" is a leaf and must not have a selection of subfields",
            ));
        }
        return Ok(FieldPlan {
            response_key: Arc::from(key),
            name,
            location,
            target: FieldTarget::Typename,
            arguments: Vec::new(),
            guard,
        });
    }

    let Some(def) = object.field(&name) else {
        return Err(cx.at(first.name.span).error(
            CompileErrorKind::UnknownField,
            format!("cannot query field \"{name}\" on type \"{}\"", object.name),
        ));
    };
    let arguments = compile_arguments(cx, inputs, def, first)?;
    let sets: Vec<Scoped<'a>> = occurrences
        .iter()
        .map(|o| Scoped {
            set: &o.field.selection_set,
            conditions: o.conditions.clone(),
        })
        .collect();
    let selector = compile_type(cx, inputs, &def.ty, &sets)?;

    Ok(FieldPlan {
        response_key: Arc::from(key),
        name,
        location,
        target: FieldTarget::Field {
            def: Arc::clone(def),
            selector,
        },
        arguments,
        guard,
    })
}

fn compile_arguments(
    cx: CompileContext<'_>,
    inputs: &mut InputTable,
    def: &FieldDef,
    field: &ast::Field,
) -> Result<Vec<ArgumentPlan>, CompileError> {
    for argument in &field.arguments {
        if !def.arguments.contains_key(argument.name.as_str()) {
            return Err(cx.at(argument.name.span).error(
                CompileErrorKind::UnknownArgument,
                format!(
                    "unknown argument \"{}\" on field \"{}\"",
                    argument.name, def.name
                ),
            ));
        }
        let mut undefined = None;
        argument.value.for_each_variable(&mut |name| {
            if undefined.is_none() && cx.check_variable(name).is_err() {
                undefined = Some(name.clone());
            }
        });
        if let Some(name) = undefined {
            cx.check_variable(&name)?;
        }
    }

    let mut plans = Vec::with_capacity(def.arguments.len());
    for argument in def.arguments.values() {
        let value = match field.argument(&argument.name) {
            None => ArgValue::Absent,
            Some(supplied) if supplied.value.is_const() => {
                ArgValue::Literal(const_literal(&supplied.value))
            }
            Some(supplied) => ArgValue::Deferred(supplied.value.clone()),
        };
        let resolver = inputs
            .compile(cx.schema, &argument.ty)
            .map_err(|message| cx.error(CompileErrorKind::UnknownType, message))?;
        plans.push(ArgumentPlan {
            name: argument.name.clone(),
            value,
            default: argument.default.clone(),
            resolver,
        });
    }
    Ok(plans)
}

fn compile_type<'a>(
    cx: CompileContext<'a>,
    inputs: &mut InputTable,
    ty: &TypeRef,
    sets: &[Scoped<'a>],
) -> Result<Selector, CompileError> {
    let name = match ty {
        TypeRef::NotNil(inner) => {
            return Ok(Selector::NotNil(Box::new(compile_type(cx, inputs, inner, sets)?)))
        }
        TypeRef::List(inner) => {
            return Ok(Selector::List(Box::new(compile_type(cx, inputs, inner, sets)?)))
        }
        TypeRef::Named(name) => name,
    };

    let has_selection = sets.iter().any(|scoped| !scoped.set.is_empty());
    let Some(def) = cx.schema.get(name) else {
        return Err(cx.error(CompileErrorKind::UnknownType, format!("unknown type \"{name}\"")));
    };
    match def {
        TypeDef::Scalar(_) | TypeDef::Enum(_) if has_selection => Err(cx.error(
            CompileErrorKind::InvalidSelection,
            format!("field of type \"{name}\" must not have a selection of subfields"),
        )),
        TypeDef::Scalar(scalar) => Ok(Selector::Scalar(Arc::clone(scalar))),
        TypeDef::Enum(enumeration) => Ok(Selector::Enum(Arc::clone(enumeration))),
        TypeDef::InputObject(_) => Err(cx.error(
            CompileErrorKind::InvalidSelection,
            format!("input type \"{name}\" cannot be selected"),
        )),
        _ if !has_selection => Err(cx.error(
            CompileErrorKind::InvalidSelection,
            format!("field of type \"{name}\" must have a selection of subfields"),
        )),
        TypeDef::Object(object) => Ok(Selector::Object(compile_object(
            cx,
            inputs,
            object,
            &object.name,
            sets,
        )?)),
        TypeDef::Interface(interface) => {
            compile_interface(cx, inputs, interface, sets).map(Selector::Interface)
        }
        TypeDef::Union(union) => compile_union(cx, inputs, union, sets).map(Selector::Union),
    }
}

fn compile_interface<'a>(
    cx: CompileContext<'a>,
    inputs: &mut InputTable,
    interface: &InterfaceType,
    sets: &[Scoped<'a>],
) -> Result<AbstractSelector, CompileError> {
    let mut grouped = Grouped::new();
    for scoped in sets {
        collect_fields(
            cx,
            &interface.name,
            &interface.name,
            scoped.set,
            &scoped.conditions,
            &mut grouped,
        )?;
    }
    for occurrences in grouped.values() {
        let field = occurrences[0].field;
        if field.name.value != "__typename" && !interface.fields.contains_key(field.name.as_str()) {
            return Err(cx.at(field.name.span).error(
                CompileErrorKind::UnknownField,
                format!(
                    "cannot query field \"{}\" on type \"{}\"",
                    field.name, interface.name
                ),
            ));
        }
    }

    let mut by_type = FxHashMap::default();
    for name in &interface.implementers {
        if let Some(object) = cx.schema.object(name) {
            let selector = compile_object(cx, inputs, object, &interface.name, sets)?;
            by_type.insert(name.clone(), selector);
        }
    }
    Ok(AbstractSelector {
        type_name: interface.name.clone(),
        discriminator: Arc::clone(&interface.discriminator),
        by_type,
    })
}

fn compile_union<'a>(
    cx: CompileContext<'a>,
    inputs: &mut InputTable,
    union: &UnionType,
    sets: &[Scoped<'a>],
) -> Result<AbstractSelector, CompileError> {
    let mut grouped = Grouped::new();
    for scoped in sets {
        collect_fields(
            cx,
            &union.name,
            &union.name,
            scoped.set,
            &scoped.conditions,
            &mut grouped,
        )?;
    }
    if let Some(occurrences) = grouped.values().find(|o| o[0].field.name.value != "__typename") {
        let field = occurrences[0].field;
        return Err(cx.at(field.name.span).error(
            CompileErrorKind::InvalidSelection,
            format!(
                "cannot query field \"{}\" on union \"{}\"; select it inside a fragment",
                field.name, union.name
            ),
        ));
    }

    let mut by_type = FxHashMap::default();
    for name in &union.members {
        if let Some(object) = cx.schema.object(name) {
            let selector = compile_object(cx, inputs, object, &union.name, sets)?;
            by_type.insert(name.clone(), selector);
        }
    }
    Ok(AbstractSelector {
        type_name: union.name.clone(),
        discriminator: Arc::clone(&union.discriminator),
        by_type,
    })
}

/// Argument lists are equal when they bind the same names to equal values,
/// in any order.
fn same_arguments(a: &[ast::Argument], b: &[ast::Argument]) -> bool {
    a.len() == b.len()
        && a.iter().all(|x| {
            b.iter()
                .any(|y| x.name.value == y.name.value && same_value(&x.value, &y.value))
        })
}

#[allow(clippy::float_cmp)]
fn same_value(a: &ast::Value, b: &ast::Value) -> bool {
    use ast::Value as V;
    match (a, b) {
        (V::Variable(x), V::Variable(y)) | (V::Enum(x), V::Enum(y)) => x.value == y.value,
        (V::Int(x, _), V::Int(y, _)) => x == y,
        (V::Float(x, _), V::Float(y, _)) => x == y,
        (V::String(x, _), V::String(y, _)) => x == y,
        (V::Boolean(x, _), V::Boolean(y, _)) => x == y,
        (V::Null(_), V::Null(_)) => true,
        (V::List(x, _), V::List(y, _)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| same_value(x, y))
        }
        (V::Object(x, _), V::Object(y, _)) => {
            x.len() == y.len()
                && x.iter().all(|(name, value)| {
                    y.iter()
                        .any(|(other, w)| name.value == other.value && same_value(value, w))
                })
        }
        _ => false,
    }
}
