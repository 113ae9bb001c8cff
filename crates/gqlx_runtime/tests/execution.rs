use gqlx_runtime::pending::{channel, deferred, ready, spawn};
use gqlx_runtime::{
    parse_variables, ArgumentDef, Batch, BatchLoader, CollectableScalar, CompletionCallback,
    Context, EnumType, ErrorKind, FieldDef, FieldError, InputFieldDef, InputObjectType,
    InterfaceType, Listener, LoaderListener, ObjectType, PreparedQuery, QueryField, ScalarSink,
    Schema, UnionType, Value, Variables,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Recording {
    idles: AtomicUsize,
    resolved: Mutex<Vec<String>>,
    errors: Mutex<Vec<FieldError>>,
}

impl Listener for Recording {
    fn notify_resolve(
        &self,
        field: &QueryField<'_>,
        _schema_field: &FieldDef,
    ) -> Result<Option<CompletionCallback>, FieldError> {
        self.resolved
            .lock()
            .unwrap()
            .push(format!("{}.{}", field.parent_type, field.response_key));
        Ok(None)
    }

    fn notify_idle(&self) {
        self.idles.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_error(&self, error: &FieldError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

fn schema() -> Arc<Schema> {
    Schema::builder("Query")
        .object(
            ObjectType::new("Query")
                .with_field(FieldDef::new("foo", "String"))
                .with_field(
                    FieldDef::new("fooWithArg", "String")
                        .with_argument(ArgumentDef::new("in", "String"))
                        .resolve_full(|rc, _| Ok(rc.argument("in").cloned().unwrap_or_default())),
                )
                .with_field(
                    FieldDef::new("required", "String")
                        .with_argument(ArgumentDef::new("in", "String!"))
                        .resolve_full(|rc, _| Ok(rc.argument("in").cloned().unwrap_or_default())),
                )
                .with_field(
                    FieldDef::new("asyncFooError", "String")
                        .resolve(|_| Ok(ready(Err(FieldError::new("Test Error"))))),
                )
                .with_field(
                    FieldDef::new("asyncFoo", "String").resolve(|_| Ok(spawn(|| Ok("later".into())))),
                )
                .with_field(FieldDef::new("fooList", "[String]").resolve(|_| {
                    let items = ["foo", "bar", "bang", "bleet", "frob", "splat", "baz"];
                    Ok(Value::list(items.into_iter().map(Value::from).collect()))
                }))
                .with_field(FieldDef::new("greeter", "Greeter").resolve(|_| {
                    Ok(Value::typed(
                        "Human",
                        Value::map([("greeting", Value::from("Hi"))]),
                    ))
                }))
                .with_field(FieldDef::new("needed", "Thing!"))
                .with_field(FieldDef::new("things", "[Thing!]"))
                .with_field(FieldDef::new("maybe", "Thing"))
                .with_field(FieldDef::new("search", "[SearchResult!]!"))
                .with_field(FieldDef::new("notAList", "[String]").resolve(|_| Ok("oops".into())))
                .with_field(
                    FieldDef::new("explode", "String").resolve(|_| panic!("kaboom")),
                )
                .with_field(FieldDef::new("color", "Color").resolve(|_| Ok("GREEN".into())))
                .with_field(
                    FieldDef::new("price", "Float").resolve(|_| Ok(Value::Scalar(Arc::new(Cents(1999))))),
                )
                .with_field(
                    FieldDef::new("span", "String")
                        .with_argument(ArgumentDef::new("range", "Range!"))
                        .resolve_full(|rc, _| {
                            let range = rc.argument("range").cloned().unwrap_or_default();
                            let from = range.get("from").and_then(Value::as_i64).unwrap_or(0);
                            let to = range.get("to").and_then(Value::as_i64).unwrap_or(0);
                            Ok(format!("{from}..{to}").into())
                        }),
                )
                .with_field(
                    FieldDef::new("never", "String").resolve(|_| {
                        let (sender, value) = channel();
                        std::mem::forget(sender);
                        Ok(value)
                    }),
                ),
        )
        .interface(InterfaceType::new("Greeter").with_field(FieldDef::new("greeting", "String!")))
        .object(
            ObjectType::new("Human")
                .implements("Greeter")
                .with_field(FieldDef::new("greeting", "String!")),
        )
        .object(
            ObjectType::new("Thing")
                .with_field(FieldDef::new("name", "String!"))
                .with_field(FieldDef::new("parts", "[Thing]")),
        )
        .union(
            UnionType::new("SearchResult")
                .with_member("Human")
                .with_member("Thing"),
        )
        .enumeration(EnumType::new("Color").with_value("RED").with_value("GREEN"))
        .input_object(
            InputObjectType::new("Range")
                .with_field(InputFieldDef::new("from", "Int!"))
                .with_field(InputFieldDef::new("to", "Int").with_default(10)),
        )
        .build()
        .unwrap()
}

#[derive(Debug)]
struct Cents(i64);

impl CollectableScalar for Cents {
    fn collect(&self, sink: ScalarSink<'_>) -> Result<(), FieldError> {
        sink.raw_json(&format!("{}.{:02}", self.0 / 100, self.0 % 100));
        Ok(())
    }
}

fn root() -> Value {
    let thing = |name: Value| Value::map([("name", name)]);
    Value::map([
        ("foo", Value::from("bar")),
        ("needed", thing(Value::Null)),
        (
            "things",
            Value::list(vec![thing("a".into()), thing(Value::Null)]),
        ),
        (
            "maybe",
            Value::map([
                ("name", Value::from("m")),
                (
                    "parts",
                    Value::list(vec![thing("p0".into()), thing(Value::Null)]),
                ),
            ]),
        ),
        (
            "search",
            Value::list(vec![
                Value::typed("Human", Value::map([("greeting", Value::from("Yo"))])),
                Value::typed("Robot", Value::Null),
            ]),
        ),
    ])
}

fn run_with(source: &str, variables: &str, ctx: &Context, listener: &dyn Listener) -> String {
    let query = PreparedQuery::prepare(&schema(), source, "").unwrap();
    let variables = parse_variables(variables).unwrap();
    let bytes = query.execute(ctx, root(), &variables, Some(listener));
    String::from_utf8(bytes).unwrap()
}

fn run(source: &str) -> String {
    run_with(source, "", &Context::new(), &Recording::default())
}

#[test]
fn test_simple_scalar() {
    insta::assert_snapshot!(run("{foo}"), @r#"{"data":{"foo":"bar"}}"#);
}

#[test]
fn test_argument_with_variable() {
    let out = run_with(
        "query($a: String){fooWithArg(in: $a)}",
        r#"{"a":"aVar"}"#,
        &Context::new(),
        &Recording::default(),
    );
    insta::assert_snapshot!(out, @r#"{"data":{"fooWithArg":"aVar"}}"#);
}

#[test]
fn test_async_error() {
    let listener = Recording::default();
    let out = run_with("{\n asyncFooError\n}", "", &Context::new(), &listener);
    insta::assert_snapshot!(
        out,
        @r#"{"data":{"asyncFooError":null},"errors":[{"message":"Test Error","path":["asyncFooError"],"locations":[{"line":2,"column":2}]}]}"#
    );
    assert_eq!(listener.idles.load(Ordering::SeqCst), 1);
    assert_eq!(listener.errors.lock().unwrap()[0].kind, ErrorKind::Async);
}

#[test]
fn test_list_of_scalars() {
    insta::assert_snapshot!(
        run("{fooList}"),
        @r#"{"data":{"fooList":["foo","bar","bang","bleet","frob","splat","baz"]}}"#
    );
}

#[test]
fn test_interface_discrimination() {
    insta::assert_snapshot!(
        run("{greeter { __typename ... on Human { greeting } }}"),
        @r#"{"data":{"greeter":{"__typename":"Human","greeting":"Hi"}}}"#
    );
}

#[test]
fn test_nullability_propagation() {
    insta::assert_snapshot!(
        run("{needed { name }}"),
        @r#"{"data":null,"errors":[{"message":"Not null field was null","path":["needed","name"],"locations":[{"line":1,"column":11}]}]}"#
    );
}

#[test]
fn test_listener_sees_every_reported_error() {
    for source in ["{needed { name }}", "{ foo things { name } }"] {
        let listener = Recording::default();
        let out = run_with(source, "", &Context::new(), &listener);
        let response: serde_json::Value = serde_json::from_str(&out).unwrap();
        let reported = response["errors"].as_array().map_or(0, Vec::len);
        let errors = listener.errors.lock().unwrap();
        assert_eq!(errors.len(), reported, "{source}");
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Nullability));
    }
}

#[test]
fn test_null_stops_at_nearest_optional_ancestor() {
    // `things` is a nullable list of non-null items: the list becomes null.
    insta::assert_snapshot!(
        run("{ foo things { name } }"),
        @r#"{"data":{"foo":"bar","things":null},"errors":[{"message":"Not null field was null","path":["things",1,"name"],"locations":[{"line":1,"column":16}]}]}"#
    );
    // `parts` items are nullable: only the offending item becomes null.
    insta::assert_snapshot!(
        run("{ maybe { parts { name } } }"),
        @r#"{"data":{"maybe":{"parts":[{"name":"p0"},null]}},"errors":[{"message":"Not null field was null","path":["maybe","parts",1,"name"],"locations":[{"line":1,"column":19}]}]}"#
    );
}

#[test]
fn test_union_members_and_type_errors() {
    insta::assert_snapshot!(
        run("{ search { __typename ... on Human { greeting } } }"),
        @r#"{"data":null,"errors":[{"message":"value of type \"Robot\" does not conform to \"SearchResult\"","path":["search",1],"locations":[{"line":1,"column":3}]}]}"#
    );
    insta::assert_snapshot!(
        run("{ notAList }"),
        @r#"{"data":{"notAList":null},"errors":[{"message":"expected a list, found string","path":["notAList"],"locations":[{"line":1,"column":3}]}]}"#
    );
}

#[test]
fn test_field_order_follows_selection() {
    insta::assert_snapshot!(
        run("{ z: foo color ...F a: foo } fragment F on Query { foo }"),
        @r#"{"data":{"z":"bar","color":"GREEN","foo":"bar","a":"bar"}}"#
    );
}

#[test]
fn test_leaf_outputs() {
    insta::assert_snapshot!(
        run("{ price color }"),
        @r#"{"data":{"price":19.99,"color":"GREEN"}}"#
    );
}

#[test]
fn test_argument_errors_skip_the_resolver() {
    let listener = Recording::default();
    let out = run_with(
        "query($v: String) { required(in: $v) }",
        "{}",
        &Context::new(),
        &listener,
    );
    insta::assert_snapshot!(
        out,
        @r#"{"data":{"required":null},"errors":[{"message":"argument \"in\": required value was not supplied","path":["required"],"locations":[{"line":1,"column":21}]}]}"#
    );
    assert_eq!(listener.errors.lock().unwrap()[0].kind, ErrorKind::Argument);
}

#[test]
fn test_input_object_arguments() {
    let out = run_with(
        "query($from: Int!) { a: span(range: {from: $from}) b: span(range: {from: 1, to: 2}) }",
        r#"{"from": 4}"#,
        &Context::new(),
        &Recording::default(),
    );
    insta::assert_snapshot!(out, @r#"{"data":{"a":"4..10","b":"1..2"}}"#);
}

#[test]
fn test_skip_and_include_with_variables() {
    let source = "query($s: Boolean!, $i: Boolean = false) { foo @skip(if: $s) color @include(if: $i) ... @include(if: true) { a: foo } }";
    let out = run_with(source, r#"{"s": true}"#, &Context::new(), &Recording::default());
    insta::assert_snapshot!(out, @r#"{"data":{"a":"bar"}}"#);
    let out = run_with(
        source,
        r#"{"s": false, "i": true}"#,
        &Context::new(),
        &Recording::default(),
    );
    insta::assert_snapshot!(out, @r#"{"data":{"foo":"bar","color":"GREEN","a":"bar"}}"#);
}

#[test]
fn test_panics_become_errors() {
    insta::assert_snapshot!(
        run("{ foo explode }"),
        @r#"{"data":{"foo":"bar","explode":null},"errors":[{"message":"kaboom","path":["explode"],"locations":[{"line":1,"column":7}]}]}"#
    );
}

#[test]
fn test_cancelled_context() {
    let ctx = Context::new();
    ctx.cancel();
    let listener = Recording::default();
    let out = run_with("{ foo }", "", &ctx, &listener);
    insta::assert_snapshot!(
        out,
        @r#"{"data":{"foo":null},"errors":[{"message":"context cancelled","path":["foo"],"locations":[{"line":1,"column":3}]}]}"#
    );
    // The resolver was never reached, but the listener was.
    assert_eq!(listener.resolved.lock().unwrap().len(), 1);
}

#[test]
fn test_deadline_interrupts_await() {
    let ctx = Context::new().with_timeout(Duration::from_millis(20));
    let out = run_with("{ never }", "", &ctx, &Recording::default());
    insta::assert_snapshot!(
        out,
        @r#"{"data":{"never":null},"errors":[{"message":"context deadline exceeded","path":["never"],"locations":[{"line":1,"column":3}]}]}"#
    );
}

#[test]
fn test_completion_callback_and_rejection() {
    struct Shouting;
    impl Listener for Shouting {
        fn notify_resolve(
            &self,
            field: &QueryField<'_>,
            _schema_field: &FieldDef,
        ) -> Result<Option<CompletionCallback>, FieldError> {
            match field.name {
                "color" => Err(FieldError::new("not allowed")),
                _ => Ok(Some(Box::new(|result| {
                    result.map(|v| {
                        let upper = v.as_str().map(str::to_uppercase);
                        upper.map_or(v, Value::from)
                    })
                }))),
            }
        }
    }
    let out = run_with("{ foo asyncFoo color }", "", &Context::new(), &Shouting);
    insta::assert_snapshot!(
        out,
        @r#"{"data":{"foo":"BAR","asyncFoo":"LATER","color":null},"errors":[{"message":"not allowed","path":["color"],"locations":[{"line":1,"column":16}]}]}"#
    );
}

#[test]
fn test_batch_preserves_order() {
    let schema = schema();
    let first = PreparedQuery::prepare(&schema, "{ asyncFoo }", "").unwrap();
    let second = PreparedQuery::prepare(&schema, "{ foo }", "").unwrap();
    let third = PreparedQuery::prepare(&schema, "{ asyncFooError }", "").unwrap();
    let variables = Variables::new();

    let mut batch = Batch::new();
    batch.add(&first, root(), &variables);
    batch.add(&second, root(), &variables);
    batch.add(&third, root(), &variables);
    let listener = Recording::default();
    let responses: Vec<String> = batch
        .execute(&Context::new(), Some(&listener))
        .into_iter()
        .map(|bytes| String::from_utf8(bytes).unwrap())
        .collect();

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0], r#"{"data":{"asyncFoo":"later"}}"#);
    assert_eq!(responses[1], r#"{"data":{"foo":"bar"}}"#);
    assert!(responses[2].starts_with(r#"{"data":{"asyncFooError":null},"errors""#));
    // Pending values of every query are awaited in one round.
    assert_eq!(listener.idles.load(Ordering::SeqCst), 1);
}

#[test]
fn test_idle_per_async_wave() {
    let schema = Schema::builder("Query")
        .object(ObjectType::new("Query").with_field(
            FieldDef::new("outer", "Outer").resolve(|_| Ok(deferred(|_| Ok(Value::map([("x", Value::Null)]))))),
        ))
        .object(ObjectType::new("Outer").with_field(
            FieldDef::new("inner", "String").resolve(|_| Ok(deferred(|_| Ok("deep".into())))),
        ))
        .build()
        .unwrap();
    let query = PreparedQuery::prepare(&schema, "{ outer { inner } }", "").unwrap();
    let listener = Recording::default();
    let out = query.execute(&Context::new(), Value::Null, &Variables::new(), Some(&listener));
    assert_eq!(out, br#"{"data":{"outer":{"inner":"deep"}}}"#);
    assert_eq!(listener.idles.load(Ordering::SeqCst), 2);
}

fn logged(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> FieldDef {
    let log = Arc::clone(log);
    FieldDef::new(name, "String").resolve(move |_| {
        log.lock().unwrap().push(format!("resolve {name}"));
        let log = Arc::clone(&log);
        Ok(deferred(move |_| {
            log.lock().unwrap().push(format!("complete {name}"));
            Ok(name.into())
        }))
    })
}

#[test]
fn test_mutation_fields_run_serially() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let schema = Schema::builder("Query")
        .mutation("Mutation")
        .object(
            ObjectType::new("Query")
                .with_field(logged(&log, "a"))
                .with_field(logged(&log, "b")),
        )
        .object(
            ObjectType::new("Mutation")
                .with_field(logged(&log, "a"))
                .with_field(logged(&log, "b")),
        )
        .build()
        .unwrap();

    let listener = Recording::default();
    let mutation = PreparedQuery::prepare(&schema, "mutation { a b }", "").unwrap();
    let out = mutation.execute(&Context::new(), Value::Null, &Variables::new(), Some(&listener));
    assert_eq!(out, br#"{"data":{"a":"a","b":"b"}}"#);
    assert_eq!(
        *log.lock().unwrap(),
        ["resolve a", "complete a", "resolve b", "complete b"]
    );
    assert_eq!(listener.idles.load(Ordering::SeqCst), 2);

    log.lock().unwrap().clear();
    let query = PreparedQuery::prepare(&schema, "{ a b }", "").unwrap();
    query.execute(&Context::new(), Value::Null, &Variables::new(), None);
    assert_eq!(
        *log.lock().unwrap(),
        ["resolve a", "resolve b", "complete a", "complete b"]
    );
}

#[test]
fn test_loader_coalesces_sibling_loads() {
    type UserLoader = BatchLoader<i64, Value>;
    let names: HashMap<i64, &str> = [(1, "Ada"), (2, "Bob"), (3, "Cy")].into();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);
    let loader: UserLoader = BatchLoader::new(move |ids: Vec<i64>| {
        recorded.lock().unwrap().push(ids.clone());
        Ok(ids
            .into_iter()
            .filter_map(|id| names.get(&id).map(|n| (id, Value::map([("name", Value::from(*n))]))))
            .collect())
    });

    let schema = Schema::builder("Query")
        .object(ObjectType::new("Query").with_field(FieldDef::new("users", "[User!]!")))
        .object(
            ObjectType::new("User")
                .with_field(FieldDef::new("name", "String"))
                .with_field(FieldDef::new("best", "User").resolve_with_context(|ctx, parent| {
                    let loader = ctx
                        .get::<UserLoader>()
                        .ok_or_else(|| FieldError::new("no loader"))?;
                    let id = parent.get("best").and_then(Value::as_i64).unwrap_or_default();
                    Ok(loader.load(id))
                })),
        )
        .build()
        .unwrap();

    let user = |name: &str, best: i64| Value::map([("name", Value::from(name)), ("best", Value::Int(best))]);
    let root = Value::map([(
        "users",
        Value::list(vec![user("Ada", 2), user("Bob", 3), user("Cy", 9)]),
    )]);
    let ctx = Context::new().with(loader.clone());
    let listener = LoaderListener::new().with_loader(loader.clone());
    let query = PreparedQuery::prepare(&schema, "{ users { name best { name } } }", "").unwrap();
    let out = query.execute(&ctx, root, &Variables::new(), Some(&listener));

    insta::assert_snapshot!(
        String::from_utf8(out).unwrap(),
        @r#"{"data":{"users":[{"name":"Ada","best":{"name":"Bob"}},{"name":"Bob","best":{"name":"Cy"}},{"name":"Cy","best":null}]}}"#
    );
    assert_eq!(*calls.lock().unwrap(), vec![vec![2, 3, 9]]);
    assert_eq!(loader.batches_dispatched(), 1);
}

#[test]
fn test_prepared_query_is_reusable_across_threads() {
    let query = Arc::new(PreparedQuery::prepare(&schema(), "query($a: String){fooWithArg(in: $a)}", "").unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let query = Arc::clone(&query);
            std::thread::spawn(move || {
                let variables = parse_variables(&format!(r#"{{"a": "v{i}"}}"#)).unwrap();
                let out = query.execute(&Context::new(), Value::Null, &variables, None);
                String::from_utf8(out).unwrap()
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(
            handle.join().unwrap(),
            format!(r#"{{"data":{{"fooWithArg":"v{i}"}}}}"#)
        );
    }
}
