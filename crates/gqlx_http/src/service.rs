//! The executable side of an endpoint.

use crate::error::HttpError;
use gqlx_core::LineCol;
use gqlx_runtime::{Batch, Context, Listener, PreparedQuery, Schema, Value, Variables};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

type ContextFactory = dyn Fn() -> Context + Send + Sync;
type ListenerFactory = dyn Fn(&Context) -> Box<dyn Listener> + Send + Sync;

/// A decoded GraphQL request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphQLRequest {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Variables,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }
}

/// Executes requests against a schema and root value.
///
/// Every request, or every batch, gets a fresh [`Context`] from the context
/// factory, so per-request state such as loaders is never shared.
pub struct GraphQLService {
    schema: Arc<Schema>,
    root: Value,
    context: Box<ContextFactory>,
    listener: Option<Box<ListenerFactory>>,
    timeout: Option<Duration>,
    playground: bool,
}

impl GraphQLService {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            root: Value::Null,
            context: Box::new(Context::new),
            listener: None,
            timeout: None,
            playground: true,
        }
    }

    /// Sets the value root fields are resolved against.
    #[must_use]
    pub fn with_root(mut self, root: Value) -> Self {
        self.root = root;
        self
    }

    /// Sets how the context of each request is built.
    #[must_use]
    pub fn with_context<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Context + Send + Sync + 'static,
    {
        self.context = Box::new(factory);
        self
    }

    /// Sets how the listener of each request is built from its context.
    #[must_use]
    pub fn with_listener<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Context) -> Box<dyn Listener> + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(factory));
        self
    }

    /// Bounds the execution time of each request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables or disables the HTML query page.
    #[must_use]
    pub fn with_playground(mut self, enabled: bool) -> Self {
        self.playground = enabled;
        self
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn playground(&self) -> bool {
        self.playground
    }

    /// Executes one request and returns the serialized response.
    pub fn execute(&self, request: GraphQLRequest) -> Vec<u8> {
        self.execute_all(vec![Ok(request)])
            .pop()
            .unwrap_or_default()
    }

    /// Executes several requests in one batch, returning one response per
    /// entry in order. Entries that failed to decode answer with their error.
    pub fn execute_all(&self, requests: Vec<Result<GraphQLRequest, HttpError>>) -> Vec<Vec<u8>> {
        let prepared: Vec<_> = requests
            .into_iter()
            .map(|request| match request {
                Ok(request) => self.prepare(request),
                Err(err) => Err(error_body(&err.to_string(), LineCol::UNKNOWN)),
            })
            .collect();

        let ctx = self.context();
        let listener = self.listener.as_ref().map(|factory| factory(&ctx));
        let mut batch = Batch::new();
        for (query, variables) in prepared.iter().filter_map(|p| p.as_ref().ok()) {
            batch.add(query, self.root.clone(), variables);
        }
        let mut executed = batch.execute(&ctx, listener.as_deref()).into_iter();

        prepared
            .iter()
            .map(|entry| match entry {
                Ok(_) => executed.next().unwrap_or_default(),
                Err(body) => body.clone(),
            })
            .collect()
    }

    fn context(&self) -> Context {
        let ctx = (self.context)();
        match self.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    fn prepare(&self, request: GraphQLRequest) -> Result<(PreparedQuery, Variables), Vec<u8>> {
        let operation_name = request.operation_name.as_deref().unwrap_or_default();
        match PreparedQuery::prepare(&self.schema, &request.query, operation_name) {
            Ok(query) => {
                tracing::debug!(
                    operation = query.name().unwrap_or("<anonymous>"),
                    "request prepared"
                );
                Ok((query, request.variables))
            }
            Err(err) => {
                tracing::debug!(%err, "request rejected");
                Err(error_body(&err.to_string(), err.location()))
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    errors: [ErrorEntry<'a>; 1],
}

#[derive(Serialize)]
struct ErrorEntry<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    locations: Vec<LineCol>,
}

/// Serializes `{"errors":[{"message":...}]}` for a request that never ran.
pub(crate) fn error_body(message: &str, location: LineCol) -> Vec<u8> {
    let body = ErrorBody {
        errors: [ErrorEntry {
            message,
            locations: if location.is_known() {
                vec![location]
            } else {
                Vec::new()
            },
        }],
    };
    serde_json::to_vec(&body).unwrap_or_else(|_| br#"{"errors":[{"message":"internal error"}]}"#.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlx_runtime::{FieldDef, ObjectType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> GraphQLService {
        let schema = Schema::builder("Query")
            .object(ObjectType::new("Query").with_field(FieldDef::new("hello", "String")))
            .build()
            .unwrap();
        GraphQLService::new(schema).with_root(Value::map([("hello", Value::from("world"))]))
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_execute() {
        let out = service().execute(GraphQLRequest::new("{ hello }"));
        insta::assert_snapshot!(text(out), @r#"{"data":{"hello":"world"}}"#);
    }

    #[test]
    fn test_prepare_errors_have_no_data() {
        let out = service().execute(GraphQLRequest::new("{ nope }"));
        insta::assert_snapshot!(
            text(out),
            @r#"{"errors":[{"message":"cannot query field \"nope\" on type \"Query\"","locations":[{"line":1,"column":3}]}]}"#
        );
        let out = service().execute(GraphQLRequest::new("query A { hello } query B { hello }"));
        insta::assert_snapshot!(
            text(out),
            @r#"{"errors":[{"message":"operation name is required when the document contains more than one operation"}]}"#
        );
    }

    #[test]
    fn test_batch_keeps_order_and_shares_one_context() {
        let contexts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&contexts);
        let service = service().with_context(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Context::new()
        });
        let out: Vec<String> = service
            .execute_all(vec![
                Ok(GraphQLRequest::new("{ hello }")),
                Err(HttpError::MissingQuery),
                Ok(GraphQLRequest::new("{ a: hello }")),
            ])
            .into_iter()
            .map(text)
            .collect();
        assert_eq!(
            out,
            [
                r#"{"data":{"hello":"world"}}"#,
                r#"{"errors":[{"message":"missing \"query\""}]}"#,
                r#"{"data":{"a":"world"}}"#,
            ]
        );
        assert_eq!(contexts.load(Ordering::SeqCst), 1);
    }
}
