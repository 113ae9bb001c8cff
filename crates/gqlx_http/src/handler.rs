//! GraphQL over HTTP, as a function of the request parts.
//!
//! `GET` reads `query`, `operationName` and `variables` from the query string.
//! `POST` accepts `application/json` (an object, or an array of objects for a
//! batch) and `application/graphql` (the raw document).

use crate::error::HttpError;
use crate::service::{GraphQLRequest, GraphQLService};
use bytes::Bytes;
use gqlx_core::LineCol;
use gqlx_runtime::{parse_variables, variables_from_json};
use hyper::header::{HeaderMap, HeaderValue, ACCEPT, ALLOW, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use serde::Deserialize;

/// Content type of every GraphQL response.
pub const CONTENT_TYPE_JSON: &str = "application/json;charset=utf-8";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetParams {
    query: Option<String>,
    operation_name: Option<String>,
    variables: Option<String>,
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostBody {
    query: Option<String>,
    #[serde(default)]
    operation_name: Option<String>,
    #[serde(default)]
    variables: serde_json::Value,
}

/// Handles one HTTP request.
pub fn handle(
    service: &GraphQLService,
    method: &Method,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Response<Bytes> {
    let result = match *method {
        Method::GET => handle_get(service, query, headers),
        Method::POST => handle_post(service, headers, body),
        _ => Err(HttpError::MethodNotAllowed),
    };
    result.unwrap_or_else(|err| error_response(&err))
}

fn handle_get(
    service: &GraphQLService,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<Response<Bytes>, HttpError> {
    let params: GetParams = serde_urlencoded::from_str(query.unwrap_or_default())?;
    if service.playground() && params.raw.is_none() && accepts_html(headers) {
        return Ok(response(
            StatusCode::OK,
            "text/html; charset=utf-8",
            Bytes::from_static(PLAYGROUND_HTML.as_bytes()),
        ));
    }

    let request = GraphQLRequest {
        query: params.query.ok_or(HttpError::MissingQuery)?,
        operation_name: params.operation_name.filter(|name| !name.is_empty()),
        variables: parse_variables(params.variables.as_deref().unwrap_or_default())?,
    };
    Ok(json_response(StatusCode::OK, service.execute(request)))
}

fn handle_post(
    service: &GraphQLService,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response<Bytes>, HttpError> {
    match media_type(headers).as_str() {
        "application/json" => {}
        "application/graphql" => {
            let query = std::str::from_utf8(body).map_err(|_| HttpError::InvalidUtf8)?;
            let out = service.execute(GraphQLRequest::new(query));
            return Ok(json_response(StatusCode::OK, out));
        }
        other => return Err(HttpError::UnsupportedMediaType(other.to_string())),
    }

    match serde_json::from_slice(body)? {
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Err(HttpError::EmptyBatch);
            }
            tracing::debug!(requests = items.len(), "batched request");
            let requests = items.into_iter().map(decode_post).collect();
            let responses = service.execute_all(requests);
            Ok(json_response(StatusCode::OK, join_array(responses)))
        }
        single => {
            let request = decode_post(single)?;
            Ok(json_response(StatusCode::OK, service.execute(request)))
        }
    }
}

fn decode_post(value: serde_json::Value) -> Result<GraphQLRequest, HttpError> {
    let body: PostBody = serde_json::from_value(value)?;
    Ok(GraphQLRequest {
        query: body.query.ok_or(HttpError::MissingQuery)?,
        operation_name: body.operation_name.filter(|name| !name.is_empty()),
        variables: variables_from_json(body.variables)?,
    })
}

fn join_array(responses: Vec<Vec<u8>>) -> Vec<u8> {
    let len = responses.iter().map(|r| r.len() + 1).sum::<usize>() + 1;
    let mut out = Vec::with_capacity(len);
    out.push(b'[');
    for (i, response) in responses.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(&response);
    }
    out.push(b']');
    out
}

/// The media type of the request body, lowercased and without parameters.
fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/html"))
}

fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Bytes> {
    response(status, CONTENT_TYPE_JSON, Bytes::from(body))
}

/// Answers with the error as a GraphQL error body.
pub(crate) fn error_response(err: &HttpError) -> Response<Bytes> {
    let body = crate::service::error_body(&err.to_string(), LineCol::UNKNOWN);
    let mut response = json_response(err.status(), body);
    if matches!(err, HttpError::MethodNotAllowed) {
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET, POST"));
    }
    response
}

const PLAYGROUND_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>gqlx</title>
    <style>
        * { box-sizing: border-box; }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 960px; margin: 0 auto; padding: 2rem; background: #fafafa; }
        h1 { color: #1a1a1a; border-bottom: 2px solid #10b981; padding-bottom: 0.5rem; }
        textarea { width: 100%; font-family: ui-monospace, monospace; font-size: 0.9rem; padding: 0.75rem; border-radius: 6px; border: 1px solid #d1d5db; }
        button { background: #10b981; color: white; border: 0; padding: 0.5rem 1.25rem; border-radius: 6px; cursor: pointer; margin: 0.75rem 0; }
        pre { background: #1e293b; color: #e2e8f0; padding: 1rem; border-radius: 6px; overflow-x: auto; font-size: 0.85rem; min-height: 4rem; }
    </style>
</head>
<body>
    <h1>gqlx</h1>
    <textarea id="query" rows="10">{ __typename }</textarea>
    <textarea id="variables" rows="3" placeholder="variables (JSON)"></textarea>
    <button id="run">Run</button>
    <pre id="result"></pre>
    <script>
        document.getElementById('run').addEventListener('click', async () => {
            const variables = document.getElementById('variables').value.trim();
            const response = await fetch(window.location.pathname, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({
                    query: document.getElementById('query').value,
                    variables: variables ? JSON.parse(variables) : null,
                }),
            });
            const text = await response.text();
            try {
                document.getElementById('result').textContent = JSON.stringify(JSON.parse(text), null, 2);
            } catch (_) {
                document.getElementById('result').textContent = text;
            }
        });
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use gqlx_runtime::{ArgumentDef, FieldDef, ObjectType, Schema, Value};

    fn service() -> GraphQLService {
        let schema = Schema::builder("Query")
            .object(
                ObjectType::new("Query")
                    .with_field(
                        FieldDef::new("greet", "String")
                            .with_argument(ArgumentDef::new("name", "String").with_default("you"))
                            .resolve_full(|rc, _| {
                                let name = rc.argument("name").and_then(Value::as_str).unwrap_or("?");
                                Ok(format!("hello {name}").into())
                            }),
                    ),
            )
            .build()
            .unwrap();
        GraphQLService::new(schema)
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    fn body(response: &Response<Bytes>) -> &str {
        std::str::from_utf8(response.body()).unwrap()
    }

    fn post_json(json: &str) -> Response<Bytes> {
        let headers = headers(&[("content-type", "application/json")]);
        handle(&service(), &Method::POST, None, &headers, json.as_bytes())
    }

    #[test]
    fn test_get() {
        let response = handle(
            &service(),
            &Method::GET,
            Some("query=query(%24n%3A%20String)%7Bgreet(name%3A%20%24n)%7D&variables=%7B%22n%22%3A%22Ann%22%7D"),
            &HeaderMap::new(),
            b"",
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], CONTENT_TYPE_JSON);
        insta::assert_snapshot!(body(&response), @r#"{"data":{"greet":"hello Ann"}}"#);
    }

    #[test]
    fn test_get_serves_playground_to_browsers() {
        let browser = headers(&[("accept", "text/html,application/xhtml+xml")]);
        let response = handle(&service(), &Method::GET, Some("query=%7Bgreet%7D"), &browser, b"");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");

        let response = handle(&service(), &Method::GET, Some("query=%7Bgreet%7D&raw"), &browser, b"");
        insta::assert_snapshot!(body(&response), @r#"{"data":{"greet":"hello you"}}"#);

        let quiet = service().with_playground(false);
        let response = handle(&quiet, &Method::GET, Some("query=%7Bgreet%7D"), &browser, b"");
        assert_eq!(response.headers()[CONTENT_TYPE], CONTENT_TYPE_JSON);
    }

    #[test]
    fn test_post_json() {
        let response = post_json(r#"{"query":"query Q($n: String){greet(name: $n)}","operationName":"Q","variables":{"n":"Bo"}}"#);
        assert_eq!(response.status(), StatusCode::OK);
        insta::assert_snapshot!(body(&response), @r#"{"data":{"greet":"hello Bo"}}"#);
    }

    #[test]
    fn test_post_graphql() {
        let headers = headers(&[("content-type", "application/graphql; charset=utf-8")]);
        let response = handle(&service(), &Method::POST, None, &headers, b"{ greet }");
        insta::assert_snapshot!(body(&response), @r#"{"data":{"greet":"hello you"}}"#);
    }

    #[test]
    fn test_post_batch() {
        let response = post_json(r#"[{"query":"{greet}"},{"variables":{}},{"query":"{a: greet(name: \"Cy\")}"}]"#);
        assert_eq!(response.status(), StatusCode::OK);
        insta::assert_snapshot!(
            body(&response),
            @r#"[{"data":{"greet":"hello you"}},{"errors":[{"message":"missing \"query\""}]},{"data":{"a":"hello Cy"}}]"#
        );
    }

    #[test]
    fn test_rejected_requests() {
        let response = handle(&service(), &Method::PUT, None, &HeaderMap::new(), b"");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST");

        let text = headers(&[("content-type", "text/plain")]);
        let response = handle(&service(), &Method::POST, None, &text, b"{ greet }");
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = post_json("{");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(&response).starts_with(r#"{"errors":[{"message":"invalid JSON body"#));

        let response = post_json("[]");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = post_json(r#"{"query":"{greet}","variables":[1]}"#);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        insta::assert_snapshot!(
            body(&response),
            @r#"{"errors":[{"message":"variables must be a JSON object or null, found list"}]}"#
        );

        let response = handle(&service(), &Method::GET, None, &HeaderMap::new(), b"");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_query_errors_are_ok_responses() {
        let response = post_json(r#"{"query":"{ greet("}"#);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(&response).starts_with(r#"{"errors":[{"message":"syntax error"#));
    }

    #[test]
    fn test_deeply_nested_document_is_rejected() {
        let depth = 50_000;
        let document = format!("{}{}", "{a".repeat(depth), "}".repeat(depth));
        let headers = headers(&[("content-type", "application/graphql")]);
        let response = handle(&service(), &Method::POST, None, &headers, document.as_bytes());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(&response).contains("levels deep"));
    }
}
