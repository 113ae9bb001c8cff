use gqlx_http::{GraphQLService, Server, ServerConfig};
use gqlx_runtime::{FieldDef, ObjectType, Schema, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start(config: ServerConfig) -> SocketAddr {
    let schema = Schema::builder("Query")
        .object(ObjectType::new("Query").with_field(FieldDef::new("ping", "String")))
        .build()
        .unwrap();
    let service = GraphQLService::new(schema).with_root(Value::map([("ping", Value::from("pong"))]));
    let server = Server::bind(config.with_port(0)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run(Arc::new(service)));
    addr
}

async fn send(addr: SocketAddr, request: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

fn post(path: &str, content_type: &str, body: &str) -> String {
    format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

#[tokio::test]
async fn test_post_over_tcp() {
    let addr = start(ServerConfig::new()).await;
    let response = send(addr, post("/graphql", "application/json", r#"{"query":"{ ping }"}"#)).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response
        .to_ascii_lowercase()
        .contains("content-type: application/json;charset=utf-8"));
    insta::assert_snapshot!(body(&response), @r#"{"data":{"ping":"pong"}}"#);
}

#[tokio::test]
async fn test_routes_and_limits() {
    let addr = start(ServerConfig::new().with_path("/gql").with_max_body_bytes(16)).await;

    let response = send(
        addr,
        "GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    assert_eq!(body(&response), r#"{"status":"healthy"}"#);

    let response = send(addr, post("/graphql", "application/json", "{}")).await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    let response = send(
        addr,
        post("/gql", "application/json", r#"{"query":"{ ping ping ping }"}"#),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 413"), "{response}");

    let response = send(
        addr,
        "DELETE /gql HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 405"), "{response}");
    assert!(response.to_ascii_lowercase().contains("allow: get, post"));
}
