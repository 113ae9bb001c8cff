//! HTTP/1 server.
//!
//! Routes:
//! - `<path>` (default `/graphql`): GraphQL over HTTP, see [`crate::handler`]
//! - `GET /health`: liveness check

use crate::error::HttpError;
use crate::handler::{error_response, handle};
use crate::service::GraphQLService;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on. `0` picks a free port.
    pub port: u16,
    /// Path of the GraphQL endpoint.
    pub path: String,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            path: "/graphql".to_string(),
            max_body_bytes: 1 << 20,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    fn addr(&self) -> Result<SocketAddr, HttpError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| HttpError::InvalidAddress(addr))
    }
}

/// A bound server, not yet accepting connections.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, HttpError> {
        let addr = config.addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HttpError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, HttpError> {
        self.listener.local_addr().map_err(HttpError::Accept)
    }

    /// Accepts connections until accepting fails.
    pub async fn run(self, service: Arc<GraphQLService>) -> Result<(), HttpError> {
        let addr = self.local_addr()?;
        info!("listening on http://{}{}", addr, self.config.path);
        if service.playground() {
            info!("query page: http://{}{}", addr, self.config.path);
        }

        loop {
            let (stream, peer) = self.listener.accept().await.map_err(HttpError::Accept)?;
            let service = Arc::clone(&service);
            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let handler = service_fn(move |req: Request<Incoming>| {
                    let service = Arc::clone(&service);
                    let config = Arc::clone(&config);
                    async move { Ok::<_, Infallible>(route(service, &config, req).await) }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, handler).await {
                    if !err.is_incomplete_message() {
                        error!(%peer, "connection error: {err}");
                    }
                }
            });
        }
    }
}

/// Binds `config` and serves `service` until accepting fails.
pub async fn serve(service: Arc<GraphQLService>, config: ServerConfig) -> Result<(), HttpError> {
    Server::bind(config).await?.run(service).await
}

async fn route(
    service: Arc<GraphQLService>,
    config: &ServerConfig,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path();

    if path == "/health" {
        let mut response = Response::new(Bytes::from_static(br#"{"status":"healthy"}"#));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return response.map(Full::new);
    }
    if path != config.path {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return response;
    }

    let body = match Limited::new(body, config.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            debug!(limit = config.max_body_bytes, "request body too large");
            return error_response(&HttpError::PayloadTooLarge(config.max_body_bytes)).map(Full::new);
        }
        Err(err) => {
            return error_response(&HttpError::Body(err.to_string())).map(Full::new);
        }
    };

    debug!(method = %parts.method, bytes = body.len(), "graphql request");
    let executed = tokio::task::spawn_blocking(move || {
        handle(
            &service,
            &parts.method,
            parts.uri.query(),
            &parts.headers,
            &body,
        )
    })
    .await;

    match executed {
        Ok(response) => response.map(Full::new),
        Err(err) => {
            error!("execution task failed: {err}");
            error_response(&HttpError::Execution(err.to_string())).map(Full::new)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new()
            .with_host("0.0.0.0")
            .with_port(8080)
            .with_path("/gql");
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:8080");
        assert_eq!(config.path, "/gql");

        let err = ServerConfig::new().with_host("not a host").addr().unwrap_err();
        assert!(matches!(err, HttpError::InvalidAddress(_)));
    }
}
