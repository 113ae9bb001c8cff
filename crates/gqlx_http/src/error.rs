//! Error types for the HTTP layer.

use gqlx_runtime::VariablesError;
use hyper::StatusCode;
use thiserror::Error;

/// Errors raised while decoding a request or running the server.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("method not allowed; use GET or POST")]
    MethodNotAllowed,

    #[error("unsupported content type \"{0}\"; use application/json or application/graphql")]
    UnsupportedMediaType(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("missing \"query\"")]
    MissingQuery,

    #[error("empty batch")]
    EmptyBatch,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid query string: {0}")]
    InvalidQueryString(#[from] serde_urlencoded::de::Error),

    #[error("request body is not valid UTF-8")]
    InvalidUtf8,

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error(transparent)]
    Variables(#[from] VariablesError),

    #[error("invalid listen address \"{0}\"")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("execution task failed: {0}")]
    Execution(String),
}

impl HttpError {
    /// The status a response carrying this error is sent with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MissingQuery
            | Self::EmptyBatch
            | Self::InvalidJson(_)
            | Self::InvalidQueryString(_)
            | Self::InvalidUtf8
            | Self::Body(_)
            | Self::Variables(_) => StatusCode::BAD_REQUEST,
            Self::InvalidAddress(_)
            | Self::Bind { .. }
            | Self::Accept(_)
            | Self::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors_are_client_errors() {
        assert_eq!(HttpError::MissingQuery.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            HttpError::UnsupportedMediaType("text/plain".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        let err: HttpError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(err.to_string().starts_with("invalid JSON body"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
