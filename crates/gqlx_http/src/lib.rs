//! GraphQL over HTTP for gqlx.
//!
//! - `service`: The schema, root value and per-request setup behind an endpoint
//! - `handler`: Request decoding and response encoding, independent of the transport
//! - `server`: A hyper HTTP/1 server that runs the handler on the blocking pool
//! - `error`: Request and server errors

pub mod error;
pub mod handler;
pub mod server;
pub mod service;

pub use error::HttpError;
pub use handler::{handle, CONTENT_TYPE_JSON};
pub use server::{serve, Server, ServerConfig};
pub use service::{GraphQLRequest, GraphQLService};
