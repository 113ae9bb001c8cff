//! Execution engine for gqlx.
//!
//! This crate prepares GraphQL queries against a schema and executes them:
//! - `schema`: Schema definition, built-in scalars and validation
//! - `plan`: Compilation of operations into selector trees
//! - `exec`: The driver that applies selectors to resolved values
//! - `collector`: Incremental JSON output with non-null propagation
//! - `pending`: Values awaited after the synchronous phase
//! - `loader`: Batched loading of keyed values
//! - `batch`: Executing several queries in one pass
//! - `pool`: Reuse of collector allocations

mod argument;
pub mod batch;
pub mod collector;
pub mod context;
pub mod error;
mod exec;
pub mod listener;
pub mod literal;
pub mod loader;
pub mod pending;
mod plan;
pub mod pool;
pub mod prepare;
pub mod schema;
pub mod value;
pub mod variables;

pub use argument::InputObjectDecodeContext;
pub use batch::Batch;
pub use collector::{Collector, NodeId, ScalarSink};
pub use context::Context;
pub use error::{
    ArgumentError, CompileError, CompileErrorKind, ErrorKind, ExecutionError, FieldError,
    PathSegment, PrepareError, SchemaError, VariablesError,
};
pub use exec::ResolverContext;
pub use gqlx_syntax::OperationType;
pub use listener::{CompletionCallback, Listener, NoopListener, QueryField};
pub use literal::Literal;
pub use loader::{BatchLoader, Flush, LoaderListener};
pub use pool::PoolConfig;
pub use prepare::{prepare_query, PreparedQuery};
pub use schema::{
    ArgumentDef, EnumType, EnumValue, FieldDef, InputFieldDef, InputObjectType, InterfaceType,
    ObjectType, Resolver, ScalarType, Schema, SchemaBuilder, TypeDef, TypeRef, UnionType,
};
pub use value::{CollectableScalar, ListValue, TypedValue, Value};
pub use variables::{parse_variables, variables_from_json, Variables};
