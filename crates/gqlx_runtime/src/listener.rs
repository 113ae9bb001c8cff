//! Execution hooks.

use crate::error::FieldError;
use crate::schema::FieldDef;
use crate::value::Value;
use gqlx_core::LineCol;

/// Receives the final result of a resolved field and may replace it.
pub type CompletionCallback =
    Box<dyn FnOnce(Result<Value, FieldError>) -> Result<Value, FieldError> + Send>;

/// The field about to be resolved.
#[derive(Debug, Clone, Copy)]
pub struct QueryField<'a> {
    pub name: &'a str,
    pub response_key: &'a str,
    pub location: LineCol,
    pub parent_type: &'a str,
}

/// Observes execution.
///
/// All methods have no-op defaults. The engine calls them from the thread
/// that drives execution.
pub trait Listener: Send + Sync {
    /// Called before a field's resolver runs.
    ///
    /// Returning an error fails the field without calling the resolver. A
    /// returned callback sees the field's final value, after any pending
    /// value was awaited.
    fn notify_resolve(
        &self,
        _field: &QueryField<'_>,
        _schema_field: &FieldDef,
    ) -> Result<Option<CompletionCallback>, FieldError> {
        Ok(None)
    }

    /// Called each time the engine is about to block on pending values.
    /// This is where batched loads should be dispatched.
    fn notify_idle(&self) {}

    /// Called for every error recorded in the response.
    fn notify_error(&self, _error: &FieldError) {}
}

/// A listener that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl Listener for NoopListener {}
