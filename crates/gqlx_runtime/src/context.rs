//! Request-scoped context: typed data, cancellation and deadlines.

use crate::error::FieldError;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The external context passed to resolvers and to every await.
///
/// Cloning is cheap and clones share the cancellation flag, so a clone moved
/// into a worker thread observes `cancel()` on the original.
///
/// # Example
///
/// ```
/// use gqlx_runtime::Context;
///
/// struct UserId(u64);
///
/// let ctx = Context::new().with(UserId(7));
/// assert_eq!(ctx.get::<UserId>().map(|u| u.0), Some(7));
/// assert!(ctx.check().is_ok());
///
/// ctx.cancel();
/// assert!(ctx.check().is_err());
/// ```
#[derive(Clone, Default)]
pub struct Context {
    data: FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any value of the same type.
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Stores a value, replacing any value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.data.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Gets a reference to a value by type.
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Returns true if the context contains a value of the given type.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.data.contains_key(&TypeId::of::<T>())
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns an error if the context was cancelled or its deadline passed.
    pub fn check(&self) -> Result<(), FieldError> {
        if self.is_cancelled() {
            return Err(FieldError::cancelled());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(FieldError::deadline_exceeded()),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("data_count", &self.data.len())
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    #[test]
    fn test_typed_data() {
        let ctx = Context::new().with(Tenant("a")).with(Tenant("b"));
        assert_eq!(ctx.get::<Tenant>(), Some(&Tenant("b")));
        assert!(!ctx.contains::<String>());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let ctx = Context::new();
        let clone = ctx.clone();
        ctx.cancel();
        assert_eq!(clone.check(), Err(FieldError::cancelled()));
    }

    #[test]
    fn test_deadline() {
        let ctx = Context::new().with_deadline(Instant::now());
        assert_eq!(ctx.check(), Err(FieldError::deadline_exceeded()));

        let ctx = Context::new().with_timeout(Duration::from_secs(60));
        assert!(ctx.check().is_ok());
    }
}
