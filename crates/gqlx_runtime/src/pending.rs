//! Pending values: handles to work whose result is awaited later.
//!
//! A resolver suspends the depth-first walk by returning
//! [`Value::Pending`]. The driver awaits the handle only after every
//! synchronous resolve of the current phase has run and listeners were told
//! the engine is idle.

use crate::context::Context;
use crate::error::FieldError;
use crate::value::Value;
use std::future::Future;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

/// Interval at which a blocked await re-checks its context.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A handle to a value produced elsewhere.
///
/// `await_value` blocks the calling thread. Implementations must return the
/// context error once the context is cancelled or past its deadline.
pub trait AsyncValue: Send + Sync {
    fn await_value(&self, ctx: &Context) -> Result<Value, FieldError>;
}

/// An already computed result.
#[derive(Debug, Clone)]
pub struct Ready(Result<Value, FieldError>);

impl AsyncValue for Ready {
    fn await_value(&self, _ctx: &Context) -> Result<Value, FieldError> {
        self.0.clone()
    }
}

/// Creates a pending value that resolves to `result`.
#[must_use]
pub fn ready(result: Result<Value, FieldError>) -> Value {
    Value::pending(Ready(result))
}

/// A pending value fed through a channel.
pub struct ChannelValue {
    receiver: Mutex<Option<Receiver<Result<Value, FieldError>>>>,
    result: OnceLock<Result<Value, FieldError>>,
}

impl AsyncValue for ChannelValue {
    fn await_value(&self, ctx: &Context) -> Result<Value, FieldError> {
        if let Some(result) = self.result.get() {
            return result.clone();
        }

        let mut guard = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished while we waited for the lock.
        if let Some(result) = self.result.get() {
            return result.clone();
        }
        let Some(receiver) = guard.as_ref() else {
            return Err(FieldError::async_error("pending value was already consumed"));
        };

        let result = loop {
            ctx.check()?;
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(result) => break result,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(FieldError::async_error(
                        "pending value was dropped before it produced a result",
                    ))
                }
            }
        };
        *guard = None;
        self.result.get_or_init(|| result).clone()
    }
}

/// Creates a pending value and the sender that completes it.
#[must_use]
pub fn channel() -> (Sender<Result<Value, FieldError>>, Value) {
    let (sender, receiver) = mpsc::channel();
    let value = ChannelValue {
        receiver: Mutex::new(Some(receiver)),
        result: OnceLock::new(),
    };
    (sender, Value::pending(value))
}

/// Runs `f` on a new thread and returns a pending value for its result.
pub fn spawn<F>(f: F) -> Value
where
    F: FnOnce() -> Result<Value, FieldError> + Send + 'static,
{
    let (sender, value) = channel();
    std::thread::spawn(move || {
        // The receiver is gone when the execution was abandoned.
        let _ = sender.send(f());
    });
    value
}

/// Spawns `future` on a tokio runtime and returns a pending value for its output.
pub fn from_future<F>(handle: &tokio::runtime::Handle, future: F) -> Value
where
    F: Future<Output = Result<Value, FieldError>> + Send + 'static,
{
    let (sender, value) = channel();
    handle.spawn(async move {
        let _ = sender.send(future.await);
    });
    value
}

/// A computation deferred until it is first awaited.
pub struct Deferred<F> {
    compute: Mutex<Option<F>>,
    result: OnceLock<Result<Value, FieldError>>,
}

impl<F> AsyncValue for Deferred<F>
where
    F: FnOnce(&Context) -> Result<Value, FieldError> + Send,
{
    fn await_value(&self, ctx: &Context) -> Result<Value, FieldError> {
        if let Some(result) = self.result.get() {
            return result.clone();
        }
        ctx.check()?;
        let mut guard = self.compute.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = self.result.get() {
            return result.clone();
        }
        match guard.take() {
            Some(compute) => {
                let result = compute(ctx);
                self.result.get_or_init(|| result).clone()
            }
            // The computation panicked on another thread.
            None => Err(FieldError::async_error("deferred value failed")),
        }
    }
}

/// Creates a pending value computed on the awaiting thread when first awaited.
pub fn deferred<F>(compute: F) -> Value
where
    F: FnOnce(&Context) -> Result<Value, FieldError> + Send + 'static,
{
    Value::pending(Deferred {
        compute: Mutex::new(Some(compute)),
        result: OnceLock::new(),
    })
}
