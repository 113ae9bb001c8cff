//! Batched, cached loading of keyed values.
//!
//! [`BatchLoader::load`] does not call the batch function. It queues the key
//! and returns a pending value; queued keys are dispatched together when the
//! engine goes idle (see [`LoaderListener`]) or, failing that, when a pending
//! handle is first awaited.

use crate::context::Context;
use crate::error::FieldError;
use crate::listener::Listener;
use crate::pending::{ready, AsyncValue};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Loads the values of many keys at once. Keys missing from the returned
/// map resolve to null.
pub type BatchFn<K, V> = dyn Fn(Vec<K>) -> Result<HashMap<K, V>, FieldError> + Send + Sync;

const DEFAULT_MAX_BATCH_SIZE: usize = 100;
const WAIT_INTERVAL: Duration = Duration::from_millis(5);

enum Slot<V> {
    Queued,
    InFlight,
    Ready(Result<Option<V>, FieldError>),
}

struct State<K, V> {
    cache: FxHashMap<K, Slot<V>>,
    queue: Vec<K>,
}

struct Inner<K, V> {
    batch_fn: Box<BatchFn<K, V>>,
    state: Mutex<State<K, V>>,
    settled: Condvar,
    max_batch_size: AtomicUsize,
    batches: AtomicUsize,
}

/// A loader that batches and caches loads.
///
/// Cloning is cheap; clones share the queue and the cache. Errors returned
/// by the batch function are cached like values, until the key is cleared.
pub struct BatchLoader<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for BatchLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> BatchLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Into<Value> + Send + Sync + 'static,
{
    pub fn new<F>(batch_fn: F) -> Self
    where
        F: Fn(Vec<K>) -> Result<HashMap<K, V>, FieldError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                batch_fn: Box::new(batch_fn),
                state: Mutex::new(State {
                    cache: FxHashMap::default(),
                    queue: Vec::new(),
                }),
                settled: Condvar::new(),
                max_batch_size: AtomicUsize::new(DEFAULT_MAX_BATCH_SIZE),
                batches: AtomicUsize::new(0),
            }),
        }
    }

    /// Sets the maximum number of keys passed to one batch function call.
    #[must_use]
    pub fn with_max_batch_size(self, size: usize) -> Self {
        self.inner
            .max_batch_size
            .store(size.max(1), Ordering::Relaxed);
        self
    }

    /// Loads a value by key.
    ///
    /// A cached result is returned directly; otherwise the key is queued and
    /// a pending value is returned.
    pub fn load(&self, key: K) -> Value {
        let mut state = self.inner.lock();
        match state.cache.get(&key) {
            Some(Slot::Ready(result)) => {
                return match into_value(result.clone()) {
                    Ok(value) => value,
                    Err(err) => ready(Err(err)),
                };
            }
            Some(Slot::Queued | Slot::InFlight) => {}
            None => {
                state.cache.insert(key.clone(), Slot::Queued);
                state.queue.push(key.clone());
            }
        }
        drop(state);
        Value::pending(LoadHandle {
            inner: Arc::clone(&self.inner),
            key,
        })
    }

    /// Loads several keys; the result is a list of values in key order.
    pub fn load_many(&self, keys: impl IntoIterator<Item = K>) -> Value {
        Value::list(keys.into_iter().map(|key| self.load(key)).collect())
    }

    /// Caches a value for a key.
    pub fn prime(&self, key: K, value: V) {
        self.inner
            .lock()
            .cache
            .insert(key, Slot::Ready(Ok(Some(value))));
    }

    /// Forgets a cached result.
    pub fn clear_key(&self, key: &K) {
        let mut state = self.inner.lock();
        if matches!(state.cache.get(key), Some(Slot::Ready(_))) {
            state.cache.remove(key);
        }
    }

    /// Forgets every cached result.
    pub fn clear(&self) {
        self.inner
            .lock()
            .cache
            .retain(|_, slot| !matches!(slot, Slot::Ready(_)));
    }

    /// Dispatches the queued keys.
    pub fn flush(&self) {
        self.inner.dispatch();
    }

    /// Number of queued keys.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Number of batch function calls made so far.
    #[must_use]
    pub fn batches_dispatched(&self) -> usize {
        self.inner.batches.load(Ordering::Relaxed)
    }
}

fn into_value<V: Into<Value>>(result: Result<Option<V>, FieldError>) -> Result<Value, FieldError> {
    result.map(|value| value.map_or(Value::Null, Into::into))
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Into<Value> + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self) {
        let keys = {
            let mut state = self.lock();
            let keys = std::mem::take(&mut state.queue);
            for key in &keys {
                state.cache.insert(key.clone(), Slot::InFlight);
            }
            keys
        };
        if keys.is_empty() {
            return;
        }

        let size = self.max_batch_size.load(Ordering::Relaxed);
        for chunk in keys.chunks(size) {
            self.batches.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(keys = chunk.len(), "dispatching batch load");
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| (self.batch_fn)(chunk.to_vec())))
                .unwrap_or_else(|_| Err(FieldError::new("batch function panicked")));
            if let Err(err) = &result {
                tracing::warn!(%err, keys = chunk.len(), "batch load failed");
            }

            let mut state = self.lock();
            match result {
                Ok(mut values) => {
                    for key in chunk {
                        let value = values.remove(key);
                        state.cache.insert(key.clone(), Slot::Ready(Ok(value)));
                    }
                }
                Err(err) => {
                    for key in chunk {
                        state.cache.insert(key.clone(), Slot::Ready(Err(err.clone())));
                    }
                }
            }
            drop(state);
            self.settled.notify_all();
        }
    }

    fn await_key(&self, key: &K, ctx: &Context) -> Result<Value, FieldError> {
        let mut state = self.lock();
        loop {
            match state.cache.get(key) {
                Some(Slot::Ready(result)) => return into_value(result.clone()),
                Some(Slot::Queued) => {
                    drop(state);
                    self.dispatch();
                    state = self.lock();
                }
                Some(Slot::InFlight) => {
                    ctx.check()?;
                    state = self
                        .settled
                        .wait_timeout(state, WAIT_INTERVAL)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                // Cleared before it was awaited.
                None => {
                    state.cache.insert(key.clone(), Slot::Queued);
                    state.queue.push(key.clone());
                }
            }
        }
    }
}

/// The pending value returned by [`BatchLoader::load`].
struct LoadHandle<K, V> {
    inner: Arc<Inner<K, V>>,
    key: K,
}

impl<K, V> AsyncValue for LoadHandle<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Into<Value> + Send + Sync + 'static,
{
    fn await_value(&self, ctx: &Context) -> Result<Value, FieldError> {
        self.inner.await_key(&self.key, ctx)
    }
}

/// Something with queued work to dispatch.
pub trait Flush: Send + Sync {
    fn flush(&self);
}

impl<K, V> Flush for BatchLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Into<Value> + Send + Sync + 'static,
{
    fn flush(&self) {
        BatchLoader::flush(self);
    }
}

/// A listener that flushes its loaders whenever the engine goes idle.
///
/// Another listener can be wrapped to receive every other notification.
#[derive(Default)]
pub struct LoaderListener {
    loaders: Vec<Arc<dyn Flush>>,
    inner: Option<Arc<dyn Listener>>,
}

impl LoaderListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_loader(mut self, loader: impl Flush + 'static) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    #[must_use]
    pub fn wrapping(mut self, listener: Arc<dyn Listener>) -> Self {
        self.inner = Some(listener);
        self
    }
}

impl Listener for LoaderListener {
    fn notify_resolve(
        &self,
        field: &crate::listener::QueryField<'_>,
        schema_field: &crate::schema::FieldDef,
    ) -> Result<Option<crate::listener::CompletionCallback>, FieldError> {
        match &self.inner {
            Some(inner) => inner.notify_resolve(field, schema_field),
            None => Ok(None),
        }
    }

    fn notify_idle(&self) {
        for loader in &self.loaders {
            loader.flush();
        }
        if let Some(inner) = &self.inner {
            inner.notify_idle();
        }
    }

    fn notify_error(&self, error: &FieldError) {
        if let Some(inner) = &self.inner {
            inner.notify_error(error);
        }
    }
}
