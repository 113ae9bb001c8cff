//! Executing several prepared queries together.
//!
//! The queries of a batch share one driver loop, so pending values from all
//! of them are awaited in the same rounds and loaders see their keys at once.

use crate::collector::NodeId;
use crate::context::Context;
use crate::exec::{execute_root, Continuation, Exec, Frame};
use crate::listener::{Listener, NoopListener};
use crate::pool;
use crate::prepare::PreparedQuery;
use crate::value::Value;
use crate::variables::Variables;

struct Entry<'a> {
    query: &'a PreparedQuery,
    root: Value,
    variables: &'a Variables,
}

/// A set of queries executed together.
#[derive(Default)]
pub struct Batch<'a> {
    entries: Vec<Entry<'a>>,
}

impl<'a> Batch<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a query, executed against `root` with `variables`.
    pub fn add(&mut self, query: &'a PreparedQuery, root: Value, variables: &'a Variables) {
        self.entries.push(Entry {
            query,
            root,
            variables,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Executes every query and returns one serialized response per query,
    /// in the order they were added.
    pub fn execute(&self, ctx: &Context, listener: Option<&dyn Listener>) -> Vec<Vec<u8>> {
        let listener = listener.unwrap_or(&NoopListener);
        let mut collectors: Vec<_> = self.entries.iter().map(|_| pool::acquire()).collect();
        let roots: Vec<NodeId> = collectors.iter_mut().map(|c| c.root()).collect();
        tracing::debug!(queries = self.entries.len(), "executing batch");

        let mut exec = Exec::new(ctx, listener, collectors);
        let mut pending = Vec::new();
        for (qid, entry) in self.entries.iter().enumerate() {
            let frame = Frame {
                qid,
                query: entry.query,
                variables: entry.variables,
            };
            if let Some(continuation) = execute_root(&mut exec, frame, &entry.root, roots[qid]) {
                pending.push(continuation);
            }
        }
        exec.run(Continuation::all(pending));

        exec.into_collectors()
            .into_iter()
            .zip(roots)
            .zip(&self.entries)
            .map(|((mut collector, root), entry)| {
                let (response, errors) = collector.finish_with(root, Some(listener));
                tracing::debug!(
                    operation = entry.query.name().unwrap_or("<anonymous>"),
                    errors = errors.len(),
                    bytes = response.len(),
                    "query executed"
                );
                pool::release(collector);
                response
            })
            .collect()
    }
}
