//! Incremental JSON output with deferred nullability handling.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Primitive values
//! are serialized into the shared buffer as soon as they are set; objects and
//! arrays record their children and are emitted depth-first by
//! [`Collector::finish`], which also applies non-null propagation: a required
//! node holding null discards its parent's output, up to the nearest optional
//! ancestor, which is written as `null` instead.

use crate::error::{ExecutionError, FieldError, PathSegment};
use crate::listener::Listener;
use crate::literal::as_integer;
use gqlx_core::LineCol;
use std::ops::Range;
use std::sync::Arc;

/// Address of a node in a [`Collector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
enum NodeState {
    Unset,
    Null,
    /// Serialized bytes in the shared buffer.
    Bytes(Range<usize>),
    /// Index into `Collector::errors`.
    Error(usize),
    Object(Vec<(Arc<str>, NodeId)>),
    Array(Vec<NodeId>),
    /// Omitted from the parent object.
    Skipped,
}

#[derive(Debug)]
struct Node {
    state: NodeState,
    required: Option<LineCol>,
    depth: usize,
}

/// Marker for a required node that turned out null.
struct RequiredNull;

/// Incremental response writer.
#[derive(Debug, Default)]
pub struct Collector {
    buf: Vec<u8>,
    nodes: Vec<Node>,
    errors: Vec<Option<ExecutionError>>,
    spare_fields: Vec<Vec<(Arc<str>, NodeId)>>,
    spare_items: Vec<Vec<NodeId>>,
}

impl Collector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new root node at depth zero.
    pub fn root(&mut self) -> NodeId {
        self.push(0)
    }

    fn push(&mut self, depth: usize) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Node {
            state: NodeState::Unset,
            required: None,
            depth,
        });
        id
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    fn assign(&mut self, id: NodeId, state: NodeState) {
        let node = self.node_mut(id);
        assert!(
            matches!(node.state, NodeState::Unset),
            "collector node {id:?} assigned twice"
        );
        node.state = state;
    }

    /// Number of nodes allocated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Marks a node as non-null. A null found there at serialization time is
    /// reported at `location`.
    pub fn set_required(&mut self, id: NodeId, location: LineCol) {
        self.node_mut(id).required = Some(location);
    }

    #[must_use]
    pub fn depth(&self, id: NodeId) -> usize {
        self.nodes[id.index()].depth
    }

    pub fn set_null(&mut self, id: NodeId) {
        self.assign(id, NodeState::Null);
    }

    pub fn set_skipped(&mut self, id: NodeId) {
        self.assign(id, NodeState::Skipped);
    }

    fn set_bytes(&mut self, id: NodeId, write: impl FnOnce(&mut Vec<u8>)) {
        let start = self.buf.len();
        write(&mut self.buf);
        let end = self.buf.len();
        self.assign(id, NodeState::Bytes(start..end));
    }

    pub fn set_bool(&mut self, id: NodeId, value: bool) {
        self.set_bytes(id, |buf| {
            buf.extend_from_slice(if value { b"true" } else { b"false" });
        });
    }

    pub fn set_int(&mut self, id: NodeId, value: i64) {
        self.set_bytes(id, |buf| buf.extend_from_slice(value.to_string().as_bytes()));
    }

    /// Writes a number; integral values are written without a fraction.
    /// Non-finite numbers are written as null.
    pub fn set_float(&mut self, id: NodeId, value: f64) {
        if !value.is_finite() {
            return self.set_null(id);
        }
        match as_integer(value) {
            Some(int) => self.set_int(id, int),
            None => self.set_bytes(id, |buf| write_json(buf, &value)),
        }
    }

    pub fn set_string(&mut self, id: NodeId, value: &str) {
        self.set_bytes(id, |buf| write_json(buf, value));
    }

    /// Writes pre-serialized JSON.
    pub fn set_raw_json(&mut self, id: NodeId, json: &str) {
        if json.trim() == "null" {
            return self.set_null(id);
        }
        self.set_bytes(id, |buf| buf.extend_from_slice(json.as_bytes()));
    }

    /// Records an error at a node, replacing whatever value or
    /// sub-collector it held. A node holds at most one error.
    pub fn set_error(&mut self, id: NodeId, error: FieldError, location: LineCol) {
        let depth = self.depth(id);
        let index = self.errors.len();
        self.errors
            .push(Some(ExecutionError::at_depth(error, location, depth)));
        let node = self.node_mut(id);
        let previous = std::mem::replace(&mut node.state, NodeState::Error(index));
        match previous {
            NodeState::Object(fields) => self.recycle_fields(fields),
            NodeState::Array(items) => self.recycle_items(items),
            NodeState::Error(_) => panic!("collector node {id:?} assigned twice"),
            _ => {}
        }
    }

    /// Turns a node into an object with room for `capacity` fields.
    pub fn begin_object(&mut self, id: NodeId, capacity: usize) {
        let mut fields = self.spare_fields.pop().unwrap_or_default();
        fields.reserve(capacity);
        self.assign(id, NodeState::Object(fields));
    }

    /// Adds a field to an object node and returns the field's node.
    pub fn add_field(&mut self, object: NodeId, key: Arc<str>) -> NodeId {
        let child = self.push(self.depth(object) + 1);
        match &mut self.node_mut(object).state {
            NodeState::Object(fields) => fields.push((key, child)),
            other => panic!("collector node {object:?} is not an object ({other:?})"),
        }
        child
    }

    /// Turns a node into an array with room for `len` items.
    pub fn begin_array(&mut self, id: NodeId, len: usize) {
        let mut items = self.spare_items.pop().unwrap_or_default();
        items.reserve(len);
        self.assign(id, NodeState::Array(items));
    }

    /// Appends an item to an array node and returns the item's node.
    pub fn add_item(&mut self, array: NodeId) -> NodeId {
        let child = self.push(self.depth(array) + 1);
        match &mut self.node_mut(array).state {
            NodeState::Array(items) => items.push(child),
            other => panic!("collector node {array:?} is not an array ({other:?})"),
        }
        child
    }

    fn recycle_fields(&mut self, mut fields: Vec<(Arc<str>, NodeId)>) {
        fields.clear();
        self.spare_fields.push(fields);
    }

    fn recycle_items(&mut self, mut items: Vec<NodeId>) {
        items.clear();
        self.spare_items.push(items);
    }

    /// Serializes `{"data":...,"errors":[...]}` for the tree under `root`.
    ///
    /// The response is appended to the shared buffer and copied out. Errors
    /// appear in the order they are met during serialization.
    pub fn finish(&mut self, root: NodeId) -> (Vec<u8>, Vec<ExecutionError>) {
        self.finish_with(root, None)
    }

    /// Like [`finish`](Self::finish), reporting each null found in a
    /// required position to `listener`.
    pub fn finish_with(
        &mut self,
        root: NodeId,
        listener: Option<&dyn Listener>,
    ) -> (Vec<u8>, Vec<ExecutionError>) {
        let start = self.buf.len();
        self.buf.extend_from_slice(b"{\"data\":");
        let data_start = self.buf.len();

        let mut errors = Vec::new();
        let mut writer = Writer {
            nodes: &self.nodes,
            pending: &mut self.errors,
            buf: &mut self.buf,
            errors: &mut errors,
            listener,
        };
        if writer.write(root).is_err() {
            self.buf.truncate(data_start);
            self.buf.extend_from_slice(b"null");
        }

        if !errors.is_empty() {
            self.buf.extend_from_slice(b",\"errors\":");
            write_json(&mut self.buf, &errors);
        }
        self.buf.push(b'}');
        (self.buf[start..].to_vec(), errors)
    }

    /// Clears the collector for reuse, keeping its allocations.
    pub(crate) fn reset(&mut self) {
        let mut nodes = std::mem::take(&mut self.nodes);
        for node in nodes.drain(..) {
            match node.state {
                NodeState::Object(fields) => self.recycle_fields(fields),
                NodeState::Array(items) => self.recycle_items(items),
                _ => {}
            }
        }
        self.nodes = nodes;
        self.buf.clear();
        self.errors.clear();
    }

    pub(crate) fn buffer_capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub(crate) fn node_capacity(&self) -> usize {
        self.nodes.capacity()
    }
}

fn write_json<T: serde::Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) {
    if let Err(err) = serde_json::to_writer(&mut *buf, value) {
        tracing::error!(%err, "failed to serialize response value");
        buf.extend_from_slice(b"null");
    }
}

struct Writer<'a> {
    nodes: &'a [Node],
    pending: &'a mut [Option<ExecutionError>],
    buf: &'a mut Vec<u8>,
    errors: &'a mut Vec<ExecutionError>,
    listener: Option<&'a dyn Listener>,
}

impl Writer<'_> {
    fn write(&mut self, id: NodeId) -> Result<(), RequiredNull> {
        let nodes = self.nodes;
        let node = &nodes[id.index()];
        match &node.state {
            NodeState::Unset | NodeState::Null | NodeState::Skipped => self.null(node),
            NodeState::Bytes(range) => {
                self.buf.extend_from_within(range.clone());
                Ok(())
            }
            NodeState::Error(index) => {
                if let Some(error) = self.pending[*index].take() {
                    self.errors.push(error);
                }
                if node.required.is_some() {
                    return Err(RequiredNull);
                }
                self.buf.extend_from_slice(b"null");
                Ok(())
            }
            NodeState::Object(fields) => {
                let mark = self.buf.len();
                self.buf.push(b'{');
                let mut failed = false;
                let mut first = true;
                for (key, child) in fields {
                    if matches!(nodes[child.index()].state, NodeState::Skipped) {
                        continue;
                    }
                    if !first {
                        self.buf.push(b',');
                    }
                    first = false;
                    write_json(self.buf, key.as_ref());
                    self.buf.push(b':');
                    let before = self.errors.len();
                    failed |= self.write(*child).is_err();
                    self.stamp(before, node.depth, || PathSegment::Key(key.to_string()));
                }
                self.buf.push(b'}');
                self.close(node, mark, failed)
            }
            NodeState::Array(items) => {
                let mark = self.buf.len();
                self.buf.push(b'[');
                let mut failed = false;
                for (index, child) in items.iter().enumerate() {
                    if index > 0 {
                        self.buf.push(b',');
                    }
                    let before = self.errors.len();
                    failed |= self.write(*child).is_err();
                    self.stamp(before, node.depth, || PathSegment::Index(index));
                }
                self.buf.push(b']');
                self.close(node, mark, failed)
            }
        }
    }

    fn null(&mut self, node: &Node) -> Result<(), RequiredNull> {
        if let Some(location) = node.required {
            let error = FieldError::not_null();
            if let Some(listener) = self.listener {
                listener.notify_error(&error);
            }
            self.errors
                .push(ExecutionError::at_depth(error, location, node.depth));
            return Err(RequiredNull);
        }
        self.buf.extend_from_slice(b"null");
        Ok(())
    }

    /// Writes this level's path component into errors raised below it.
    fn stamp(&mut self, from: usize, depth: usize, segment: impl Fn() -> PathSegment) {
        for error in &mut self.errors[from..] {
            if let Some(slot) = error.path.get_mut(depth) {
                *slot = segment();
            }
        }
    }

    /// Finishes a container whose output started at `mark`. A failed child
    /// nulls the container, or fails it too when it is itself required.
    fn close(&mut self, node: &Node, mark: usize, failed: bool) -> Result<(), RequiredNull> {
        if !failed {
            return Ok(());
        }
        self.buf.truncate(mark);
        if node.required.is_some() {
            return Err(RequiredNull);
        }
        self.buf.extend_from_slice(b"null");
        Ok(())
    }
}

/// Writes a scalar value directly into its response node.
///
/// Each method consumes the sink, so a scalar writes at most once.
pub struct ScalarSink<'a> {
    collector: &'a mut Collector,
    node: NodeId,
}

impl<'a> ScalarSink<'a> {
    pub(crate) fn new(collector: &'a mut Collector, node: NodeId) -> Self {
        Self { collector, node }
    }

    pub fn null(self) {
        self.collector.set_null(self.node);
    }

    pub fn bool(self, value: bool) {
        self.collector.set_bool(self.node, value);
    }

    pub fn int(self, value: i64) {
        self.collector.set_int(self.node, value);
    }

    pub fn float(self, value: f64) {
        self.collector.set_float(self.node, value);
    }

    pub fn string(self, value: &str) {
        self.collector.set_string(self.node, value);
    }

    /// Writes pre-serialized JSON. The caller guarantees it is valid.
    pub fn raw_json(self, json: &str) {
        self.collector.set_raw_json(self.node, json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    fn finish(collector: &mut Collector, root: NodeId) -> String {
        String::from_utf8(collector.finish(root).0).unwrap()
    }

    #[test]
    fn test_objects_and_arrays() {
        let mut c = Collector::new();
        let root = c.root();
        c.begin_object(root, 3);
        let a = c.add_field(root, key("a"));
        c.set_string(a, "x\"y");
        let b = c.add_field(root, key("b"));
        c.begin_array(b, 2);
        let b0 = c.add_item(b);
        c.set_float(b0, 1.5);
        let b1 = c.add_item(b);
        c.set_float(b1, 2.0);
        let skipped = c.add_field(root, key("s"));
        c.set_skipped(skipped);
        let n = c.add_field(root, key("n"));
        c.set_null(n);
        assert_eq!(
            finish(&mut c, root),
            r#"{"data":{"a":"x\"y","b":[1.5,2],"n":null}}"#
        );
    }

    #[test]
    fn test_required_null_bubbles_to_optional_ancestor() {
        let mut c = Collector::new();
        let root = c.root();
        c.begin_object(root, 2);
        let ok = c.add_field(root, key("ok"));
        c.set_bool(ok, true);
        let outer = c.add_field(root, key("outer"));
        c.begin_object(outer, 1);
        let list = c.add_field(outer, key("list"));
        c.set_required(list, LineCol::new(1, 10));
        c.begin_array(list, 2);
        let first = c.add_item(list);
        c.set_int(first, 1);
        let second = c.add_item(list);
        c.set_required(second, LineCol::new(1, 12));
        c.set_null(second);

        let (bytes, errors) = c.finish(root);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"data":{"ok":true,"outer":null},"errors":[{"message":"Not null field was null","path":["outer","list",1],"locations":[{"line":1,"column":12}]}]}"#
        );
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_required_null_at_top_level_nulls_data() {
        let mut c = Collector::new();
        let root = c.root();
        c.begin_object(root, 1);
        let needed = c.add_field(root, key("needed"));
        c.set_required(needed, LineCol::new(1, 2));
        c.begin_object(needed, 1);
        let name = c.add_field(needed, key("name"));
        c.set_required(name, LineCol::new(1, 11));
        c.set_null(name);
        assert_eq!(
            finish(&mut c, root),
            r#"{"data":null,"errors":[{"message":"Not null field was null","path":["needed","name"],"locations":[{"line":1,"column":11}]}]}"#
        );
    }

    #[test]
    fn test_error_replaces_sub_collector() {
        let mut c = Collector::new();
        let root = c.root();
        c.begin_object(root, 1);
        let field = c.add_field(root, key("f"));
        c.begin_object(field, 1);
        let inner = c.add_field(field, key("g"));
        c.set_int(inner, 1);
        c.set_error(field, FieldError::new("boom"), LineCol::UNKNOWN);
        assert_eq!(
            finish(&mut c, root),
            r#"{"data":{"f":null},"errors":[{"message":"boom","path":["f"]}]}"#
        );
    }

    #[test]
    fn test_required_error_is_reported_once() {
        let mut c = Collector::new();
        let root = c.root();
        c.begin_object(root, 1);
        let field = c.add_field(root, key("f"));
        c.set_required(field, LineCol::new(1, 3));
        c.set_error(field, FieldError::new("boom"), LineCol::new(1, 3));
        let (bytes, errors) = c.finish(root);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"data":null,"errors":[{"message":"boom","path":["f"],"locations":[{"line":1,"column":3}]}]}"#
        );
        assert_eq!(errors[0].kind, crate::error::ErrorKind::Resolve);
    }

    #[test]
    #[should_panic(expected = "assigned twice")]
    fn test_double_assignment_panics() {
        let mut c = Collector::new();
        let root = c.root();
        c.set_int(root, 1);
        c.set_int(root, 2);
    }

    #[test]
    fn test_reset_reuses_buffers() {
        let mut c = Collector::new();
        let root = c.root();
        c.begin_object(root, 4);
        let f = c.add_field(root, key("f"));
        c.set_raw_json(f, "[1,2]");
        assert_eq!(finish(&mut c, root), r#"{"data":{"f":[1,2]}}"#);

        c.reset();
        assert!(c.is_empty());
        let root = c.root();
        c.set_null(root);
        assert_eq!(finish(&mut c, root), r#"{"data":null}"#);
    }
}
