//! Host Operations
//!
//! The reconciler never touches a real rendering backend. Everything it
//! does to the output goes through a [`HostOps`] implementation: creating
//! nodes, inserting and removing them, setting text and patching props.
//! Swapping the implementation retargets the renderer.
//!
//! [`MemoryHost`] is an in-memory tree that also records every operation it
//! receives, which is what the tests assert against.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::trace;

use crate::reactive::Value;

/// Handle to a node owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The capability set the reconciler renders through.
pub trait HostOps {
    fn create_element(&self, tag: &str) -> NodeId;
    fn create_text(&self, text: &str) -> NodeId;
    fn create_comment(&self, text: &str) -> NodeId;

    /// Replace the content of a text node.
    fn set_text(&self, node: NodeId, text: &str);

    /// Replace all children of an element with `text`.
    fn set_element_text(&self, el: NodeId, text: &str);

    /// Insert `node` into `parent` before `anchor`, or at the end. A node
    /// that already has a parent is moved.
    fn insert(&self, node: NodeId, parent: NodeId, anchor: Option<NodeId>);

    /// Detach `node` from its parent.
    fn remove(&self, node: NodeId);

    /// Apply a prop change. `next` of `None` removes the prop.
    fn patch_prop(&self, el: NodeId, key: &str, prev: Option<&Value>, next: Option<&Value>);

    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn set_scope_id(&self, _el: NodeId, _id: &str) {}
}

/// One operation received by a [`MemoryHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId, text: String },
    CreateComment { node: NodeId, text: String },
    SetText { node: NodeId, text: String },
    SetElementText { el: NodeId, text: String },
    Insert { node: NodeId, parent: NodeId, anchor: Option<NodeId> },
    Remove { node: NodeId },
    PatchProp { el: NodeId, key: String, prev: Option<Value>, next: Option<Value> },
    SetScopeId { el: NodeId, id: String },
}

#[derive(Debug, Clone)]
enum HostNodeKind {
    Root,
    Element(String),
    Text,
    Comment,
}

#[derive(Debug)]
struct HostNode {
    kind: HostNodeKind,
    text: String,
    props: IndexMap<String, Value>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    scope_id: Option<String>,
}

impl HostNode {
    fn new(kind: HostNodeKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
            props: IndexMap::new(),
            children: Vec::new(),
            parent: None,
            scope_id: None,
        }
    }
}

/// An in-memory host tree that records the operations applied to it.
#[derive(Default)]
pub struct MemoryHost {
    nodes: RefCell<HashMap<NodeId, HostNode>>,
    ops: RefCell<Vec<HostOp>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached container to render into. Not recorded.
    pub fn create_root(&self) -> NodeId {
        self.add(HostNode::new(HostNodeKind::Root, ""))
    }

    fn add(&self, node: HostNode) -> NodeId {
        let id = NodeId::new();
        self.nodes.borrow_mut().insert(id, node);
        id
    }

    /// Number of live nodes, containers included.
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    fn record(&self, op: HostOp) {
        trace!(?op, "host op");
        self.ops.borrow_mut().push(op);
    }

    /// Every operation recorded so far.
    pub fn ops(&self) -> Vec<HostOp> {
        self.ops.borrow().clone()
    }

    /// Every operation recorded so far, clearing the log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }

    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }

    /// Children of `node`, in order.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .borrow()
            .get(&node)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Text of `node` and all its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        collect_text(&nodes, node, &mut out);
        out
    }

    /// Value of prop `key` on `el`.
    pub fn prop(&self, el: NodeId, key: &str) -> Option<Value> {
        self.nodes.borrow().get(&el).and_then(|node| node.props.get(key).cloned())
    }

    pub fn scope_id(&self, el: NodeId) -> Option<String> {
        self.nodes.borrow().get(&el).and_then(|node| node.scope_id.clone())
    }

    /// Markup for `node` and its subtree. Handlers are left out.
    pub fn serialize(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        write_node(&nodes, node, &mut out);
        out
    }

    /// Call the `on<Event>` handler prop of `el`. Returns false if there is
    /// none.
    pub fn dispatch(&self, el: NodeId, event: &str, args: &[Value]) -> bool {
        let handler = self
            .prop(el, &handler_name(event))
            .and_then(|value| value.as_handler().cloned());
        match handler {
            Some(handler) => {
                handler.call(args);
                true
            }
            None => false,
        }
    }

    fn detach(nodes: &mut HashMap<NodeId, HostNode>, node: NodeId) {
        let parent = nodes.get_mut(&node).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|parent| nodes.get_mut(&parent)) {
            parent.children.retain(|child| *child != node);
        }
    }

    /// Forget `node` and all of its descendants.
    fn drop_subtree(nodes: &mut HashMap<NodeId, HostNode>, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(removed) = nodes.remove(&id) {
                stack.extend(removed.children);
            }
        }
    }
}

/// `click` → `onClick`.
pub(crate) fn handler_name(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_uppercase(), chars.as_str()),
        None => "on".to_string(),
    }
}

fn collect_text(nodes: &HashMap<NodeId, HostNode>, id: NodeId, out: &mut String) {
    let Some(node) = nodes.get(&id) else {
        return;
    };
    match node.kind {
        HostNodeKind::Text => out.push_str(&node.text),
        HostNodeKind::Comment => {}
        HostNodeKind::Root | HostNodeKind::Element(_) => {
            out.push_str(&node.text);
            for child in &node.children {
                collect_text(nodes, *child, out);
            }
        }
    }
}

fn write_node(nodes: &HashMap<NodeId, HostNode>, id: NodeId, out: &mut String) {
    let Some(node) = nodes.get(&id) else {
        return;
    };
    match &node.kind {
        HostNodeKind::Text => out.push_str(&node.text),
        HostNodeKind::Comment => {
            let _ = write!(out, "<!--{}-->", node.text);
        }
        HostNodeKind::Root => {
            for child in &node.children {
                write_node(nodes, *child, out);
            }
        }
        HostNodeKind::Element(tag) => {
            out.push('<');
            out.push_str(tag);
            for (key, value) in &node.props {
                if value.as_handler().is_some() {
                    continue;
                }
                let _ = write!(out, " {key}=\"{value}\"");
            }
            out.push('>');
            out.push_str(&node.text);
            for child in &node.children {
                write_node(nodes, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

impl HostOps for MemoryHost {
    fn create_element(&self, tag: &str) -> NodeId {
        let node = self.add(HostNode::new(HostNodeKind::Element(tag.to_string()), ""));
        self.record(HostOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text(&self, text: &str) -> NodeId {
        let node = self.add(HostNode::new(HostNodeKind::Text, text));
        self.record(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn create_comment(&self, text: &str) -> NodeId {
        let node = self.add(HostNode::new(HostNodeKind::Comment, text));
        self.record(HostOp::CreateComment {
            node,
            text: text.to_string(),
        });
        node
    }

    fn set_text(&self, node: NodeId, text: &str) {
        if let Some(host_node) = self.nodes.borrow_mut().get_mut(&node) {
            host_node.text = text.to_string();
        }
        self.record(HostOp::SetText {
            node,
            text: text.to_string(),
        });
    }

    fn set_element_text(&self, el: NodeId, text: &str) {
        {
            let mut nodes = self.nodes.borrow_mut();
            let children = nodes
                .get_mut(&el)
                .map(|node| std::mem::take(&mut node.children))
                .unwrap_or_default();
            for child in children {
                Self::drop_subtree(&mut nodes, child);
            }
            if let Some(node) = nodes.get_mut(&el) {
                node.text = text.to_string();
            }
        }
        self.record(HostOp::SetElementText {
            el,
            text: text.to_string(),
        });
    }

    fn insert(&self, node: NodeId, parent: NodeId, anchor: Option<NodeId>) {
        {
            let mut nodes = self.nodes.borrow_mut();
            Self::detach(&mut nodes, node);

            if let Some(parent_node) = nodes.get_mut(&parent) {
                let children = &parent_node.children;
                let position = anchor
                    .and_then(|anchor| children.iter().position(|child| *child == anchor))
                    .unwrap_or(children.len());
                parent_node.children.insert(position, node);
            }
            if let Some(host_node) = nodes.get_mut(&node) {
                host_node.parent = Some(parent);
            }
        }
        self.record(HostOp::Insert { node, parent, anchor });
    }

    fn remove(&self, node: NodeId) {
        {
            let mut nodes = self.nodes.borrow_mut();
            Self::detach(&mut nodes, node);
            Self::drop_subtree(&mut nodes, node);
        }
        self.record(HostOp::Remove { node });
    }

    fn patch_prop(&self, el: NodeId, key: &str, prev: Option<&Value>, next: Option<&Value>) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&el) {
            match next {
                Some(value) => {
                    node.props.insert(key.to_string(), value.clone());
                }
                None => {
                    node.props.shift_remove(key);
                }
            }
        }
        self.record(HostOp::PatchProp {
            el,
            key: key.to_string(),
            prev: prev.cloned(),
            next: next.cloned(),
        });
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(&node).and_then(|node| node.parent)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let nodes = self.nodes.borrow();
        let parent = nodes.get(&node)?.parent?;
        let siblings = &nodes.get(&parent)?.children;
        let position = siblings.iter().position(|child| *child == node)?;
        siblings.get(position + 1).copied()
    }

    fn set_scope_id(&self, el: NodeId, id: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&el) {
            node.scope_id = Some(id.to_string());
        }
        self.record(HostOp::SetScopeId {
            el,
            id: id.to_string(),
        });
    }
}
