//! Virtual Nodes
//!
//! A [`VNode`] describes one piece of rendered output: an element, a text
//! node, a comment, or a component. Render functions build a fresh tree of
//! vnodes on every pass; the reconciler compares it with the previous tree
//! and applies the difference to the host.
//!
//! # Identity
//!
//! Two vnodes can be patched into each other only if they have the same
//! type and the same `key` ([`is_same_vnode_type`]). Otherwise the old one
//! is unmounted and the new one mounted fresh.
//!
//! # Shape Flags
//!
//! Every vnode carries [`ShapeFlags`] describing what it is and what kind
//! of children it has, so the reconciler can dispatch without re-inspecting
//! the type.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;

use super::component::{ComponentDef, ComponentInstance};
use super::host::NodeId;
use crate::app::AppContext;
use crate::reactive::Value;

/// Attribute and event props of a vnode, in insertion order.
pub type Props = IndexMap<String, Value>;

/// Shared handle to a vnode.
pub type VNodeRef = Rc<VNode>;

/// Prop name that carries the reconciliation key. Never sent to the host.
pub const KEY_PROP: &str = "key";

bitflags! {
    /// What a vnode is, and what its children look like.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u16 {
        const ELEMENT             = 1;
        const FUNCTIONAL_COMPONENT = 1 << 1;
        const STATEFUL_COMPONENT  = 1 << 2;
        const TEXT_CHILDREN       = 1 << 3;
        const ARRAY_CHILDREN      = 1 << 4;
        const TEXT                = 1 << 5;
        const COMMENT             = 1 << 6;
        const COMPONENT = Self::FUNCTIONAL_COMPONENT.bits() | Self::STATEFUL_COMPONENT.bits();
    }
}

/// The type of a vnode.
#[derive(Clone)]
pub enum VNodeType {
    /// A host element with the given tag.
    Element(Rc<str>),
    Text,
    Comment,
    Component(Rc<ComponentDef>),
}

impl VNodeType {
    pub fn is_same(&self, other: &VNodeType) -> bool {
        match (self, other) {
            (VNodeType::Element(a), VNodeType::Element(b)) => a == b,
            (VNodeType::Text, VNodeType::Text) => true,
            (VNodeType::Comment, VNodeType::Comment) => true,
            (VNodeType::Component(a), VNodeType::Component(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn shape(&self) -> ShapeFlags {
        match self {
            VNodeType::Element(_) => ShapeFlags::ELEMENT,
            VNodeType::Text => ShapeFlags::TEXT,
            VNodeType::Comment => ShapeFlags::COMMENT,
            VNodeType::Component(def) if def.is_functional() => ShapeFlags::FUNCTIONAL_COMPONENT,
            VNodeType::Component(_) => ShapeFlags::STATEFUL_COMPONENT,
        }
    }
}

impl fmt::Debug for VNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeType::Element(tag) => write!(f, "Element({tag})"),
            VNodeType::Text => f.write_str("Text"),
            VNodeType::Comment => f.write_str("Comment"),
            VNodeType::Component(def) => write!(f, "Component({})", def.name()),
        }
    }
}

impl From<&str> for VNodeType {
    fn from(tag: &str) -> Self {
        VNodeType::Element(tag.into())
    }
}

impl From<String> for VNodeType {
    fn from(tag: String) -> Self {
        VNodeType::Element(tag.into())
    }
}

impl From<Rc<ComponentDef>> for VNodeType {
    fn from(def: Rc<ComponentDef>) -> Self {
        VNodeType::Component(def)
    }
}

impl From<&Rc<ComponentDef>> for VNodeType {
    fn from(def: &Rc<ComponentDef>) -> Self {
        VNodeType::Component(Rc::clone(def))
    }
}

/// Reconciliation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VKey {
    Str(Rc<str>),
    Int(i64),
}

impl VKey {
    fn from_value(value: &Value) -> Option<VKey> {
        match value {
            Value::Null => None,
            Value::Str(s) => Some(VKey::Str(s.clone())),
            number @ Value::Number(_) => Some(match number.as_i64() {
                Some(n) => VKey::Int(n),
                None => VKey::Str(number.to_string().into()),
            }),
            other => Some(VKey::Str(other.to_string().into())),
        }
    }
}

/// Children of a vnode.
#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    None,
    Text(String),
    Nodes(Vec<VNodeRef>),
}

impl Children {
    pub fn as_nodes(&self) -> &[VNodeRef] {
        match self {
            Children::Nodes(nodes) => nodes,
            _ => &[],
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }

    fn shape(&self) -> ShapeFlags {
        match self {
            Children::None => ShapeFlags::empty(),
            Children::Text(_) => ShapeFlags::TEXT_CHILDREN,
            Children::Nodes(_) => ShapeFlags::ARRAY_CHILDREN,
        }
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Children::None
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::Text(text.to_string())
    }
}

impl From<String> for Children {
    fn from(text: String) -> Self {
        Children::Text(text)
    }
}

impl From<Value> for Children {
    fn from(value: Value) -> Self {
        Children::Text(value.to_string())
    }
}

impl From<Vec<VNodeRef>> for Children {
    fn from(nodes: Vec<VNodeRef>) -> Self {
        Children::Nodes(nodes)
    }
}

impl<const N: usize> From<[VNodeRef; N]> for Children {
    fn from(nodes: [VNodeRef; N]) -> Self {
        Children::Nodes(nodes.into())
    }
}

/// One node of a render tree.
pub struct VNode {
    pub(crate) node_type: VNodeType,
    pub(crate) props: Rc<Props>,
    pub(crate) children: Children,
    pub(crate) key: Option<VKey>,
    pub(crate) shape_flag: ShapeFlags,

    /// Host node once mounted. For components, the root host node of the
    /// rendered subtree.
    pub(crate) el: Cell<Option<NodeId>>,

    /// The instance behind a component vnode, once mounted.
    pub(crate) component: RefCell<Option<Rc<ComponentInstance>>>,

    /// Set on the root vnode by the application shell.
    pub(crate) app_context: RefCell<Option<Rc<AppContext>>>,
}

impl VNode {
    pub fn node_type(&self) -> &VNodeType {
        &self.node_type
    }

    pub fn props(&self) -> &Rc<Props> {
        &self.props
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    pub fn key(&self) -> Option<&VKey> {
        self.key.as_ref()
    }

    pub fn shape_flag(&self) -> ShapeFlags {
        self.shape_flag
    }

    /// Host node, once mounted.
    pub fn el(&self) -> Option<NodeId> {
        self.el.get()
    }

    pub fn component(&self) -> Option<Rc<ComponentInstance>> {
        self.component.borrow().clone()
    }

    pub fn is_component(&self) -> bool {
        self.shape_flag.intersects(ShapeFlags::COMPONENT)
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("type", &self.node_type)
            .field("key", &self.key)
            .field("props", &self.props)
            .field("children", &self.children)
            .field("el", &self.el.get())
            .finish()
    }
}

/// Build a vnode, classifying its shape from the type and children.
pub fn create_vnode(node_type: VNodeType, props: Props, children: Children) -> VNodeRef {
    create_vnode_with(node_type, Rc::new(props), children)
}

/// Like [`create_vnode`], with props that may be shared with another vnode.
///
/// A component vnode whose props are the same `Rc` as its previous
/// version's skips re-rendering.
pub fn create_vnode_with(node_type: VNodeType, props: Rc<Props>, children: Children) -> VNodeRef {
    let key = props.get(KEY_PROP).and_then(VKey::from_value);
    let shape_flag = node_type.shape() | children.shape();
    Rc::new(VNode {
        node_type,
        props,
        children,
        key,
        shape_flag,
        el: Cell::new(None),
        component: RefCell::new(None),
        app_context: RefCell::new(None),
    })
}

/// Build an element or component vnode.
///
/// ```rust
/// use weft_core::prelude::*;
///
/// let item = h("li", props([("key", "a"), ("class", "item")]), "a");
/// assert!(item.shape_flag().contains(ShapeFlags::ELEMENT | ShapeFlags::TEXT_CHILDREN));
/// ```
pub fn h(node_type: impl Into<VNodeType>, props: Props, children: impl Into<Children>) -> VNodeRef {
    create_vnode(node_type.into(), props, children.into())
}

/// A text vnode.
pub fn text(content: impl Into<String>) -> VNodeRef {
    create_vnode(VNodeType::Text, Props::new(), Children::Text(content.into()))
}

/// A comment vnode, used as a placeholder.
pub fn comment(content: impl Into<String>) -> VNodeRef {
    create_vnode(VNodeType::Comment, Props::new(), Children::Text(content.into()))
}

/// Build props from key/value pairs.
pub fn props<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Props
where
    K: Into<String>,
    V: Into<Value>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Whether `a` can be patched into `b`: same type and same key.
pub fn is_same_vnode_type(a: &VNode, b: &VNode) -> bool {
    a.node_type.is_same(&b.node_type) && a.key == b.key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_shapes_follow_children() {
        let with_text = h("p", Props::new(), "hello");
        assert_eq!(with_text.shape_flag(), ShapeFlags::ELEMENT | ShapeFlags::TEXT_CHILDREN);

        let with_nodes = h("ul", Props::new(), vec![text("a")]);
        assert_eq!(with_nodes.shape_flag(), ShapeFlags::ELEMENT | ShapeFlags::ARRAY_CHILDREN);

        let empty = h("br", Props::new(), ());
        assert_eq!(empty.shape_flag(), ShapeFlags::ELEMENT);
    }

    #[test]
    fn text_and_comment_shapes() {
        assert!(text("a").shape_flag().contains(ShapeFlags::TEXT));
        assert!(comment("v-if").shape_flag().contains(ShapeFlags::COMMENT));
    }

    #[test]
    fn component_shapes() {
        let stateful = Rc::new(ComponentDef::new("Stateful"));
        let functional = Rc::new(ComponentDef::functional("Functional", |_| text("x")));

        let stateful_node = h(&stateful, Props::new(), ());
        let functional_node = h(&functional, Props::new(), ());
        assert!(stateful_node.shape_flag().contains(ShapeFlags::STATEFUL_COMPONENT));
        assert!(functional_node.shape_flag().contains(ShapeFlags::FUNCTIONAL_COMPONENT));
        assert!(functional_node.is_component());
    }

    #[test]
    fn key_comes_from_props() {
        assert_eq!(h("li", props([("key", "a")]), ()).key(), Some(&VKey::Str("a".into())));
        assert_eq!(h("li", props([("key", 3)]), ()).key(), Some(&VKey::Int(3)));
        assert_eq!(h("li", Props::new(), ()).key(), None);
    }

    #[test]
    fn same_type_requires_matching_type_and_key() {
        let a = h("li", props([("key", "a")]), ());
        let a2 = h("li", props([("key", "a"), ("class", "x")]), "changed");
        let b = h("li", props([("key", "b")]), ());
        let span = h("span", props([("key", "a")]), ());

        assert!(is_same_vnode_type(&a, &a2));
        assert!(!is_same_vnode_type(&a, &b));
        assert!(!is_same_vnode_type(&a, &span));
    }

    #[test]
    fn component_types_compare_by_definition() {
        let first = Rc::new(ComponentDef::new("Same"));
        let second = Rc::new(ComponentDef::new("Same"));

        assert!(is_same_vnode_type(&h(&first, Props::new(), ()), &h(&first, Props::new(), ())));
        assert!(!is_same_vnode_type(&h(&first, Props::new(), ()), &h(&second, Props::new(), ())));
    }
}
