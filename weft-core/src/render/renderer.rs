//! Reconciler
//!
//! The renderer turns vnode trees into host nodes and keeps them in sync.
//! Each call to [`Renderer::render`] compares the new tree for a container
//! with the tree rendered there last time and applies only the difference
//! through [`HostOps`].
//!
//! # Patching
//!
//! 1. The same vnode on both sides is a no-op.
//! 2. Vnodes of a different type or key are never patched into each other:
//!    the old one is unmounted and the new one mounted in its place.
//! 3. Otherwise the new vnode takes over the old one's host node and only
//!    changed text, props and children are applied.
//!
//! # Children
//!
//! Keyed children (first child on both sides has a key) are matched by key
//! and reordered with as few host moves as possible: common prefix and
//! suffix are patched in place, then the nodes of the middle section that
//! form a longest increasing run of old positions stay put while the rest
//! are moved, mounted or unmounted. Unkeyed children are patched by
//! position.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::component::ComponentInstance;
use super::host::{HostOps, NodeId};
use super::sequence::longest_increasing_subsequence;
use super::vnode::{is_same_vnode_type, Children, Props, VKey, VNodeRef, VNodeType, KEY_PROP};
use crate::reactive::Runtime;

pub(crate) struct RendererInner {
    pub(crate) host: Rc<dyn HostOps>,
    pub(crate) runtime: Runtime,

    /// Last tree rendered into each container.
    roots: RefCell<HashMap<NodeId, VNodeRef>>,
}

/// Reconciles vnode trees against one host.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use weft_core::prelude::*;
///
/// let host = Rc::new(MemoryHost::new());
/// let renderer = Renderer::new(Runtime::new(), host.clone());
/// let root = host.create_root();
///
/// renderer.render(Some(h("p", props([("id", "greeting")]), "hello")), root);
/// assert_eq!(host.serialize(root), r#"<p id="greeting">hello</p>"#);
///
/// renderer.render(Some(h("p", props([("id", "greeting")]), "bye")), root);
/// assert_eq!(host.text_content(root), "bye");
/// ```
#[derive(Clone)]
pub struct Renderer {
    pub(crate) inner: Rc<RendererInner>,
}

type Parent<'a> = Option<&'a Rc<ComponentInstance>>;

impl Renderer {
    pub fn new(runtime: Runtime, host: Rc<dyn HostOps>) -> Self {
        Self {
            inner: Rc::new(RendererInner {
                host,
                runtime,
                roots: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RendererInner>) -> Self {
        Self { inner }
    }

    pub fn host(&self) -> &Rc<dyn HostOps> {
        &self.inner.host
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Render `vnode` into `container`, patching against whatever was
    /// rendered there before. `None` unmounts the previous tree.
    pub fn render(&self, vnode: Option<VNodeRef>, container: NodeId) {
        let prev = self.inner.roots.borrow_mut().remove(&container);
        match (prev, vnode) {
            (Some(prev), None) => self.unmount(&prev),
            (prev, Some(next)) => {
                self.patch_node(prev.as_ref(), &next, container, None, None);
                self.inner.roots.borrow_mut().insert(container, next);
            }
            (None, None) => {}
        }
    }

    /// The tree last rendered into `container`.
    pub fn root(&self, container: NodeId) -> Option<VNodeRef> {
        self.inner.roots.borrow().get(&container).cloned()
    }

    /// Patch `old` into `new` inside `container`. `old` of `None` mounts
    /// `new` at the end of `container`.
    pub fn patch(&self, old: Option<&VNodeRef>, new: &VNodeRef, container: NodeId) {
        self.patch_node(old, new, container, None, None);
    }

    /// Unmount `vnode` and remove its host nodes.
    pub fn unmount(&self, vnode: &VNodeRef) {
        self.unmount_node(vnode, None, true);
    }

    pub(crate) fn patch_node(
        &self,
        old: Option<&VNodeRef>,
        new: &VNodeRef,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Parent<'_>,
    ) {
        let mut old = old;
        let mut anchor = anchor;

        if let Some(prev) = old {
            if Rc::ptr_eq(prev, new) {
                return;
            }
            if !is_same_vnode_type(prev, new) {
                anchor = self.next_host_node(prev).or(anchor);
                self.unmount_node(prev, parent, true);
                old = None;
            }
        }

        match &new.node_type {
            VNodeType::Text => self.process_text(old, new, container, anchor),
            VNodeType::Comment => self.process_comment(old, new, container, anchor),
            VNodeType::Element(tag) => {
                self.process_element(tag, old, new, container, anchor, parent)
            }
            VNodeType::Component(_) => {
                self.process_component(old, new, container, anchor, parent)
            }
        }
    }

    fn process_text(
        &self,
        old: Option<&VNodeRef>,
        new: &VNodeRef,
        container: NodeId,
        anchor: Option<NodeId>,
    ) {
        let host = &self.inner.host;
        let content = new.children.as_text().unwrap_or_default();

        match old {
            None => {
                let el = host.create_text(content);
                new.el.set(Some(el));
                host.insert(el, container, anchor);
            }
            Some(old) => {
                let el = old.el.get();
                new.el.set(el);
                if old.children.as_text() != new.children.as_text() {
                    if let Some(el) = el {
                        host.set_text(el, content);
                    }
                }
            }
        }
    }

    fn process_comment(
        &self,
        old: Option<&VNodeRef>,
        new: &VNodeRef,
        container: NodeId,
        anchor: Option<NodeId>,
    ) {
        match old {
            None => {
                let host = &self.inner.host;
                let el = host.create_comment(new.children.as_text().unwrap_or_default());
                new.el.set(Some(el));
                host.insert(el, container, anchor);
            }
            // Comment content is static.
            Some(old) => new.el.set(old.el.get()),
        }
    }

    fn process_element(
        &self,
        tag: &str,
        old: Option<&VNodeRef>,
        new: &VNodeRef,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Parent<'_>,
    ) {
        match old.and_then(|old| old.el.get().map(|el| (old, el))) {
            Some((old, el)) => {
                new.el.set(Some(el));
                self.patch_props(el, &old.props, &new.props);
                self.patch_children(old, new, el, parent);
            }
            None => self.mount_element(tag, new, container, anchor, parent),
        }
    }

    fn mount_element(
        &self,
        tag: &str,
        vnode: &VNodeRef,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Parent<'_>,
    ) {
        let host = &self.inner.host;
        let el = host.create_element(tag);
        vnode.el.set(Some(el));

        match &vnode.children {
            Children::Text(content) => host.set_element_text(el, content),
            Children::Nodes(children) => self.mount_children(children, el, None, parent),
            Children::None => {}
        }

        for (key, value) in vnode.props.iter() {
            if key != KEY_PROP {
                host.patch_prop(el, key, None, Some(value));
            }
        }

        if let Some(scope_id) = parent.and_then(|instance| instance.def().scope_id()) {
            host.set_scope_id(el, scope_id);
        }

        host.insert(el, container, anchor);
    }

    fn mount_children(
        &self,
        children: &[VNodeRef],
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Parent<'_>,
    ) {
        for child in children {
            self.patch_node(None, child, container, anchor, parent);
        }
    }

    fn patch_props(&self, el: NodeId, old: &Rc<Props>, new: &Rc<Props>) {
        if Rc::ptr_eq(old, new) {
            return;
        }
        let host = &self.inner.host;

        for (key, next) in new.iter() {
            if key == KEY_PROP {
                continue;
            }
            match old.get(key) {
                Some(prev) if prev.same(next) => {}
                prev => host.patch_prop(el, key, prev, Some(next)),
            }
        }

        for (key, prev) in old.iter() {
            if key != KEY_PROP && !new.contains_key(key) {
                host.patch_prop(el, key, Some(prev), None);
            }
        }
    }

    fn patch_children(&self, old: &VNodeRef, new: &VNodeRef, el: NodeId, parent: Parent<'_>) {
        let host = &self.inner.host;

        match (&old.children, &new.children) {
            (prev, Children::Text(next)) => {
                if let Children::Nodes(prev_nodes) = prev {
                    // Replacing the element text detaches the old children.
                    self.unmount_children(prev_nodes, parent, false);
                }
                if prev.as_text() != Some(next.as_str()) {
                    host.set_element_text(el, next);
                }
            }
            (Children::Nodes(prev), Children::Nodes(next)) => {
                let keyed = prev.first().is_some_and(|node| node.key.is_some())
                    && next.first().is_some_and(|node| node.key.is_some());
                if keyed {
                    self.patch_keyed_children(prev, next, el, None, parent);
                } else {
                    self.patch_unkeyed_children(prev, next, el, None, parent);
                }
            }
            (prev, Children::Nodes(next)) => {
                if prev.as_text().is_some() {
                    host.set_element_text(el, "");
                }
                self.mount_children(next, el, None, parent);
            }
            (Children::Text(_), Children::None) => host.set_element_text(el, ""),
            (Children::Nodes(prev), Children::None) => self.unmount_children(prev, parent, true),
            (Children::None, Children::None) => {}
        }
    }

    fn patch_unkeyed_children(
        &self,
        prev: &[VNodeRef],
        next: &[VNodeRef],
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Parent<'_>,
    ) {
        let common = prev.len().min(next.len());
        for (old, new) in prev.iter().zip(next) {
            self.patch_node(Some(old), new, container, None, parent);
        }

        if prev.len() > common {
            self.unmount_children(&prev[common..], parent, true);
        } else {
            self.mount_children(&next[common..], container, anchor, parent);
        }
    }

    fn patch_keyed_children(
        &self,
        prev: &[VNodeRef],
        next: &[VNodeRef],
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Parent<'_>,
    ) {
        let mut i = 0;
        // Exclusive ends of the unmatched ranges.
        let mut e1 = prev.len();
        let mut e2 = next.len();

        // 1. common prefix
        while i < e1 && i < e2 && is_same_vnode_type(&prev[i], &next[i]) {
            self.patch_node(Some(&prev[i]), &next[i], container, None, parent);
            i += 1;
        }

        // 2. common suffix
        while i < e1 && i < e2 && is_same_vnode_type(&prev[e1 - 1], &next[e2 - 1]) {
            self.patch_node(Some(&prev[e1 - 1]), &next[e2 - 1], container, None, parent);
            e1 -= 1;
            e2 -= 1;
        }

        // 3. only new nodes left
        if i >= e1 {
            if i < e2 {
                let anchor = next.get(e2).and_then(|node| node.el.get()).or(anchor);
                self.mount_children(&next[i..e2], container, anchor, parent);
            }
            return;
        }

        // 4. only old nodes left
        if i >= e2 {
            self.unmount_children(&prev[i..e1], parent, true);
            return;
        }

        // 5. unknown middle section
        let (s1, s2) = (i, i);
        let key_to_new_index: HashMap<&VKey, usize> = next[s2..e2]
            .iter()
            .enumerate()
            .filter_map(|(offset, node)| node.key.as_ref().map(|key| (key, s2 + offset)))
            .collect();

        let to_be_patched = e2 - s2;
        let mut patched = 0;
        let mut moved = false;
        let mut max_new_index_so_far = 0;

        // Old index + 1 for every new node of the section, 0 if it has none.
        let mut new_index_to_old_index = vec![0usize; to_be_patched];

        for (old_index, old) in prev.iter().enumerate().take(e1).skip(s1) {
            if patched >= to_be_patched {
                self.unmount_node(old, parent, true);
                continue;
            }

            let new_index = match &old.key {
                Some(key) => key_to_new_index.get(key).copied(),
                None => (s2..e2).find(|&j| {
                    new_index_to_old_index[j - s2] == 0 && is_same_vnode_type(old, &next[j])
                }),
            };

            match new_index {
                None => self.unmount_node(old, parent, true),
                Some(new_index) => {
                    new_index_to_old_index[new_index - s2] = old_index + 1;
                    if new_index >= max_new_index_so_far {
                        max_new_index_so_far = new_index;
                    } else {
                        moved = true;
                    }
                    self.patch_node(Some(old), &next[new_index], container, None, parent);
                    patched += 1;
                }
            }
        }

        let stable = if moved {
            longest_increasing_subsequence(&new_index_to_old_index)
        } else {
            Vec::new()
        };
        let mut cursor = stable.len();

        // Walk backwards so the node after the current one is already in
        // its final position and can serve as the anchor.
        for offset in (0..to_be_patched).rev() {
            let index = s2 + offset;
            let node = &next[index];
            let node_anchor = next.get(index + 1).and_then(|next| next.el.get()).or(anchor);

            if new_index_to_old_index[offset] == 0 {
                self.patch_node(None, node, container, node_anchor, parent);
            } else if moved {
                if cursor > 0 && stable[cursor - 1] == offset {
                    cursor -= 1;
                } else {
                    self.move_node(node, container, node_anchor);
                }
            }
        }

        trace!(patched, moved, "patched keyed children");
    }

    /// Re-insert the host nodes of `vnode` before `anchor`.
    pub(crate) fn move_node(&self, vnode: &VNodeRef, container: NodeId, anchor: Option<NodeId>) {
        if vnode.is_component() {
            if let Some(sub_tree) = vnode.component().and_then(|instance| instance.sub_tree()) {
                self.move_node(&sub_tree, container, anchor);
            }
            return;
        }
        if let Some(el) = vnode.el.get() {
            self.inner.host.insert(el, container, anchor);
        }
    }

    /// Host node right after the host nodes of `vnode`.
    pub(crate) fn next_host_node(&self, vnode: &VNodeRef) -> Option<NodeId> {
        if vnode.is_component() {
            let sub_tree = vnode.component().and_then(|instance| instance.sub_tree())?;
            return self.next_host_node(&sub_tree);
        }
        vnode.el.get().and_then(|el| self.inner.host.next_sibling(el))
    }

    pub(crate) fn unmount_node(&self, vnode: &VNodeRef, parent: Parent<'_>, remove: bool) {
        if vnode.is_component() {
            if let Some(instance) = vnode.component() {
                self.unmount_component(&instance, remove);
            }
            return;
        }

        if let Children::Nodes(children) = &vnode.children {
            if matches!(vnode.node_type, VNodeType::Element(_)) {
                // Removing the element takes its children along.
                self.unmount_children(children, parent, false);
            }
        }

        if remove {
            if let Some(el) = vnode.el.get() {
                self.inner.host.remove(el);
            }
        }
    }

    fn unmount_children(&self, children: &[VNodeRef], parent: Parent<'_>, remove: bool) {
        for child in children {
            self.unmount_node(child, parent, remove);
        }
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("roots", &self.inner.roots.borrow().len())
            .finish()
    }
}
