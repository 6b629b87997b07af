//! Rendering
//!
//! This module turns component output into host nodes:
//!
//! - `vnode`: the tree description produced by render functions
//! - `host`: the operations a rendering backend provides, plus an
//!   in-memory backend
//! - `renderer`: the reconciler that patches one tree into the next
//! - `component`: component definitions, instances and their lifecycle
//! - `sequence`: the longest-increasing-subsequence helper used to keep
//!   host moves to a minimum

pub mod component;
pub mod host;
mod renderer;
pub mod sequence;
pub mod vnode;

pub use component::{
    ComponentDef, ComponentInstance, RenderContext, RenderFn, SetupContext, SetupFn, SetupResult,
};
pub use host::{HostOp, HostOps, MemoryHost, NodeId};
pub use renderer::Renderer;
pub use sequence::longest_increasing_subsequence;
pub use vnode::{
    comment, create_vnode, create_vnode_with, h, is_same_vnode_type, props, text, Children, Props,
    ShapeFlags, VKey, VNode, VNodeRef, VNodeType, KEY_PROP,
};
