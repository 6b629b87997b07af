//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (reactive wrappers, refs, computed values, effects)
//! - A job scheduler that batches re-renders into one flush per tick
//! - Virtual nodes and a keyed reconciler that patches them into a host
//! - Components with lifecycle hooks and dependency injection
//!
//! Rendering goes through the [`render::HostOps`] trait, so the same core
//! drives any backend. [`render::MemoryHost`] is an in-memory backend that
//! records every operation it receives.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives and the [`Runtime`](reactive::Runtime)
//!   context that owns all reactive state
//! - `graph`: Dependency graph between reactive targets and effects
//! - `scheduler`: Job queue, flushing and `next_tick`
//! - `render`: Virtual nodes, reconciler and components
//! - `app`: Application shell
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use weft_core::prelude::*;
//!
//! let rt = Runtime::with_config(RuntimeConfig::manual()).unwrap();
//! let host = Rc::new(MemoryHost::new());
//! let renderer = Renderer::new(rt.clone(), host.clone());
//! let root = host.create_root();
//!
//! let count = rt.create_ref(0);
//! let c = count.clone();
//! let counter = Rc::new(ComponentDef::new("Counter").with_render(move |_| {
//!     h("span", Props::new(), c.get())
//! }));
//!
//! renderer.create_app(counter).mount(root).unwrap();
//! assert_eq!(host.serialize(root), "<span>0</span>");
//!
//! // The write queues a re-render; flushing applies it.
//! count.set(1);
//! rt.flush_jobs().unwrap();
//! assert_eq!(host.serialize(root), "<span>1</span>");
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod render;
pub mod scheduler;

pub use error::{Error, Result};

/// Commonly used types.
pub mod prelude {
    pub use crate::app::{App, AppContext, Plugin};
    pub use crate::config::{FlushMode, RuntimeConfig};
    pub use crate::error::{Error, JobFailure, Result};
    pub use crate::reactive::{
        is_reactive, Computed, ComputedOptions, Effect, EffectOptions, Handler, RawList, RawObject,
        Reactive, Ref, Runtime, Value,
    };
    pub use crate::render::{
        comment, h, props, text, Children, ComponentDef, HostOps, MemoryHost, NodeId, Props,
        RenderContext, Renderer, SetupContext, SetupResult, ShapeFlags, VNodeRef,
    };
    pub use crate::scheduler::Job;
}
