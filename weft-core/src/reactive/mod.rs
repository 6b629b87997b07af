//! Reactive Primitives
//!
//! This module implements the reactivity engine: reactive wrappers over
//! structured data, refs, computed values and effects. Everything is
//! created through a [`Runtime`], which owns the dependency graph and the
//! job scheduler they share.
//!
//! # Concepts
//!
//! ## Reactive wrappers
//!
//! A [`Reactive`] wraps a raw object or list. Reads through the wrapper
//! inside an effect subscribe the effect to the key that was read; writes
//! notify the subscribers of the keys they change.
//!
//! ## Refs
//!
//! A [`Ref`] is a single reactive cell. Writing a value identical to the
//! current one is a no-op.
//!
//! ## Computed values
//!
//! A [`Computed`] caches a derived value. A change upstream only marks it
//! dirty; it recomputes on the next read.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation whose reads are tracked. It re-runs when
//! something it read changes, or hands the re-run to a scheduler.
//!
//! # Implementation Notes
//!
//! The runtime keeps a stack of running effects. A read records the
//! innermost one as a subscriber, and a nested effect hands tracking back
//! to the outer one when it finishes.

mod computed;
mod context;
pub(crate) mod effect;
mod handlers;
mod proxy;
mod refs;
mod runtime;
mod subscriber;
mod value;

pub use computed::{Computed, ComputedOptions};
pub use effect::{Effect, EffectOptions, EffectScheduler};
pub use handlers::{
    ListHandlers, ObjectHandlers, ProxyHandler, MUTABLE_LIST_HANDLERS, MUTABLE_OBJECT_HANDLERS,
    SHALLOW_LIST_HANDLERS, SHALLOW_OBJECT_HANDLERS,
};
pub use proxy::{is_reactive, Reactive, ReactiveMode};
pub use refs::Ref;
pub use runtime::Runtime;
pub use subscriber::{EffectId, TargetId};
pub use value::{Handler, Key, Observable, RawList, RawObject, Target, Value};
