//! Ref Implementation
//!
//! A Ref is a single reactive cell holding a [`Value`].
//!
//! # How Refs Work
//!
//! 1. Reading the ref inside an effect subscribes the effect to the ref.
//!
//! 2. Writing a different value notifies every subscriber. Writing the
//!    value the ref already holds (same primitive, or the same object by
//!    identity) does nothing.
//!
//! 3. Raw objects and lists are deep-wrapped when stored, so reading a
//!    field through the ref is tracked too.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime::Runtime;
use super::subscriber::TargetId;
use super::value::{Observable, Value};
use crate::graph::DepKey;

struct RefInner {
    id: TargetId,
    value: RefCell<Value>,
    runtime: Runtime,
}

/// A reactive single-value cell.
///
/// # Example
///
/// ```rust
/// use weft_core::prelude::*;
///
/// let rt = Runtime::new();
/// let name = rt.create_ref("ada");
///
/// name.set("grace");
/// assert_eq!(name.get(), Value::from("grace"));
/// ```
#[derive(Clone)]
pub struct Ref {
    inner: Rc<RefInner>,
}

impl Ref {
    pub fn new(runtime: &Runtime, value: impl Into<Value>) -> Self {
        Self {
            inner: Rc::new(RefInner {
                id: TargetId::new(),
                value: RefCell::new(convert(runtime, value.into())),
                runtime: runtime.clone(),
            }),
        }
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> Value {
        self.inner.runtime.track(self, DepKey::value());
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Store `value` and notify subscribers, unless it is the same value.
    pub fn set(&self, value: impl Into<Value>) {
        let value = convert(&self.inner.runtime, value.into());
        {
            let mut current = self.inner.value.borrow_mut();
            if current.same(&value) {
                return;
            }
            *current = value;
        }
        self.inner.runtime.trigger(self.inner.id, &[DepKey::value()]);
    }

    /// Set the value to `f(current)`.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Raw structured values are stored deep-wrapped.
fn convert(runtime: &Runtime, value: Value) -> Value {
    match value.as_target() {
        Some(target) if !matches!(value, Value::Reactive(_)) => {
            Value::Reactive(runtime.to_reactive(target))
        }
        _ => value,
    }
}

impl Observable for Ref {
    fn target_id(&self) -> TargetId {
        self.inner.id
    }

    fn owner(&self) -> Weak<dyn Any> {
        let weak: Weak<RefInner> = Rc::downgrade(&self.inner);
        weak
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

impl Runtime {
    /// Create a reactive cell holding `value`.
    pub fn create_ref(&self, value: impl Into<Value>) -> Ref {
        Ref::new(self, value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
