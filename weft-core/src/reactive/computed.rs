//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when read
//! after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The getter runs inside a lazy effect. Nothing runs on creation.
//!
//! 2. The first read runs the effect, which caches the result and records
//!    the getter's dependencies.
//!
//! 3. When a dependency changes, the effect's scheduler marks the value
//!    dirty and notifies whoever read the computed value. It does not
//!    recompute.
//!
//! 4. The next read sees the dirty flag and recomputes once.
//!
//! # Why This Matters
//!
//! Many writes between two reads cost one recomputation:
//!
//! - A value is written ten times
//! - The computed value is marked dirty on the first write
//! - Later writes find it already dirty and do nothing
//! - The next read recomputes once

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use super::effect::{Effect, EffectOptions};
use super::runtime::Runtime;
use super::subscriber::TargetId;
use super::value::Observable;
use crate::graph::DepKey;

type Getter<T> = Rc<dyn Fn() -> T>;
type Setter<T> = Box<dyn Fn(T)>;

/// Getter and optional setter for a computed value.
pub struct ComputedOptions<T> {
    get: Getter<T>,
    set: Option<Setter<T>>,
}

impl<T> ComputedOptions<T> {
    pub fn new(get: impl Fn() -> T + 'static) -> Self {
        Self {
            get: Rc::new(get),
            set: None,
        }
    }

    /// Make the computed value writable through `set`.
    pub fn with_setter(mut self, set: impl Fn(T) + 'static) -> Self {
        self.set = Some(Box::new(set));
        self
    }
}

struct ComputedInner<T> {
    id: TargetId,
    getter: Getter<T>,
    setter: Option<Setter<T>>,

    /// The cached value (None if never computed).
    value: Rc<RefCell<Option<T>>>,

    /// Set by the effect's scheduler, cleared on recompute.
    dirty: Rc<Cell<bool>>,

    effect: Effect,
    runtime: Runtime,
}

/// A lazily recomputed, cached derived value.
///
/// # Example
///
/// ```rust
/// use weft_core::prelude::*;
///
/// let rt = Runtime::new();
/// let count = rt.create_ref(2);
///
/// let c = count.clone();
/// let doubled = rt.computed(move || c.get().as_f64().unwrap_or(0.0) * 2.0);
/// assert_eq!(doubled.get(), 4.0);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10.0);
/// ```
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// A read-only computed value.
    pub fn new(runtime: &Runtime, getter: impl Fn() -> T + 'static) -> Self {
        Self::with_options(runtime, ComputedOptions::new(getter))
    }

    pub fn with_options(runtime: &Runtime, options: ComputedOptions<T>) -> Self {
        let id = TargetId::new();
        let value: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let dirty = Rc::new(Cell::new(true));

        let effect = {
            let (getter, value) = (options.get.clone(), value.clone());
            let (dirty, rt) = (dirty.clone(), runtime.clone());
            runtime.effect_with(
                move || {
                    let next = getter();
                    *value.borrow_mut() = Some(next);
                },
                EffectOptions::default().lazy().with_scheduler(move || {
                    if !dirty.replace(true) {
                        rt.trigger(id, &[DepKey::value()]);
                    }
                }),
            )
        };

        Self {
            inner: Rc::new(ComputedInner {
                id,
                getter: options.get,
                setter: options.set,
                value,
                dirty,
                effect,
                runtime: runtime.clone(),
            }),
        }
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Get the value, recomputing first if it is dirty.
    pub fn get(&self) -> T {
        let inner = &self.inner;
        inner.runtime.track(self, DepKey::value());

        if inner.dirty.replace(false) {
            inner.effect.run();
        }

        let cached = inner.value.borrow().clone();
        match cached {
            Some(value) => value,
            // Stopped effects and failed recomputes leave nothing cached.
            None => inner.runtime.untracked(|| (inner.getter)()),
        }
    }

    /// Write through the setter. Read-only values log a warning and ignore
    /// the write.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => warn!(
                computed_id = self.inner.id.raw(),
                "write ignored: computed value is readonly"
            ),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.setter.is_none()
    }

    /// Stop tracking dependencies. Later reads call the getter directly.
    pub fn stop(&self) {
        self.inner.effect.stop();
        self.inner.value.borrow_mut().take();
    }
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Observable for Computed<T> {
    fn target_id(&self) -> TargetId {
        self.inner.id
    }

    fn owner(&self) -> Weak<dyn Any> {
        let weak: Weak<ComputedInner<T>> = Rc::downgrade(&self.inner);
        weak
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl Runtime {
    /// A read-only computed value.
    pub fn computed<T: Clone + 'static>(&self, getter: impl Fn() -> T + 'static) -> Computed<T> {
        Computed::new(self, getter)
    }

    /// A computed value from a getter and an optional setter.
    pub fn computed_with<T: Clone + 'static>(&self, options: ComputedOptions<T>) -> Computed<T> {
        Computed::with_options(self, options)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
