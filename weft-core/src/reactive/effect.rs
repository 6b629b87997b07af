//! Effect Implementation
//!
//! An Effect is a re-runnable computation whose reads are tracked.
//!
//! # How Effects Work
//!
//! 1. Unless created lazily, the effect runs its function immediately to
//!    establish its initial dependencies.
//!
//! 2. While the function runs, the effect is the innermost entry of the
//!    runtime's active-effect stack. Every tracked read records the effect
//!    as a subscriber of what was read.
//!
//! 3. When something it read changes, the effect is notified. If it was
//!    created with a scheduler, the scheduler is called instead of the
//!    effect; otherwise the effect re-runs synchronously.
//!
//! 4. Before each run, the effect removes itself from every subscriber set
//!    it was recorded in. Reads that no longer happen stop notifying it.
//!
//! # Lifetime
//!
//! The dependency graph holds effects weakly. An effect keeps reacting for
//! as long as an [`Effect`] handle to it exists; dropping the last handle,
//! or calling [`Effect::stop`], removes its subscriptions.
//!
//! # Differences from Computed
//!
//! - Computed values cache a result; effects only run.
//! - Computed values are lazy and recompute on read; effects run when
//!   notified (or hand that decision to their scheduler).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use super::runtime::Runtime;
use super::subscriber::{EffectId, TargetId};
use crate::graph::DepKey;

/// Weak handle stored in subscriber sets.
pub(crate) type WeakEffect = Weak<EffectInner>;

/// Alternate invocation callback for an effect.
pub type EffectScheduler = Rc<dyn Fn()>;

/// Options for creating an effect.
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,

    /// Called instead of re-running the effect when a dependency changes.
    pub scheduler: Option<EffectScheduler>,
}

impl EffectOptions {
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_scheduler(mut self, scheduler: impl Fn() + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

pub(crate) struct EffectInner {
    id: EffectId,

    /// The effect function.
    func: Box<dyn Fn()>,

    scheduler: Option<EffectScheduler>,

    /// Every (target, key) pair this effect is subscribed to.
    deps: RefCell<SmallVec<[(TargetId, DepKey); 4]>>,

    /// Cleared by `stop`.
    active: Cell<bool>,

    /// Number of times the effect has run.
    run_count: Cell<usize>,

    runtime: Runtime,
}

impl EffectInner {
    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Remember a subscription so it can be removed before the next run.
    pub fn record_dep(&self, target_id: TargetId, key: DepKey) {
        self.deps.borrow_mut().push((target_id, key));
    }

    /// Run the effect function with this effect as the active computation.
    pub fn run(self: &Rc<Self>) {
        if !self.active.get() {
            return;
        }

        self.cleanup();

        let _active = self.runtime.enter_effect(Rc::clone(self));
        self.run_count.set(self.run_count.get() + 1);
        trace!(effect_id = self.id.raw(), run = self.run_count.get(), "running effect");
        (self.func)();
    }

    /// React to a change in one of the effect's dependencies.
    pub fn notify(self: &Rc<Self>) {
        match &self.scheduler {
            Some(scheduler) => scheduler(),
            None => self.run(),
        }
    }

    pub fn stop(&self) {
        if self.active.replace(false) {
            self.cleanup();
        }
    }

    /// Remove this effect from every subscriber set it was recorded in.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        if deps.is_empty() {
            return;
        }
        self.runtime.unsubscribe(self.id, &deps);
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        let deps = std::mem::take(self.deps.get_mut());
        if !deps.is_empty() {
            self.runtime.unsubscribe(self.id, &deps);
        }
    }
}

/// A tracked, re-runnable computation.
///
/// # Example
///
/// ```rust
/// use weft_core::prelude::*;
///
/// let rt = Runtime::new();
/// let count = rt.create_ref(0);
///
/// let c = count.clone();
/// let effect = rt.effect(move || println!("count is {}", c.get()));
///
/// count.set(5); // prints "count is 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect that runs immediately.
    pub fn new(runtime: &Runtime, func: impl Fn() + 'static) -> Self {
        Self::with_options(runtime, func, EffectOptions::default())
    }

    pub fn with_options(
        runtime: &Runtime,
        func: impl Fn() + 'static,
        options: EffectOptions,
    ) -> Self {
        let effect = Self {
            inner: Rc::new(EffectInner {
                id: EffectId::new(),
                func: Box::new(func),
                scheduler: options.scheduler,
                deps: RefCell::new(SmallVec::new()),
                active: Cell::new(true),
                run_count: Cell::new(0),
                runtime: runtime.clone(),
            }),
        };

        if !options.lazy {
            effect.run();
        }
        effect
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Run the effect now, re-establishing its dependencies.
    ///
    /// Does nothing once the effect is stopped.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Stop reacting. Removes every subscription; later runs are no-ops.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of (target, key) pairs the effect is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Runtime {
    /// Create an effect that runs immediately and re-runs on change.
    pub fn effect(&self, func: impl Fn() + 'static) -> Effect {
        Effect::new(self, func)
    }

    pub fn effect_with(&self, func: impl Fn() + 'static, options: EffectOptions) -> Effect {
        Effect::with_options(self, func, options)
    }

    /// Stop `effect`. Same as [`Effect::stop`].
    pub fn stop(&self, effect: &Effect) {
        effect.stop();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
