//! Reactive Runtime
//!
//! The runtime is the context object that ties the reactive system
//! together. Everything the rest of the crate would otherwise keep in
//! process-wide state lives here: the active-effect stack, the dependency
//! graph, the wrapper registries, the job scheduler and the stack of
//! component instances whose `setup` is running.
//!
//! # How It Works
//!
//! 1. When a reactive read happens, the runtime checks the active-effect
//!    stack. If an effect is running, it is recorded as a subscriber of the
//!    (target, key) that was read.
//!
//! 2. When a reactive write happens, the runtime:
//!    a. Collects the subscribers of every key the write can affect
//!    b. Hands every effect with a scheduler to that scheduler
//!    c. Re-runs the others, except the innermost running effect
//!
//! 3. After every flush pass of the scheduler, the runtime drops graph and
//!    registry entries whose target or effect no longer exists.
//!
//! # Ownership
//!
//! A `Runtime` is a cheap `Rc` handle. Primitives created through it hold
//! the handle; the runtime holds them back only weakly. Two runtimes never
//! share state, so tests build a fresh one each.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use tracing::trace;

use super::context::{ContextGuard, ContextStack};
use super::effect::EffectInner;
use super::proxy::{ProxyRegistry, ReactiveMode};
use super::subscriber::{EffectId, TargetId};
use super::value::Observable;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::graph::{DepGraph, DepKey};
use crate::render::component::ComponentInstance;
use crate::scheduler::{Job, Scheduler};

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,

    /// Effects currently running, innermost last. `None` pauses tracking.
    effects: ContextStack<Option<Rc<EffectInner>>>,

    /// Component instances whose `setup` is running.
    instances: ContextStack<Rc<ComponentInstance>>,

    graph: RefCell<DepGraph>,

    deep_proxies: ProxyRegistry,
    shallow_proxies: ProxyRegistry,

    scheduler: Rc<Scheduler>,
}

/// Handle to one reactive runtime.
#[derive(Clone)]
pub struct Runtime(Rc<RuntimeInner>);

impl Runtime {
    /// A runtime with the default configuration.
    pub fn new() -> Self {
        Self::build(RuntimeConfig::default())
    }

    /// A runtime with `config`, after validating it.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RuntimeConfig) -> Self {
        Self(Rc::new_cyclic(|this| {
            let this = this.clone();
            let post_flush: Box<dyn Fn()> = Box::new(move || {
                if let Some(inner) = this.upgrade() {
                    Runtime(inner).collect_garbage();
                }
            });

            RuntimeInner {
                scheduler: Scheduler::with_post_flush(&config, Some(post_flush)),
                config,
                effects: ContextStack::new(),
                instances: ContextStack::new(),
                graph: RefCell::new(DepGraph::new()),
                deep_proxies: ProxyRegistry::default(),
                shallow_proxies: ProxyRegistry::default(),
            }
        }))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.0.config
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Record that the running effect read `target` under `key`.
    ///
    /// Does nothing outside of an effect.
    pub(crate) fn track<T: Observable + ?Sized>(&self, target: &T, key: DepKey) {
        let Some(Some(effect)) = self.0.effects.current() else {
            return;
        };
        if !effect.is_active() {
            return;
        }

        let added = self.0.graph.borrow_mut().subscribe(
            target,
            key.clone(),
            effect.id(),
            Rc::downgrade(&effect),
        );
        if added {
            effect.record_dep(target.target_id(), key);
        }
    }

    /// Notify every effect subscribed to any of `keys` on `target_id`.
    ///
    /// Unknown targets and keys are ignored.
    pub(crate) fn trigger(&self, target_id: TargetId, keys: &[DepKey]) {
        let subscribers = self.0.graph.borrow().subscribers(target_id, keys);
        if subscribers.is_empty() {
            return;
        }
        trace!(target_id = target_id.raw(), count = subscribers.len(), "trigger");

        let current = self.0.effects.current().flatten();
        for weak in subscribers {
            let Some(effect) = weak.upgrade() else {
                continue;
            };
            if !effect.is_active() {
                continue;
            }
            // An effect without a scheduler would re-enter itself synchronously.
            let running = current.as_ref().is_some_and(|active| Rc::ptr_eq(active, &effect));
            if running && !effect.has_scheduler() {
                continue;
            }
            effect.notify();
        }
    }

    pub(crate) fn unsubscribe(&self, effect_id: EffectId, deps: &[(TargetId, DepKey)]) {
        // A failed borrow means the graph is mid-update; the next collection
        // pass prunes the dead entries instead.
        if let Ok(mut graph) = self.0.graph.try_borrow_mut() {
            for (target_id, key) in deps {
                graph.unsubscribe(*target_id, key, effect_id);
            }
        }
    }

    pub(crate) fn enter_effect(
        &self,
        effect: Rc<EffectInner>,
    ) -> ContextGuard<'_, Option<Rc<EffectInner>>> {
        self.0.effects.enter(Some(effect))
    }

    /// Whether reads made right now would be tracked.
    pub fn is_tracking(&self) -> bool {
        matches!(self.0.effects.current(), Some(Some(_)))
    }

    /// Run `f` without tracking its reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _paused = self.0.effects.enter(None);
        f()
    }

    /// Drop graph entries for dropped targets and effects, and registry
    /// entries for dropped wrappers. Returns the number of entries removed.
    ///
    /// Runs automatically after every flush pass.
    pub fn collect_garbage(&self) -> usize {
        let graph_removed = self
            .0
            .graph
            .try_borrow_mut()
            .map_or(0, |mut graph| graph.collect_garbage());
        let removed = graph_removed + self.0.deep_proxies.prune() + self.0.shallow_proxies.prune();
        if removed > 0 {
            trace!(removed, "collected reactive garbage");
        }
        removed
    }

    /// Number of targets with at least one subscriber.
    pub fn tracked_target_count(&self) -> usize {
        self.0.graph.borrow().target_count()
    }

    /// Number of subscribers of `target` under `key`.
    pub fn subscriber_count<T: Observable + ?Sized>(&self, target: &T, key: &DepKey) -> usize {
        self.0.graph.borrow().subscriber_count(target.target_id(), key)
    }

    pub(crate) fn registry(&self, mode: ReactiveMode) -> &ProxyRegistry {
        match mode {
            ReactiveMode::Deep => &self.0.deep_proxies,
            ReactiveMode::Shallow => &self.0.shallow_proxies,
        }
    }

    // ------------------------------------------------------------------------
    // Component instances
    // ------------------------------------------------------------------------

    pub(crate) fn enter_instance(
        &self,
        instance: Rc<ComponentInstance>,
    ) -> ContextGuard<'_, Rc<ComponentInstance>> {
        self.0.instances.enter(instance)
    }

    /// The component instance whose `setup` is running, if any.
    pub fn current_instance(&self) -> Option<Rc<ComponentInstance>> {
        self.0.instances.current()
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    pub fn scheduler(&self) -> &Scheduler {
        &self.0.scheduler
    }

    pub fn queue_job(&self, job: Job) {
        self.0.scheduler.queue_job(job);
    }

    pub fn invalidate_job(&self, job: &Job) {
        self.0.scheduler.invalidate_job(job);
    }

    /// Run every pending job now.
    pub fn flush_jobs(&self) -> Result<()> {
        self.0.scheduler.flush_jobs()
    }

    /// Resolves once the pending flush has run, with its result.
    pub fn next_tick(&self) -> impl Future<Output = Result<()>> + 'static {
        self.0.scheduler.next_tick()
    }

    pub fn next_tick_with(
        &self,
        callback: impl FnOnce() + 'static,
    ) -> impl Future<Output = Result<()>> + 'static {
        self.0.scheduler.next_tick_with(callback)
    }

    /// Drive `future` on a fresh `LocalSet`. Inside, queued jobs flush as
    /// spawned tasks when the flush mode is `Microtask`.
    pub async fn run_until<F: Future>(&self, future: F) -> F::Output {
        let _attached = self.0.scheduler.attach();
        tokio::task::LocalSet::new().run_until(future).await
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.0.config)
            .field("tracked_targets", &self.0.graph.borrow().target_count())
            .field("active_effects", &self.0.effects.depth())
            .field("pending_jobs", &self.0.scheduler.pending())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, Key, RawObject};
    use std::cell::Cell;

    #[test]
    fn reads_outside_effects_are_untracked() {
        let rt = Runtime::new();
        let raw = RawObject::new();
        rt.track(&raw, DepKey::Iterate);
        assert_eq!(rt.tracked_target_count(), 0);
    }

    #[test]
    fn trigger_without_subscribers_is_a_no_op() {
        let rt = Runtime::new();
        rt.trigger(TargetId::new(), &[DepKey::Get(Key::from("missing"))]);
    }

    #[test]
    fn track_then_trigger_reruns_effect() {
        let rt = Runtime::new();
        let raw = RawObject::new();
        let runs = Rc::new(Cell::new(0));

        let (r, target, rt2) = (runs.clone(), raw.clone(), rt.clone());
        let _effect = rt.effect(move || {
            rt2.track(&target, DepKey::Get(Key::from("a")));
            r.set(r.get() + 1);
        });
        assert_eq!(rt.subscriber_count(&raw, &DepKey::Get(Key::from("a"))), 1);

        rt.trigger(raw.id(), &[DepKey::Get(Key::from("a"))]);
        assert_eq!(runs.get(), 2);

        rt.trigger(raw.id(), &[DepKey::Get(Key::from("b"))]);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn trigger_notifies_each_effect_once_across_keys() {
        let rt = Runtime::new();
        let raw = RawObject::new();
        let runs = Rc::new(Cell::new(0));

        let (r, target, rt2) = (runs.clone(), raw.clone(), rt.clone());
        let _effect = rt.effect_with(
            move || {
                rt2.track(&target, DepKey::Get(Key::from("a")));
                rt2.track(&target, DepKey::Iterate);
            },
            EffectOptions::default().with_scheduler(move || r.set(r.get() + 1)),
        );

        rt.trigger(raw.id(), &[DepKey::Get(Key::from("a")), DepKey::Iterate]);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn untracked_pauses_tracking() {
        let rt = Runtime::new();
        let raw = RawObject::new();

        let (target, rt2) = (raw.clone(), rt.clone());
        let effect = rt.effect(move || {
            rt2.untracked(|| rt2.track(&target, DepKey::Iterate));
        });

        assert_eq!(effect.dependency_count(), 0);
        assert!(!rt.is_tracking());
    }

    #[test]
    fn garbage_collection_drops_dead_targets() {
        let rt = Runtime::new();
        let raw = RawObject::new();

        let (target, rt2) = (raw.clone(), rt.clone());
        let effect = rt.effect(move || rt2.track(&target, DepKey::Iterate));
        assert_eq!(rt.tracked_target_count(), 1);

        // The effect closure holds the last handle to the target.
        drop(raw);
        drop(effect);
        rt.collect_garbage();
        assert_eq!(rt.tracked_target_count(), 0);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = RuntimeConfig {
            recursion_limit: 0,
            ..RuntimeConfig::default()
        };
        assert!(Runtime::with_config(config).is_err());
    }
}
