//! Reactive Wrappers
//!
//! A [`Reactive`] wraps a raw object or list and routes every read and
//! write through a handler set that tracks and triggers.
//!
//! # How Wrapping Works
//!
//! 1. `Runtime::reactive` looks the raw target up in the registry of the
//!    requested mode (deep or shallow). A live wrapper found there is
//!    returned as-is, so wrapping the same target twice gives the same
//!    wrapper.
//!
//! 2. Otherwise a new wrapper is created and registered. The registry keeps
//!    it weakly; once every handle is dropped the entry is pruned.
//!
//! 3. Wrapping a value that already is a wrapper returns it unchanged.
//!
//! Deep wrappers wrap nested objects and lists lazily, when they are read.
//! Shallow wrappers return nested values raw.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use super::handlers::{
    ListHandlers, ObjectHandlers, ProxyHandler, MUTABLE_LIST_HANDLERS, MUTABLE_OBJECT_HANDLERS,
    SHALLOW_LIST_HANDLERS, SHALLOW_OBJECT_HANDLERS,
};
use super::runtime::Runtime;
use super::subscriber::TargetId;
use super::value::{Key, Observable, RawList, RawObject, Target, Value};

/// Whether nested structured values are wrapped on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveMode {
    Deep,
    Shallow,
}

pub(crate) struct ReactiveInner {
    target: Target,
    mode: ReactiveMode,
    runtime: Runtime,
}

/// An observable view of a raw object or list.
///
/// Cloning shares the same wrapper.
#[derive(Clone)]
pub struct Reactive(Rc<ReactiveInner>);

impl Reactive {
    /// The raw target behind this wrapper.
    pub fn target(&self) -> &Target {
        &self.0.target
    }

    pub fn id(&self) -> TargetId {
        self.0.target.id()
    }

    pub fn mode(&self) -> ReactiveMode {
        self.0.mode
    }

    pub fn is_shallow(&self) -> bool {
        self.0.mode == ReactiveMode::Shallow
    }

    /// Always true: this is the "is reactive" probe.
    pub fn is_reactive(&self) -> bool {
        true
    }

    pub fn is_list(&self) -> bool {
        matches!(self.0.target, Target::List(_))
    }

    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn object_handlers(&self) -> &'static ObjectHandlers {
        match self.0.mode {
            ReactiveMode::Deep => &MUTABLE_OBJECT_HANDLERS,
            ReactiveMode::Shallow => &SHALLOW_OBJECT_HANDLERS,
        }
    }

    fn list_handlers(&self) -> &'static ListHandlers {
        match self.0.mode {
            ReactiveMode::Deep => &MUTABLE_LIST_HANDLERS,
            ReactiveMode::Shallow => &SHALLOW_LIST_HANDLERS,
        }
    }

    /// Read `key`, tracking the read. Missing keys read as `Null`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let (rt, key) = (&self.0.runtime, key.into());
        match &self.0.target {
            Target::Object(object) => self.object_handlers().get(rt, object, &key),
            Target::List(list) => self.list_handlers().get(rt, list, &key),
        }
    }

    /// Write `key` and notify the effects that read it.
    ///
    /// Returns false if the write was rejected (a non-index key on a list).
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let (rt, key, value) = (&self.0.runtime, key.into(), value.into());
        match &self.0.target {
            Target::Object(object) => self.object_handlers().set(rt, object, key, value),
            Target::List(list) => self.list_handlers().set(rt, list, key, value),
        }
    }

    /// Check whether `key` exists, tracking the check.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let (rt, key) = (&self.0.runtime, key.into());
        match &self.0.target {
            Target::Object(object) => self.object_handlers().has(rt, object, &key),
            Target::List(list) => self.list_handlers().has(rt, list, &key),
        }
    }

    /// Remove `key`. Returns whether it existed.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let (rt, key) = (&self.0.runtime, key.into());
        match &self.0.target {
            Target::Object(object) => self.object_handlers().delete(rt, object, &key),
            Target::List(list) => self.list_handlers().delete(rt, list, &key),
        }
    }

    /// Keys in order, tracking the enumeration.
    pub fn keys(&self) -> Vec<Key> {
        let rt = &self.0.runtime;
        match &self.0.target {
            Target::Object(object) => self.object_handlers().own_keys(rt, object),
            Target::List(list) => self.list_handlers().own_keys(rt, list),
        }
    }

    /// Number of entries, tracked like an enumeration.
    pub fn len(&self) -> usize {
        let rt = &self.0.runtime;
        match &self.0.target {
            Target::Object(object) => self.object_handlers().len(rt, object),
            Target::List(list) => self.list_handlers().len(rt, list),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every value in key order, each read tracked.
    pub fn values(&self) -> Vec<Value> {
        self.keys().into_iter().map(|key| self.get(key)).collect()
    }

    /// Append to a list. Returns false for objects.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        match &self.0.target {
            Target::List(list) => {
                let index = list.len();
                self.list_handlers().set(&self.0.runtime, list, Key::Index(index), value.into())
            }
            Target::Object(_) => false,
        }
    }
}

impl Observable for Reactive {
    fn target_id(&self) -> TargetId {
        self.0.target.id()
    }

    fn owner(&self) -> Weak<dyn Any> {
        self.0.target.owner()
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("mode", &self.0.mode)
            .field("target", &self.0.target)
            .finish()
    }
}

/// Whether `value` is a reactive wrapper.
pub fn is_reactive(value: &Value) -> bool {
    value.as_reactive().is_some_and(Reactive::is_reactive)
}

/// Raw target → wrapper, for one wrapping mode.
#[derive(Default)]
pub(crate) struct ProxyRegistry {
    entries: RefCell<HashMap<TargetId, Weak<ReactiveInner>>>,
}

impl ProxyRegistry {
    pub fn get(&self, id: TargetId) -> Option<Reactive> {
        self.entries.borrow().get(&id).and_then(Weak::upgrade).map(Reactive)
    }

    fn insert(&self, reactive: &Reactive) {
        self.entries
            .borrow_mut()
            .insert(reactive.id(), Rc::downgrade(&reactive.0));
    }

    /// Drop entries whose wrapper is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, wrapper| wrapper.strong_count() > 0);
        before - entries.len()
    }
}

impl Runtime {
    /// Wrap a raw object or list for deep observation.
    ///
    /// Wrappers are returned unchanged. Anything else is not observable: a
    /// warning is logged and the value is returned as-is.
    pub fn reactive(&self, value: impl Into<Value>) -> Value {
        self.create_reactive(value.into(), ReactiveMode::Deep)
    }

    /// Like [`reactive`](Self::reactive), but nested values are not wrapped.
    pub fn shallow_reactive(&self, value: impl Into<Value>) -> Value {
        self.create_reactive(value.into(), ReactiveMode::Shallow)
    }

    fn create_reactive(&self, value: Value, mode: ReactiveMode) -> Value {
        match value {
            Value::Object(object) => Value::Reactive(self.wrap(Target::Object(object), mode)),
            Value::List(list) => Value::Reactive(self.wrap(Target::List(list), mode)),
            Value::Reactive(_) => value,
            other => {
                warn!(value = %other, "value cannot be made reactive");
                other
            }
        }
    }

    /// Deep-wrap a raw target.
    pub fn to_reactive(&self, target: Target) -> Reactive {
        self.wrap(target, ReactiveMode::Deep)
    }

    /// Deep-wrap a new object built from `entries`.
    pub fn reactive_object<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Reactive
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.to_reactive(Target::Object(entries.into_iter().collect::<RawObject>()))
    }

    /// Deep-wrap a new list built from `items`.
    pub fn reactive_list<V: Into<Value>>(&self, items: impl IntoIterator<Item = V>) -> Reactive {
        self.to_reactive(Target::List(items.into_iter().collect::<RawList>()))
    }

    fn wrap(&self, target: Target, mode: ReactiveMode) -> Reactive {
        let registry = self.registry(mode);
        if let Some(existing) = registry.get(target.id()) {
            return existing;
        }

        let reactive = Reactive(Rc::new(ReactiveInner {
            target,
            mode,
            runtime: self.clone(),
        }));
        registry.insert(&reactive);
        reactive
    }

    /// The raw target behind `reactive`.
    ///
    /// Only answers for the wrapper registered for that target in its own
    /// mode, so a target wrapped both deep and shallow cannot be unwrapped
    /// through a wrapper the registry did not issue.
    pub fn to_raw(&self, reactive: &Reactive) -> Option<Target> {
        self.registry(reactive.mode())
            .get(reactive.id())
            .filter(|registered| registered.ptr_eq(reactive))
            .map(|registered| registered.target().clone())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
