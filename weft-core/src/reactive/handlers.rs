//! Interception Hooks
//!
//! A [`ProxyHandler`] is the set of hooks a [`Reactive`](super::Reactive)
//! routes its reads and writes through. Objects and lists get their own
//! handler sets because their keys mean different things: object keys are
//! names, list keys are positions and a removal shifts every later item.
//!
//! # Tracking Buckets
//!
//! Reads are tracked under one of three dependency keys:
//!
//! - `Get(key)` for value reads
//! - `Has(key)` for existence checks
//! - `Iterate` for key enumeration and length reads
//!
//! Writes trigger only the buckets they can change. Overwriting an existing
//! key triggers `Get(key)`; adding a key also triggers `Has(key)` and
//! `Iterate`; deleting a present key triggers all three.

use super::runtime::Runtime;
use super::value::{Key, RawList, RawObject, Target, Value};
use crate::graph::DepKey;

/// Hooks for one kind of container.
pub trait ProxyHandler {
    type Target;

    fn get(&self, rt: &Runtime, target: &Self::Target, key: &Key) -> Value;

    /// Write, then trigger. Returns whether the write happened.
    fn set(&self, rt: &Runtime, target: &Self::Target, key: Key, value: Value) -> bool;

    fn has(&self, rt: &Runtime, target: &Self::Target, key: &Key) -> bool;

    /// Remove, then trigger if the key existed. Returns whether it existed.
    fn delete(&self, rt: &Runtime, target: &Self::Target, key: &Key) -> bool;

    fn own_keys(&self, rt: &Runtime, target: &Self::Target) -> Vec<Key>;

    fn len(&self, rt: &Runtime, target: &Self::Target) -> usize;
}

/// Handlers for keyed collections.
#[derive(Debug)]
pub struct ObjectHandlers {
    shallow: bool,
}

/// Handlers for ordered collections.
#[derive(Debug)]
pub struct ListHandlers {
    shallow: bool,
}

pub static MUTABLE_OBJECT_HANDLERS: ObjectHandlers = ObjectHandlers { shallow: false };
pub static SHALLOW_OBJECT_HANDLERS: ObjectHandlers = ObjectHandlers { shallow: true };
pub static MUTABLE_LIST_HANDLERS: ListHandlers = ListHandlers { shallow: false };
pub static SHALLOW_LIST_HANDLERS: ListHandlers = ListHandlers { shallow: true };

/// Deep mode wraps structured values on the way out.
fn wrap_nested(rt: &Runtime, value: Value, shallow: bool) -> Value {
    if shallow {
        return value;
    }
    match value {
        Value::Object(object) => Value::Reactive(rt.to_reactive(Target::Object(object))),
        Value::List(list) => Value::Reactive(rt.to_reactive(Target::List(list))),
        other => other,
    }
}

fn prop_key(key: &Key) -> Key {
    Key::Prop(key.as_prop().into_owned())
}

impl ProxyHandler for ObjectHandlers {
    type Target = RawObject;

    fn get(&self, rt: &Runtime, target: &RawObject, key: &Key) -> Value {
        let key = prop_key(key);
        let value = target.get(&key.as_prop()).unwrap_or_default();
        rt.track(target, DepKey::Get(key));
        wrap_nested(rt, value, self.shallow)
    }

    fn set(&self, rt: &Runtime, target: &RawObject, key: Key, value: Value) -> bool {
        let key = prop_key(&key);
        let existed = target.insert(key.as_prop().into_owned(), value).is_some();

        if existed {
            rt.trigger(target.id(), &[DepKey::Get(key)]);
        } else {
            rt.trigger(
                target.id(),
                &[DepKey::Get(key.clone()), DepKey::Has(key), DepKey::Iterate],
            );
        }
        true
    }

    fn has(&self, rt: &Runtime, target: &RawObject, key: &Key) -> bool {
        let key = prop_key(key);
        let present = target.contains_key(&key.as_prop());
        rt.track(target, DepKey::Has(key));
        present
    }

    fn delete(&self, rt: &Runtime, target: &RawObject, key: &Key) -> bool {
        let key = prop_key(key);
        if target.remove(&key.as_prop()).is_none() {
            return false;
        }
        rt.trigger(
            target.id(),
            &[DepKey::Get(key.clone()), DepKey::Has(key), DepKey::Iterate],
        );
        true
    }

    fn own_keys(&self, rt: &Runtime, target: &RawObject) -> Vec<Key> {
        rt.track(target, DepKey::Iterate);
        target.keys().into_iter().map(Key::Prop).collect()
    }

    fn len(&self, rt: &Runtime, target: &RawObject) -> usize {
        rt.track(target, DepKey::Iterate);
        target.len()
    }
}

impl ProxyHandler for ListHandlers {
    type Target = RawList;

    fn get(&self, rt: &Runtime, target: &RawList, key: &Key) -> Value {
        let Some(index) = key.as_index() else {
            return Value::Null;
        };
        let value = target.get(index).unwrap_or_default();
        rt.track(target, DepKey::Get(Key::Index(index)));
        wrap_nested(rt, value, self.shallow)
    }

    fn set(&self, rt: &Runtime, target: &RawList, key: Key, value: Value) -> bool {
        let Some(index) = key.as_index() else {
            return false;
        };
        let len = target.len();
        target.set(index, value);

        let key = Key::Index(index);
        if index < len {
            rt.trigger(target.id(), &[DepKey::Get(key)]);
        } else {
            rt.trigger(
                target.id(),
                &[DepKey::Get(key.clone()), DepKey::Has(key), DepKey::Iterate],
            );
        }
        true
    }

    fn has(&self, rt: &Runtime, target: &RawList, key: &Key) -> bool {
        let Some(index) = key.as_index() else {
            return false;
        };
        rt.track(target, DepKey::Has(Key::Index(index)));
        index < target.len()
    }

    fn delete(&self, rt: &Runtime, target: &RawList, key: &Key) -> bool {
        let Some(index) = key.as_index() else {
            return false;
        };
        let len = target.len();
        if target.remove(index).is_none() {
            return false;
        }

        // Every later item moved down one position and the last one is gone.
        let mut keys: Vec<DepKey> = (index..len).map(|i| DepKey::Get(Key::Index(i))).collect();
        keys.push(DepKey::Has(Key::Index(len - 1)));
        keys.push(DepKey::Iterate);
        rt.trigger(target.id(), &keys);
        true
    }

    fn own_keys(&self, rt: &Runtime, target: &RawList) -> Vec<Key> {
        rt.track(target, DepKey::Iterate);
        (0..target.len()).map(Key::Index).collect()
    }

    fn len(&self, rt: &Runtime, target: &RawList) -> usize {
        rt.track(target, DepKey::Iterate);
        target.len()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
