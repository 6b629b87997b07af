//! Structured Values
//!
//! The reactive layer observes dynamic data: objects (insertion-ordered
//! string-keyed maps), lists, and the primitives they hold. This module
//! defines that data and nothing about observation. Reads and writes on a
//! [`RawObject`] or [`RawList`] are never tracked; wrap them with
//! `Runtime::reactive` to make them observable.
//!
//! # Equality
//!
//! Primitives compare by value. Objects, lists, reactive wrappers and
//! handlers compare by identity: two objects with the same entries are not
//! the same value. [`Value::same`] implements this and is what `Ref::set`
//! and the prop diff use to decide whether anything changed.

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::proxy::Reactive;
use super::subscriber::TargetId;

/// A property key: a named field of an object or a position in a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Prop(String),
    Index(usize),
}

impl Key {
    /// The key as an object property name.
    pub fn as_prop(&self) -> Cow<'_, str> {
        match self {
            Key::Prop(name) => Cow::Borrowed(name),
            Key::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// The key as a list position, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Prop(name) => name.parse().ok(),
            Key::Index(index) => Some(*index),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Prop(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Prop(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Anything the dependency graph can record reads against.
///
/// The graph only keeps the weak `owner` handle, so tracking a target never
/// keeps it alive.
pub trait Observable {
    fn target_id(&self) -> TargetId;
    fn owner(&self) -> Weak<dyn Any>;
}

// ----------------------------------------------------------------------------
// Objects
// ----------------------------------------------------------------------------

pub(crate) struct ObjectData {
    id: TargetId,
    entries: RefCell<IndexMap<String, Value>>,
}

/// A keyed collection. Cloning shares the same object.
#[derive(Clone)]
pub struct RawObject(Rc<ObjectData>);

impl RawObject {
    pub fn new() -> Self {
        Self::from_entries(IndexMap::new())
    }

    pub fn from_entries(entries: IndexMap<String, Value>) -> Self {
        Self(Rc::new(ObjectData {
            id: TargetId::new(),
            entries: RefCell::new(entries),
        }))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.entries.borrow().get(key).cloned()
    }

    /// Write `value`, returning the previous value if the key existed.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.entries.borrow_mut().insert(key.into(), value.into())
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.entries.borrow_mut().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.entries.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.entries.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .entries
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for RawObject {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for RawObject {
    fn target_id(&self) -> TargetId {
        self.0.id
    }

    fn owner(&self) -> Weak<dyn Any> {
        let weak: Weak<ObjectData> = Rc::downgrade(&self.0);
        weak
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawObject#{} ", self.0.id.raw())?;
        f.debug_map()
            .entries(self.0.entries.borrow().iter())
            .finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_entries(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

// ----------------------------------------------------------------------------
// Lists
// ----------------------------------------------------------------------------

pub(crate) struct ListData {
    id: TargetId,
    items: RefCell<Vec<Value>>,
}

/// An ordered collection. Cloning shares the same list.
#[derive(Clone)]
pub struct RawList(Rc<ListData>);

impl RawList {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ListData {
            id: TargetId::new(),
            items: RefCell::new(items),
        }))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.borrow().get(index).cloned()
    }

    /// Write `value` at `index`. Writing past the end pads the gap with
    /// `Null`.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.items.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        items[index] = value.into();
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.items.borrow_mut().push(value.into());
    }

    /// Remove the item at `index`, shifting later items down.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = self.0.items.borrow_mut();
        (index < items.len()).then(|| items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for RawList {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for RawList {
    fn target_id(&self) -> TargetId {
        self.0.id
    }

    fn owner(&self) -> Weak<dyn Any> {
        let weak: Weak<ListData> = Rc::downgrade(&self.0);
        weak
    }
}

impl fmt::Debug for RawList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawList#{} ", self.0.id.raw())?;
        f.debug_list().entries(self.0.items.borrow().iter()).finish()
    }
}

impl<V: Into<Value>> FromIterator<V> for RawList {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

/// A structured value that can be wrapped for observation.
#[derive(Debug, Clone)]
pub enum Target {
    Object(RawObject),
    List(RawList),
}

impl Target {
    pub fn id(&self) -> TargetId {
        match self {
            Target::Object(object) => object.id(),
            Target::List(list) => list.id(),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Target::Object(a), Target::Object(b)) => a.ptr_eq(b),
            (Target::List(a), Target::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Target::Object(object) => Value::Object(object),
            Target::List(list) => Value::List(list),
        }
    }
}

impl Observable for Target {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn owner(&self) -> Weak<dyn Any> {
        match self {
            Target::Object(object) => object.owner(),
            Target::List(list) => list.owner(),
        }
    }
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

/// A callable value, used for event props and emitted events.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&[Value])>);

impl Handler {
    pub fn new(callback: impl Fn(&[Value]) + 'static) -> Self {
        Self(Rc::new(callback))
    }

    pub fn call(&self, args: &[Value]) {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

// ----------------------------------------------------------------------------
// Value
// ----------------------------------------------------------------------------

/// A dynamic value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(RawObject),
    List(RawList),
    Reactive(Reactive),
    Handler(Handler),
}

impl Value {
    /// Identity-aware equality: primitives by value, everything else by
    /// reference.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            (Value::Handler(a), Value::Handler(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Whether this value is an object, a list, or a wrapper around one.
    pub fn is_structured(&self) -> bool {
        matches!(self, Value::Object(_) | Value::List(_) | Value::Reactive(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64()
            .filter(|n| n.fract() == 0.0)
            .map(|n| n as i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(reactive) => Some(reactive),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Value::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    /// The raw structured target behind this value, if any.
    pub fn as_target(&self) -> Option<Target> {
        match self {
            Value::Object(object) => Some(Target::Object(object.clone())),
            Value::List(list) => Some(Target::List(list.clone())),
            Value::Reactive(reactive) => Some(reactive.target().clone()),
            _ => None,
        }
    }

    /// Convert to a `serde_json::Value`. Handlers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Text rendering of a value, as used for text children.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Handler(_) => f.write_str("[handler]"),
            structured => write!(f, "{}", structured.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Handler(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(object) => serialize_object(object, serializer),
            Value::List(list) => serialize_list(list, serializer),
            Value::Reactive(reactive) => match reactive.target() {
                Target::Object(object) => serialize_object(object, serializer),
                Target::List(list) => serialize_list(list, serializer),
            },
        }
    }
}

fn serialize_object<S: Serializer>(object: &RawObject, serializer: S) -> Result<S::Ok, S::Error> {
    let entries = object.entries();
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, value) in &entries {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

fn serialize_list<S: Serializer>(list: &RawList, serializer: S) -> Result<S::Ok, S::Error> {
    let items = list.to_vec();
    let mut seq = serializer.serialize_seq(Some(items.len()))?;
    for item in &items {
        seq.serialize_element(item)?;
    }
    seq.end()
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => Value::List(items.into_iter().collect()),
            serde_json::Value::Object(entries) => Value::Object(entries.into_iter().collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

number_from!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<RawObject> for Value {
    fn from(object: RawObject) -> Self {
        Value::Object(object)
    }
}

impl From<RawList> for Value {
    fn from(list: RawList) -> Self {
        Value::List(list)
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        target.into_value()
    }
}

impl From<Reactive> for Value {
    fn from(reactive: Reactive) -> Self {
        Value::Reactive(reactive)
    }
}

impl From<Handler> for Value {
    fn from(handler: Handler) -> Self {
        Value::Handler(handler)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_compare_by_value() {
        assert!(Value::from(1).same(&Value::from(1.0)));
        assert!(Value::from("a").same(&Value::from("a".to_string())));
        assert!(!Value::from(1).same(&Value::from("1")));
        assert!(Value::Null.same(&Value::default()));
        assert!(Value::from(f64::NAN).same(&Value::from(f64::NAN)));
    }

    #[test]
    fn structured_values_compare_by_identity() {
        let a = RawObject::new();
        let b = RawObject::new();
        assert!(Value::from(a.clone()).same(&Value::from(a)));
        assert!(!Value::from(RawObject::new()).same(&Value::from(b)));
    }

    #[test]
    fn converts_from_json() {
        let value = Value::from(json!({ "name": "weft", "tags": ["a", "b"], "n": 2 }));
        let Value::Object(object) = &value else {
            panic!("expected object");
        };
        assert_eq!(object.len(), 3);
        assert!(object.contains_key("tags"));
        assert_eq!(object.get("n"), Some(Value::from(2)));
        assert_eq!(value.to_json(), json!({ "name": "weft", "tags": ["a", "b"], "n": 2 }));
    }

    #[test]
    fn display_formats_integral_numbers_without_fraction() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn list_set_past_end_pads_with_null() {
        let list = RawList::new();
        list.set(2, "c");
        assert_eq!(list.to_vec(), vec![Value::Null, Value::Null, Value::from("c")]);
    }

    #[test]
    fn object_remove_keeps_order() {
        let object: RawObject = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        object.remove("b");
        assert_eq!(object.keys(), vec!["a", "c"]);
    }

    #[test]
    fn keys_convert_between_props_and_indices() {
        assert_eq!(Key::from("3").as_index(), Some(3));
        assert_eq!(Key::from(4usize).as_prop(), "4");
        assert_eq!(Key::from("name").as_index(), None);
    }
}
