//! Dynamic values stored on scopes and produced by watch functions.
//!
//! A [`Value`] mirrors the shape of data a dirty-checking system has to reason
//! about: primitives compare by value, while [`Array`] and [`Object`] are
//! shared, mutable containers that compare by reference unless a watch opts
//! into deep comparison. Cloning a `Value` never copies a container; it hands
//! out another reference to the same one. Use [`Value::deep_copy`] or
//! [`Value::shallow_copy`] when a detached copy is needed.

use indexmap::IndexMap;
use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

mod convert;
mod equality;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absence of a value, as read from a missing property.
    #[default]
    Undefined,
    /// An explicit empty value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number. `NaN` is treated as identical to itself.
    Number(f64),
    /// An immutable string, compared by content.
    String(Rc<str>),
    /// A shared, mutable list.
    Array(Array),
    /// A shared, mutable keyed collection.
    Object(Object),
}

impl Value {
    /// Creates a new array value from the given items.
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Creates a new plain object value from the given entries.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(Object::from_entries(ObjectKind::Plain, entries))
    }

    /// Creates an argument-list object: indexed keys plus a `length`.
    pub fn arguments<T: Into<Value>>(
        items: impl IntoIterator<Item = T>,
    ) -> Self {
        Value::Object(Object::indexed(ObjectKind::Arguments, items))
    }

    /// Creates a node-list object: indexed keys plus a `length`.
    pub fn node_list<T: Into<Value>>(
        items: impl IntoIterator<Item = T>,
    ) -> Self {
        Value::Object(Object::indexed(ObjectKind::NodeList, items))
    }

    /// Whether this is [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this is a number that is `NaN`.
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// Returns the number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the array handle, if this is an array.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Returns the object handle, if this is an object.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Interprets the value as a collection length: a non-negative whole
    /// number no larger than `2^53 - 1`.
    pub fn as_length(&self) -> Option<usize> {
        match self {
            Value::Number(n)
                if *n >= 0.0 && *n <= MAX_SAFE_INTEGER && n.fract() == 0.0 =>
            {
                usize::try_from(*n as u64).ok()
            }
            _ => None,
        }
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Whether `value` should be diffed element-by-element like a list.
///
/// Arrays always qualify. Argument lists and node lists qualify when their
/// `length` is a whole number that the object can actually hold: either zero,
/// or fewer than its entry count with the last index present. A plain object
/// never qualifies, even when it happens to carry a `length` key.
pub fn is_array_like(value: &Value) -> bool {
    array_like_len(value).is_some()
}

/// The element count of an array-like value.
pub(crate) fn array_like_len(value: &Value) -> Option<usize> {
    match value {
        Value::Array(array) => Some(array.len()),
        Value::Object(object) if object.kind() != ObjectKind::Plain => {
            let length = object.get("length").as_length()?;
            if length == 0 {
                return Some(0);
            }
            let last = (length - 1).to_string();
            (length < object.len() && object.contains_key(&last))
                .then_some(length)
        }
        _ => None,
    }
}

/// The element at `index` of an array-like value.
pub(crate) fn array_like_get(value: &Value, index: usize) -> Value {
    match value {
        Value::Array(array) => array.get(index),
        Value::Object(object) => object.get(&index.to_string()),
        _ => Value::Undefined,
    }
}

/// A reference-counted, interior-mutable list of values.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing vector.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Returns the element at `index`, or [`Value::Undefined`] past the end.
    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Stores `value` at `index`, padding with [`Value::Undefined`] as needed.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    /// Appends an element.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Removes and returns the last element.
    pub fn pop(&self) -> Option<Value> {
        self.0.borrow_mut().pop()
    }

    /// Copies the elements out into a new vector.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Borrows the underlying vector.
    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    /// Mutably borrows the underlying vector.
    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    /// Whether both handles point at the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// The host category of an [`Object`].
///
/// Only non-plain kinds can be treated as array-like; see [`is_array_like`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// An ordinary keyed object.
    #[default]
    Plain,
    /// A function argument list.
    Arguments,
    /// A list of document nodes.
    NodeList,
}

#[derive(Default)]
struct ObjectData {
    kind: ObjectKind,
    entries: IndexMap<String, Value>,
}

/// A reference-counted, interior-mutable map of values with insertion order.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<ObjectData>>);

impl Object {
    /// Creates an empty plain object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty object of the given kind.
    pub fn with_kind(kind: ObjectKind) -> Self {
        Self(Rc::new(RefCell::new(ObjectData {
            kind,
            entries: IndexMap::new(),
        })))
    }

    fn from_entries<K, V>(
        kind: ObjectKind,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let object = Self::with_kind(kind);
        for (key, value) in entries {
            object.insert(key, value);
        }
        object
    }

    fn indexed<T: Into<Value>>(
        kind: ObjectKind,
        items: impl IntoIterator<Item = T>,
    ) -> Self {
        let object = Self::with_kind(kind);
        let mut length = 0_usize;
        for (index, item) in items.into_iter().enumerate() {
            object.insert(index.to_string(), item);
            length = index + 1;
        }
        object.insert("length", length);
        object
    }

    /// The host category of this object.
    pub fn kind(&self) -> ObjectKind {
        self.0.borrow().kind
    }

    /// Returns the value under `key`, or [`Value::Undefined`].
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().entries.get(key).cloned().unwrap_or_default()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().entries.contains_key(key)
    }

    /// Inserts or replaces an entry, returning the previous value.
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.0.borrow_mut().entries.insert(key.into(), value.into())
    }

    /// Removes an entry, keeping the order of the others.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().entries.shift_remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    /// Whether the object has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().entries.is_empty()
    }

    /// The keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().entries.keys().cloned().collect()
    }

    /// The entries, in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(array) => array.fmt(f),
            Value::Object(object) => object.fmt(f),
        }
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.borrow().iter()).finish()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        if data.kind != ObjectKind::Plain {
            write!(f, "{:?} ", data.kind)?;
        }
        f.debug_map().entries(data.entries.iter()).finish()
    }
}
