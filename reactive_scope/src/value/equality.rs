use super::{Array, Object, ObjectData, Value};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::{cell::RefCell, rc::Rc};

type Address = *const ();

fn address<T>(rc: &Rc<T>) -> Address {
    Rc::as_ptr(rc).cast()
}

fn deep_eq_in(
    a: &Value,
    b: &Value,
    comparing: &mut FxHashSet<(Address, Address)>,
) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) => {
            if a.ptr_eq(b) || !comparing.insert((address(&a.0), address(&b.0)))
            {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| deep_eq_in(x, y, comparing))
        }
        (Value::Object(a), Value::Object(b)) => {
            if a.ptr_eq(b) || !comparing.insert((address(&a.0), address(&b.0)))
            {
                return true;
            }
            let (a, b) = (a.0.borrow(), b.0.borrow());
            a.kind == b.kind
                && a.entries.len() == b.entries.len()
                && a.entries.iter().all(|(key, x)| {
                    b.entries
                        .get(key)
                        .is_some_and(|y| deep_eq_in(x, y, comparing))
                })
        }
        _ => a.same(b),
    }
}

fn deep_copy_in(
    value: &Value,
    copies: &mut FxHashMap<Address, Value>,
) -> Value {
    match value {
        Value::Array(array) => {
            let key = address(&array.0);
            if let Some(copy) = copies.get(&key) {
                return copy.clone();
            }
            let copy = Array::new();
            copies.insert(key, Value::Array(copy.clone()));
            let items = array
                .borrow()
                .iter()
                .map(|item| deep_copy_in(item, copies))
                .collect();
            *copy.borrow_mut() = items;
            Value::Array(copy)
        }
        Value::Object(object) => {
            let key = address(&object.0);
            if let Some(copy) = copies.get(&key) {
                return copy.clone();
            }
            let data = object.0.borrow();
            let copy = Object::with_kind(data.kind);
            copies.insert(key, Value::Object(copy.clone()));
            let entries = data
                .entries
                .iter()
                .map(|(key, item)| (key.clone(), deep_copy_in(item, copies)))
                .collect();
            copy.0.borrow_mut().entries = entries;
            Value::Object(copy)
        }
        other => other.clone(),
    }
}

impl Value {
    /// Identity comparison, as used by reference watches.
    ///
    /// Primitives compare by value and `NaN` is identical to `NaN`. Containers
    /// are identical only when both sides are the same container.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined)
            | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Structural comparison, as used by value watches.
    ///
    /// Containers are equal when they have the same kind and pairwise-equal
    /// contents. Object key order is not significant. Cyclic values compare
    /// without recursing forever: a pair of containers already under
    /// comparison is taken as equal.
    pub fn deep_eq(&self, other: &Value) -> bool {
        deep_eq_in(self, other, &mut FxHashSet::default())
    }

    /// Copies the value and every container reachable from it.
    ///
    /// A container reached more than once, cycles included, is copied once
    /// and the copy is shared the same way.
    pub fn deep_copy(&self) -> Value {
        deep_copy_in(self, &mut FxHashMap::default())
    }

    /// Copies the outermost container, sharing everything inside it.
    pub fn shallow_copy(&self) -> Value {
        match self {
            Value::Array(array) => {
                Value::Array(Array::from_vec(array.to_vec()))
            }
            Value::Object(object) => {
                let data = object.0.borrow();
                let entries = data.entries.clone();
                Value::Object(Object::from_data(data.kind, entries))
            }
            other => other.clone(),
        }
    }
}

impl Object {
    fn from_data(
        kind: super::ObjectKind,
        entries: IndexMap<String, Value>,
    ) -> Self {
        Self(Rc::new(RefCell::new(ObjectData { kind, entries })))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}
