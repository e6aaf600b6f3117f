use reactive_scope::prelude::*;
use std::{cell::RefCell, rc::Rc};

type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

/// Watches `key` as a collection, recording every `(new, old)` pair.
fn watch_key(scope: &Scope, key: &'static str) -> (Calls, WatchHandle) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let handle = scope.watch_collection(
        move |scope: &Scope| scope.get(key),
        {
            let calls = Rc::clone(&calls);
            move |new: &Value, old: &Value, _: &Scope| {
                calls.borrow_mut().push((new.clone(), old.clone()))
            }
        },
    );
    (calls, handle)
}

#[test]
fn works_like_a_normal_watch_for_scalars() {
    let root = Scope::new_root();
    root.set("value", 42);
    let (calls, _handle) = watch_key(&root, "value");

    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);

    root.set("value", 43);
    root.digest().unwrap();
    root.digest().unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], (Value::from(43), Value::from(42)));
}

#[test]
fn nan_scalar_fires_once() {
    let root = Scope::new_root();
    root.set("value", f64::NAN);
    let (calls, _handle) = watch_key(&root, "value");

    root.digest().unwrap();
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn first_call_passes_new_value_as_old() {
    let root = Scope::new_root();
    let list = Value::array([1, 2, 3]);
    root.set("list", list.clone());
    let (calls, _handle) = watch_key(&root, "list");

    root.digest().unwrap();
    let calls = calls.borrow();
    let (new, old) = &calls[0];
    assert!(new.same(&list));
    assert!(old.same(new));
}

#[test]
fn notices_when_value_becomes_an_array() {
    let root = Scope::new_root();
    let (calls, _handle) = watch_key(&root, "list");
    root.digest().unwrap();

    root.set("list", Value::array([1, 2, 3]));
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn item_added_fires_once_with_old_snapshot() {
    let root = Scope::new_root();
    let list = Value::array([1, 2, 3]);
    root.set("list", list.clone());
    let (calls, _handle) = watch_key(&root, "list");
    root.digest().unwrap();

    list.as_array().unwrap().push(4);
    root.digest().unwrap();
    root.digest().unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 2);
    let (new, old) = &calls[1];
    assert!(new.same(&list));
    assert_eq!(*old, Value::array([1, 2, 3]));
    assert!(!old.same(&list));
}

#[test]
fn item_removed_fires() {
    let root = Scope::new_root();
    let list = Value::array([1, 2, 3]);
    root.set("list", list.clone());
    let (calls, _handle) = watch_key(&root, "list");
    root.digest().unwrap();

    list.as_array().unwrap().pop();
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn item_replaced_fires_once() {
    let root = Scope::new_root();
    let list = Value::array([1, 2, 3]);
    root.set("list", list.clone());
    let (calls, _handle) = watch_key(&root, "list");
    root.digest().unwrap();

    list.as_array().unwrap().set(1, 42);
    root.digest().unwrap();
    root.digest().unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].1, Value::array([1, 2, 3]));
}

#[test]
fn reordering_fires_once() {
    let root = Scope::new_root();
    let list = Value::array([2, 1, 3]);
    root.set("list", list.clone());
    let (calls, _handle) = watch_key(&root, "list");
    root.digest().unwrap();

    list.as_array()
        .unwrap()
        .borrow_mut()
        .sort_by(|a, b| a.as_f64().partial_cmp(&b.as_f64()).unwrap());
    root.digest().unwrap();
    root.digest().unwrap();

    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn nan_items_do_not_refire() {
    let root = Scope::new_root();
    root.set("list", Value::array([Value::from(2), Value::from(f64::NAN)]));
    let (calls, _handle) = watch_key(&root, "list");

    root.digest().unwrap();
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn in_place_change_to_nested_item_is_ignored() {
    let root = Scope::new_root();
    let inner = Value::array([1]);
    root.set("list", Value::array([inner.clone()]));
    let (calls, _handle) = watch_key(&root, "list");
    root.digest().unwrap();

    inner.as_array().unwrap().push(2);
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn arguments_item_replaced_fires() {
    let root = Scope::new_root();
    let args = Value::arguments([1, 2, 3]);
    root.set("args", args.clone());
    let (calls, _handle) = watch_key(&root, "args");
    root.digest().unwrap();

    args.as_object().unwrap().insert("1", 42);
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn node_list_item_added_fires() {
    let root = Scope::new_root();
    let nodes = Value::node_list(["a"]);
    root.set("nodes", nodes.clone());
    let (calls, _handle) = watch_key(&root, "nodes");
    root.digest().unwrap();

    let object = nodes.as_object().unwrap();
    object.insert("1", "b");
    object.insert("length", 2);
    root.digest().unwrap();
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn notices_when_value_becomes_an_object() {
    let root = Scope::new_root();
    let (calls, _handle) = watch_key(&root, "object");
    root.digest().unwrap();

    root.set("object", Value::object([("a", 1)]));
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn object_attribute_added_changed_and_removed() {
    let root = Scope::new_root();
    let object = Value::object([("a", 1)]);
    root.set("object", object.clone());
    let (calls, _handle) = watch_key(&root, "object");
    root.digest().unwrap();

    let entries = object.as_object().unwrap();
    entries.insert("b", 2);
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 2);
    assert_eq!(calls.borrow()[1].1, Value::object([("a", 1)]));

    entries.insert("b", 3);
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 3);

    entries.remove("a");
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 4);
    assert_eq!(calls.borrow()[3].1, Value::object([("a", 1), ("b", 3)]));

    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 4);
}

#[test]
fn nan_attribute_does_not_refire() {
    let root = Scope::new_root();
    root.set("object", Value::object([("a", f64::NAN)]));
    let (calls, _handle) = watch_key(&root, "object");

    root.digest().unwrap();
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn plain_object_with_length_is_watched_as_object() {
    let root = Scope::new_root();
    let object = Value::object([
        ("length", Value::from(42)),
        ("other_key", Value::from("abc")),
    ]);
    root.set("object", object.clone());
    let (calls, _handle) = watch_key(&root, "object");
    root.digest().unwrap();

    object.as_object().unwrap().insert("new_key", "def");
    root.digest().unwrap();

    assert_eq!(calls.borrow().len(), 2);
    assert_eq!(
        calls.borrow()[1].1,
        Value::object([
            ("length", Value::from(42)),
            ("other_key", Value::from("abc")),
        ])
    );
}

#[test]
fn host_list_with_oversized_length_is_watched_as_object() {
    let root = Scope::new_root();
    let args = Value::arguments(Vec::<Value>::new());
    args.as_object().unwrap().insert("length", 1e13);
    root.set("args", args.clone());
    let (calls, _handle) = watch_key(&root, "args");

    root.digest().unwrap();
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);

    args.as_object().unwrap().insert("0", "first");
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn removed_collection_watch_stops_firing() {
    let root = Scope::new_root();
    let list = Value::array([1]);
    root.set("list", list.clone());
    let (calls, handle) = watch_key(&root, "list");
    root.digest().unwrap();

    handle.remove();
    list.as_array().unwrap().push(2);
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);
}
