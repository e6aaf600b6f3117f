use reactive_scope::prelude::*;
use std::{cell::RefCell, rc::Rc};

type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

fn root() -> (Scope, TaskQueue) {
    let tasks = TaskQueue::new();
    let config = ScopeConfig::builder().spawner(tasks.clone()).build();
    let root = Scope::new_root_with(config);
    (root, tasks)
}

fn recorder() -> (Calls, impl Fn(&Value, &Value, &Scope)) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let record = {
        let calls = Rc::clone(&calls);
        move |new: &Value, old: &Value, _: &Scope| {
            calls.borrow_mut().push((new.clone(), old.clone()))
        }
    };
    (calls, record)
}

fn observe(key: &'static str) -> Observer {
    Observer::new(move |scope: &Scope| scope.get(key))
}

#[test]
fn takes_watches_as_a_list() {
    let (root, _tasks) = root();
    root.set("a", 1);
    root.set("b", 2);
    let (calls, record) = recorder();

    let _group = root.watch_group(vec![observe("a"), observe("b")], record);
    root.digest().unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, Value::array([1, 2]));
}

#[test]
fn fires_once_per_digest() {
    let (root, _tasks) = root();
    root.set("a", 1);
    root.set("b", 2);
    let (calls, record) = recorder();

    let _group = root.watch_group(vec![observe("a"), observe("b")], record);
    root.digest().unwrap();
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);

    root.set("a", 3);
    root.set("b", 4);
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn first_call_shares_one_array() {
    let (root, _tasks) = root();
    root.set("a", 1);
    let (calls, record) = recorder();

    let _group = root.watch_group(vec![observe("a"), observe("b")], record);
    root.digest().unwrap();

    let calls = calls.borrow();
    let (new, old) = &calls[0];
    assert!(new.same(old));
    assert_eq!(new.as_array().unwrap().len(), 2);
}

#[test]
fn later_calls_get_distinct_arrays_with_old_values() {
    let (root, _tasks) = root();
    root.set("a", 1);
    root.set("b", 2);
    let (calls, record) = recorder();

    let _group = root.watch_group(vec![observe("a"), observe("b")], record);
    root.digest().unwrap();

    root.set("b", 3);
    root.digest().unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 2);
    let (new, old) = &calls[1];
    assert!(!new.same(old));
    assert_eq!(*new, Value::array([1, 3]));
    assert_eq!(*old, Value::array([1, 2]));
}

#[test]
fn empty_group_fires_once() {
    let (root, tasks) = root();
    let (calls, record) = recorder();

    let _group = root.watch_group(Vec::new(), record);
    root.digest().unwrap();
    root.digest().unwrap();
    tasks.run_pending();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    let (new, old) = &calls[0];
    assert!(new.as_array().unwrap().is_empty());
    assert!(old.as_array().unwrap().is_empty());
}

#[test]
fn empty_group_fires_without_an_explicit_digest() {
    let (root, tasks) = root();
    let (calls, record) = recorder();

    let _group = root.watch_group(Vec::new(), record);
    tasks.run_pending();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn removing_group_stops_every_member() {
    let (root, _tasks) = root();
    root.set("a", 1);
    root.set("b", 2);
    let (calls, record) = recorder();

    let group = root.watch_group(vec![observe("a"), observe("b")], record);
    root.digest().unwrap();
    assert!(group.is_active());

    group.remove();
    assert!(!group.is_active());
    assert_eq!(root.watch_count(), 0);

    root.set("a", 3);
    root.digest().unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn removing_empty_group_before_it_fires_cancels_it() {
    let (root, _tasks) = root();
    let (calls, record) = recorder();

    let group = root.watch_group(Vec::new(), record);
    assert!(group.is_active());
    group.remove();
    root.digest().unwrap();

    assert!(calls.borrow().is_empty());
    assert!(!group.is_active());
}
