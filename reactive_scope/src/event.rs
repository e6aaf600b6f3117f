//! Scope events.
//!
//! Listeners are registered per scope and per event name. An event can travel
//! in one of two directions:
//! - [`Scope::emit`] notifies the scope itself and then each ancestor up to
//!   the root, until a listener calls [`Event::stop_propagation`];
//! - [`Scope::broadcast`] notifies the scope and every descendant, isolated
//!   ones included.
//!
//! ```
//! # use reactive_scope::prelude::*;
//! # use std::{cell::RefCell, rc::Rc};
//! let root = Scope::new_root();
//! let child = root.new_scope();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let _listener = root.on("saved", {
//!     let seen = Rc::clone(&seen);
//!     move |event: &Event, args: &[Value]| {
//!         seen.borrow_mut().push((event.name().to_string(), args.to_vec()));
//!     }
//! });
//!
//! child.emit("saved", &[Value::from(42)]);
//! assert_eq!(
//!     *seen.borrow(),
//!     vec![("saved".to_string(), vec![Value::from(42)])]
//! );
//! ```

use crate::{
    diagnostics::ErrorSource,
    error::{CallbackError, IntoCallbackResult},
    scope::{tree::Tree, Scope, ScopeId},
    value::Value,
};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

type ListenerFn = dyn Fn(&Event, &[Value]) -> Result<(), CallbackError>;

pub(crate) struct Listener {
    callback: Box<ListenerFn>,
    removed: Cell<bool>,
}

struct EventInner {
    name: String,
    target: Scope,
    current: RefCell<Option<Scope>>,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

/// One dispatch of a named event.
///
/// Every listener reached by the same `emit` or `broadcast` call shares this
/// object, so flags set by one listener are visible to the next, and to the
/// caller once dispatch returns.
#[derive(Clone)]
pub struct Event(Rc<EventInner>);

impl Event {
    fn new(name: &str, target: Scope) -> Self {
        Self(Rc::new(EventInner {
            name: name.to_string(),
            target,
            current: RefCell::new(None),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }))
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The scope the event was emitted or broadcast from.
    pub fn target_scope(&self) -> &Scope {
        &self.0.target
    }

    /// The scope the event has reached. `None` once dispatch is over.
    pub fn current_scope(&self) -> Option<Scope> {
        self.0.current.borrow().clone()
    }

    /// Flags the event as handled.
    pub fn prevent_default(&self) {
        self.0.default_prevented.set(true);
    }

    /// Whether some listener called [`prevent_default`](Self::prevent_default).
    pub fn default_prevented(&self) -> bool {
        self.0.default_prevented.get()
    }

    /// Stops an emitted event from reaching further ancestors once the
    /// current scope's listeners finish. No effect on broadcasts.
    pub fn stop_propagation(&self) {
        self.0.propagation_stopped.set(true);
    }

    /// Whether some listener called
    /// [`stop_propagation`](Self::stop_propagation).
    pub fn propagation_stopped(&self) -> bool {
        self.0.propagation_stopped.get()
    }

    fn set_current(&self, scope: Option<Scope>) {
        *self.0.current.borrow_mut() = scope;
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.0.name)
            .field("target", &self.0.target)
            .field("default_prevented", &self.default_prevented())
            .field("propagation_stopped", &self.propagation_stopped())
            .finish()
    }
}

/// Removes the listener it was returned for.
#[must_use = "dropping a ListenerHandle leaves the listener registered"]
pub struct ListenerHandle {
    tree: Weak<Tree>,
    scope: ScopeId,
    name: String,
    listener: Weak<Listener>,
}

impl ListenerHandle {
    /// Unregisters the listener. Safe to call repeatedly, and from inside a
    /// dispatch, including from the listener itself.
    pub fn remove(&self) {
        let Some(listener) = self.listener.upgrade() else {
            return;
        };
        if listener.removed.replace(true) {
            return;
        }
        let Some(tree) = self.tree.upgrade() else {
            return;
        };
        let removed = tree.with_node_mut(self.scope, |node| {
            let listeners = node.listeners.get_mut(&self.name)?;
            let index = listeners
                .iter()
                .position(|other| Rc::ptr_eq(other, &listener))?;
            let removed = listeners.remove(index);
            if listeners.is_empty() {
                node.listeners.remove(&self.name);
            }
            Some(removed)
        });
        drop(removed);
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.listener
            .upgrade()
            .is_some_and(|listener| !listener.removed.get())
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Scope {
    /// Registers `listener` for events called `name` on this scope.
    pub fn on<R>(
        &self,
        name: impl Into<String>,
        listener: impl Fn(&Event, &[Value]) -> R + 'static,
    ) -> ListenerHandle
    where
        R: IntoCallbackResult<()>,
    {
        let name = name.into();
        let listener = Rc::new(Listener {
            callback: Box::new(move |event: &Event, args: &[Value]| {
                listener(event, args).into_callback_result()
            }),
            removed: Cell::new(false),
        });
        let handle = ListenerHandle {
            tree: Rc::downgrade(&self.tree),
            scope: self.id,
            name: name.clone(),
            listener: Rc::downgrade(&listener),
        };
        self.tree.with_node_mut(self.id, |node| {
            node.listeners.entry(name).or_default().push(listener)
        });
        handle
    }

    /// Sends an event to this scope and then up through its ancestors.
    pub fn emit(&self, name: &str, args: &[Value]) -> Event {
        let event = Event::new(name, self.clone());
        let mut path = Vec::new();
        let mut current = Some(self.id);
        while let Some(id) = current {
            let Some(parent) = self.tree.with_node(id, |node| node.parent)
            else {
                break;
            };
            path.push(id);
            current = parent;
        }
        for id in path {
            if !self.tree.is_live(id) {
                continue;
            }
            self.dispatch(&event, id, args);
            if event.propagation_stopped() {
                break;
            }
        }
        event.set_current(None);
        event
    }

    /// Sends an event to this scope and every scope below it.
    pub fn broadcast(&self, name: &str, args: &[Value]) -> Event {
        let event = Event::new(name, self.clone());
        let mut stack = vec![self.id];
        while let Some(id) = stack.pop() {
            if !self.tree.is_live(id) {
                continue;
            }
            self.dispatch(&event, id, args);
            if let Some(children) =
                self.tree.with_node(id, |node| node.children.clone())
            {
                stack.extend(children.into_iter().rev());
            }
        }
        event.set_current(None);
        event
    }

    /// Runs the listeners registered on `id` for `event`.
    fn dispatch(&self, event: &Event, id: ScopeId, args: &[Value]) {
        let listeners = self
            .tree
            .with_node(id, |node| node.listeners.get(event.name()).cloned())
            .flatten()
            .unwrap_or_default();
        event.set_current(Some(self.tree.scope(id)));
        for listener in listeners {
            if listener.removed.get() {
                continue;
            }
            if let Err(error) = (listener.callback)(event, args) {
                self.tree.report(
                    &error,
                    ErrorSource::Listener(event.name().to_string()),
                );
            }
        }
    }
}
