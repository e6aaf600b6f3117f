//! Watches: observe functions polled by the digest, paired with reactions.
//!
//! A watch remembers the last value its observe function produced. Whenever a
//! digest pass sees a different value, the watch stores it and calls its
//! reaction with the new and the previous value. On the very first evaluation
//! there is no previous value, so the reaction receives the new value twice.
//!
//! ```
//! # use reactive_scope::prelude::*;
//! # use std::{cell::Cell, rc::Rc};
//! let root = Scope::new_root();
//! let fired = Rc::new(Cell::new(0));
//!
//! let handle = root.watch(
//!     |scope: &Scope| scope.get("name"),
//!     {
//!         let fired = Rc::clone(&fired);
//!         move |_new: &Value, _old: &Value, _scope: &Scope| {
//!             fired.set(fired.get() + 1)
//!         }
//!     },
//!     false,
//! );
//!
//! root.set("name", "first");
//! root.digest().unwrap();
//! root.set("name", "second");
//! root.digest().unwrap();
//! assert_eq!(fired.get(), 2);
//!
//! handle.remove();
//! root.set("name", "third");
//! root.digest().unwrap();
//! assert_eq!(fired.get(), 2);
//! ```

use crate::{
    diagnostics::ErrorSource,
    error::{CallbackError, IntoCallbackResult},
    scope::{tree::Tree, Phase, Scope, ScopeId},
    value::Value,
};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

mod collection;
mod group;

type ObserveFn = dyn Fn(&Scope) -> Result<Value, CallbackError>;
type ReactFn = dyn Fn(&Value, &Value, &Scope) -> Result<(), CallbackError>;

enum LastValue {
    Never,
    Seen(Value),
}

pub(crate) struct Watch {
    pub id: u64,
    observe: Box<ObserveFn>,
    react: Box<ReactFn>,
    by_value: bool,
    last: RefCell<LastValue>,
    pub removed: Cell<bool>,
}

impl Watch {
    /// Evaluates the watch once, firing its reaction on change.
    ///
    /// Returns whether the watch was dirty.
    pub fn check(&self, scope: &Scope) -> bool {
        let value = match (self.observe)(scope) {
            Ok(value) => value,
            Err(error) => {
                scope.tree.report(&error, ErrorSource::Watch);
                return false;
            }
        };
        let previous = match &*self.last.borrow() {
            LastValue::Never => None,
            LastValue::Seen(last) => {
                let unchanged = if self.by_value {
                    value.deep_eq(last)
                } else {
                    value.same(last)
                };
                if unchanged {
                    return false;
                }
                Some(last.clone())
            }
        };
        let stored = if self.by_value {
            value.deep_copy()
        } else {
            value.clone()
        };
        *self.last.borrow_mut() = LastValue::Seen(stored);
        scope.tree.last_dirty_watch.set(Some(self.id));

        let old = previous.unwrap_or_else(|| value.clone());
        if let Err(error) = (self.react)(&value, &old, scope) {
            scope.tree.report(&error, ErrorSource::Reaction);
        }
        true
    }
}

/// Removes the watch (or watches) it was returned for.
///
/// Dropping the handle does not remove anything.
#[must_use = "dropping a WatchHandle leaves the watch active; call remove() \
              to stop it"]
pub struct WatchHandle {
    tree: Weak<Tree>,
    entries: Vec<(ScopeId, Weak<Watch>)>,
    pending: Option<Rc<Cell<bool>>>,
}

impl WatchHandle {
    pub(crate) fn new(tree: &Rc<Tree>) -> Self {
        Self {
            tree: Rc::downgrade(tree),
            entries: Vec::new(),
            pending: None,
        }
    }

    pub(crate) fn track(&mut self, other: WatchHandle) {
        self.entries.extend(other.entries);
    }

    pub(crate) fn with_pending(mut self, pending: Rc<Cell<bool>>) -> Self {
        self.pending = Some(pending);
        self
    }

    /// Stops the watch. Calling this again, or from inside the watch's own
    /// callbacks, is fine.
    pub fn remove(&self) {
        if let Some(pending) = &self.pending {
            pending.set(false);
        }
        let Some(tree) = self.tree.upgrade() else {
            return;
        };
        for (scope, watch) in &self.entries {
            let Some(watch) = watch.upgrade() else {
                continue;
            };
            if watch.removed.replace(true) {
                continue;
            }
            tree.last_dirty_watch.set(None);
            // mid-pass removals are swept by the pass itself
            if tree.phase.get() != Some(Phase::Digest) {
                let removed = tree.with_node_mut(*scope, |node| {
                    node.watches
                        .iter()
                        .position(|w| Rc::ptr_eq(w, &watch))
                        .map(|index| node.watches.remove(index))
                });
                drop(removed);
            }
        }
    }

    /// Whether any watch behind this handle is still registered.
    pub fn is_active(&self) -> bool {
        if self.pending.as_ref().is_some_and(|pending| pending.get()) {
            return true;
        }
        self.entries.iter().any(|(_, watch)| {
            watch.upgrade().is_some_and(|watch| !watch.removed.get())
        })
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("watches", &self.entries.len())
            .field("active", &self.is_active())
            .finish()
    }
}

/// A type-erased observe function, as taken by
/// [`watch_group`](Scope::watch_group).
pub struct Observer(Box<ObserveFn>);

impl Observer {
    /// Wraps an observe function.
    pub fn new<O>(observe: impl Fn(&Scope) -> O + 'static) -> Self
    where
        O: IntoCallbackResult<Value>,
    {
        Self(Box::new(move |scope: &Scope| {
            observe(scope).into_callback_result()
        }))
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

impl Scope {
    /// Registers a watch on this scope.
    ///
    /// `observe` runs on every digest pass. Whenever its result differs from
    /// the previous one (by identity, or structurally when `by_value` is set)
    /// `react` runs with `(new, old, scope)`.
    pub fn watch<O, R>(
        &self,
        observe: impl Fn(&Scope) -> O + 'static,
        react: impl Fn(&Value, &Value, &Scope) -> R + 'static,
        by_value: bool,
    ) -> WatchHandle
    where
        O: IntoCallbackResult<Value>,
        R: IntoCallbackResult<()>,
    {
        self.register_watch(
            Box::new(move |scope: &Scope| {
                observe(scope).into_callback_result()
            }),
            Box::new(move |new: &Value, old: &Value, scope: &Scope| {
                react(new, old, scope).into_callback_result()
            }),
            by_value,
        )
    }

    /// Registers a watch with no reaction.
    ///
    /// The observe function still runs on every pass, so this is a way to run
    /// code on every digest.
    pub fn watch_only<O>(
        &self,
        observe: impl Fn(&Scope) -> O + 'static,
    ) -> WatchHandle
    where
        O: IntoCallbackResult<Value>,
    {
        self.register_watch(
            Box::new(move |scope: &Scope| {
                observe(scope).into_callback_result()
            }),
            Box::new(|_: &Value, _: &Value, _: &Scope| {
                Ok::<(), CallbackError>(())
            }),
            false,
        )
    }

    pub(crate) fn register_watch(
        &self,
        observe: Box<ObserveFn>,
        react: Box<ReactFn>,
        by_value: bool,
    ) -> WatchHandle {
        let mut handle = WatchHandle::new(&self.tree);
        if !self.tree.is_live(self.id) {
            return handle;
        }
        let watch = Rc::new(Watch {
            id: self.tree.next_watch_id(),
            observe,
            react,
            by_value,
            last: RefCell::new(LastValue::Never),
            removed: Cell::new(false),
        });
        handle.entries.push((self.id, Rc::downgrade(&watch)));
        self.tree
            .with_node_mut(self.id, |node| node.watches.push(watch));
        self.tree.last_dirty_watch.set(None);
        handle
    }
}
