use super::WatchHandle;
use crate::{
    error::{CallbackError, IntoCallbackResult},
    scope::Scope,
    value::{array_like_get, array_like_len, Value},
};
use rustc_hash::FxHashMap;
use std::{cell::RefCell, rc::Rc};

/// The shape of the collection as of the last check.
#[derive(Default)]
enum Mirror {
    #[default]
    Unset,
    Scalar(Value),
    List(Vec<Value>),
    Map(FxHashMap<String, Value>),
}

impl Mirror {
    /// Brings the mirror up to date with `value`, returning whether anything
    /// differed.
    fn refresh(&mut self, value: &Value) -> bool {
        if let Some(len) = array_like_len(value) {
            let Mirror::List(mirror) = &mut *self else {
                let items = (0..len).map(|index| array_like_get(value, index));
                *self = Mirror::List(items.collect());
                return true;
            };
            let mut changed = mirror.len() != len;
            mirror.resize(len, Value::Undefined);
            for (index, seen) in mirror.iter_mut().enumerate() {
                let item = array_like_get(value, index);
                if !seen.same(&item) {
                    changed = true;
                    *seen = item;
                }
            }
            return changed;
        }

        if let Value::Object(object) = value {
            let entries = object.entries();
            let Mirror::Map(mirror) = &mut *self else {
                *self = Mirror::Map(entries.into_iter().collect());
                return true;
            };
            let mut changed = false;
            for (key, item) in &entries {
                match mirror.get_mut(key) {
                    Some(seen) if seen.same(item) => {}
                    Some(seen) => {
                        changed = true;
                        *seen = item.clone();
                    }
                    None => {
                        changed = true;
                        mirror.insert(key.clone(), item.clone());
                    }
                }
            }
            if mirror.len() > entries.len() {
                changed = true;
                mirror.retain(|key, _| object.contains_key(key));
            }
            return changed;
        }

        if let Mirror::Scalar(seen) = &*self {
            if seen.same(value) {
                return false;
            }
        }
        *self = Mirror::Scalar(value.clone());
        true
    }
}

#[derive(Default)]
struct CollectionState {
    mirror: Mirror,
    changes: u64,
    latest: Value,
    previous: Option<Value>,
}

impl Scope {
    /// Watches the shallow structure of a collection.
    ///
    /// Arrays and array-like values are compared element by element, objects
    /// key by key, both by identity. Anything else is compared like an
    /// ordinary watch. `react` receives the current value and a shallow
    /// snapshot taken after the previous reaction; on the first reaction both
    /// arguments are the same value.
    ///
    /// ```
    /// # use reactive_scope::prelude::*;
    /// # use std::{cell::Cell, rc::Rc};
    /// let root = Scope::new_root();
    /// let list = Value::array([1, 2, 3]);
    /// root.set("list", list.clone());
    ///
    /// let changes = Rc::new(Cell::new(0));
    /// let _handle = root.watch_collection(
    ///     |scope: &Scope| scope.get("list"),
    ///     {
    ///         let changes = Rc::clone(&changes);
    ///         move |_: &Value, _: &Value, _: &Scope| {
    ///             changes.set(changes.get() + 1)
    ///         }
    ///     },
    /// );
    /// root.digest().unwrap();
    /// list.as_array().unwrap().push(4);
    /// root.digest().unwrap();
    /// assert_eq!(changes.get(), 2);
    /// ```
    pub fn watch_collection<O, R>(
        &self,
        observe: impl Fn(&Scope) -> O + 'static,
        react: impl Fn(&Value, &Value, &Scope) -> R + 'static,
    ) -> WatchHandle
    where
        O: IntoCallbackResult<Value>,
        R: IntoCallbackResult<()>,
    {
        let state = Rc::new(RefCell::new(CollectionState::default()));

        let observe_state = Rc::clone(&state);
        let counter = move |scope: &Scope| {
            let value = observe(scope).into_callback_result()?;
            let mut state = observe_state.borrow_mut();
            if state.mirror.refresh(&value) {
                state.changes += 1;
            }
            state.latest = value;
            Ok::<_, CallbackError>(Value::from(state.changes))
        };

        let reaction = move |_: &Value, _: &Value, scope: &Scope| {
            let (new, old) = {
                let mut state = state.borrow_mut();
                let new = state.latest.clone();
                let old = state.previous.take().unwrap_or_else(|| new.clone());
                state.previous = Some(new.shallow_copy());
                (new, old)
            };
            react(&new, &old, scope).into_callback_result()
        };

        self.register_watch(Box::new(counter), Box::new(reaction), false)
    }
}
