use super::{Observer, WatchHandle};
use crate::{
    error::{CallbackError, IntoCallbackResult},
    scope::Scope,
    value::{Array, Value},
};
use std::{cell::Cell, rc::Rc};

type GroupReaction =
    dyn Fn(&Value, &Value, &Scope) -> Result<(), CallbackError>;

struct GroupState {
    new_values: Array,
    old_values: Array,
    scheduled: Cell<bool>,
    first_run: Cell<bool>,
    react: Box<GroupReaction>,
}

impl GroupState {
    fn fire(&self, scope: &Scope) -> Result<(), CallbackError> {
        self.scheduled.set(false);
        let new = Value::Array(self.new_values.clone());
        if self.first_run.replace(false) {
            (self.react)(&new, &new, scope)
        } else {
            (self.react)(&new, &Value::Array(self.old_values.clone()), scope)
        }
    }
}

impl Scope {
    /// Watches several values at once, with a single reaction.
    ///
    /// Each observer gets a watch of its own. When any of them changes during
    /// a digest, `react` runs once, later in that digest, with an array of
    /// the latest values and an array of the values each observer had before
    /// its last change. On the first run both arguments are the same array.
    ///
    /// With no observers, `react` runs once with two empty arrays and never
    /// again.
    pub fn watch_group<R>(
        &self,
        observers: Vec<Observer>,
        react: impl Fn(&Value, &Value, &Scope) -> R + 'static,
    ) -> WatchHandle
    where
        R: IntoCallbackResult<()>,
    {
        if observers.is_empty() {
            let armed = Rc::new(Cell::new(true));
            let fire = Rc::clone(&armed);
            self.eval_async(move |scope: &Scope| {
                if !fire.replace(false) {
                    return Ok(());
                }
                let empty = Value::Array(Array::new());
                react(&empty, &empty, scope).into_callback_result()
            });
            return WatchHandle::new(&self.tree).with_pending(armed);
        }

        let len = observers.len();
        let state = Rc::new(GroupState {
            new_values: Array::from_vec(vec![Value::Undefined; len]),
            old_values: Array::from_vec(vec![Value::Undefined; len]),
            scheduled: Cell::new(false),
            first_run: Cell::new(true),
            react: Box::new(move |new: &Value, old: &Value, scope: &Scope| {
                react(new, old, scope).into_callback_result()
            }),
        });

        let mut handle = WatchHandle::new(&self.tree);
        for (index, Observer(observe)) in observers.into_iter().enumerate() {
            let state = Rc::clone(&state);
            let member = self.register_watch(
                observe,
                Box::new(move |new: &Value, old: &Value, scope: &Scope| {
                    state.new_values.set(index, new.clone());
                    state.old_values.set(index, old.clone());
                    if !state.scheduled.replace(true) {
                        let state = Rc::clone(&state);
                        scope.eval_async(move |scope: &Scope| {
                            state.fire(scope)
                        });
                    }
                    Ok::<(), CallbackError>(())
                }),
                false,
            );
            handle.track(member);
        }
        handle
    }
}
