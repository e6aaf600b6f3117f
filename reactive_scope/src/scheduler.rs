//! Deferred work layered on top of the digest.
//!
//! Three queues hang off the tree root:
//! - [`Scope::eval_async`] work is drained at the start of every digest pass,
//!   and schedules a deferred digest when nothing else will run one.
//! - [`Scope::apply_async`] work is coalesced into a single deferred `apply`,
//!   or drained early by whichever digest starts first.
//! - [`Scope::post_digest`] callbacks run once after the next digest settles.
//!
//! The deferred parts are handed to the tree's [`TaskSpawner`].

use crate::{
    diagnostics::ErrorSource,
    error::{CallbackError, IntoCallbackResult},
    scope::{tree::Tree, Scope, ScopeId},
};
use any_spawner::{Executor, PinnedLocalFuture};
use futures::{
    executor::{LocalPool, LocalSpawner},
    future::{AbortHandle, Abortable},
    task::LocalSpawnExt,
};
use std::{cell::RefCell, fmt, rc::Rc};
use tracing::{debug, trace, warn};

/// Runs futures that must stay on the current thread.
pub trait TaskSpawner {
    /// Spawns `task` to run later, on this thread.
    fn spawn_local(&self, task: PinnedLocalFuture<()>);
}

/// Spawns onto the global [`any_spawner::Executor`].
///
/// One of the `Executor::init_*` functions must have been called first.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalExecutor;

impl TaskSpawner for GlobalExecutor {
    fn spawn_local(&self, task: PinnedLocalFuture<()>) {
        Executor::spawn_local(task);
    }
}

/// A task queue pumped by its owner.
///
/// Useful for hosts that drive their own event loop: deferred digests pile up
/// here until [`run_pending`](Self::run_pending) is called.
///
/// ```
/// # use reactive_scope::prelude::*;
/// let tasks = TaskQueue::new();
/// let config = ScopeConfig::builder().spawner(tasks.clone()).build();
/// let root = Scope::new_root_with(config);
/// root.eval_async(|scope: &Scope| scope.set("ready", true));
/// assert!(root.get("ready").is_undefined());
/// tasks.run_pending();
/// assert_eq!(root.get("ready"), Value::Bool(true));
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    pool: Rc<RefCell<LocalPool>>,
    spawner: LocalSpawner,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: Rc::new(RefCell::new(pool)),
            spawner,
        }
    }

    /// Runs queued tasks until none of them can make progress.
    ///
    /// # Panics
    /// Panics if called from inside one of the queue's own tasks.
    pub fn run_pending(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").finish_non_exhaustive()
    }
}

impl TaskSpawner for TaskQueue {
    fn spawn_local(&self, task: PinnedLocalFuture<()>) {
        if let Err(error) = self.spawner.spawn_local(task) {
            warn!(%error, "task queue is shut down; task dropped");
        }
    }
}

/// A unit of queued work bound to the scope that queued it.
pub(crate) struct AsyncTask {
    pub scope: ScopeId,
    pub run: Box<dyn FnOnce(&Scope) -> Result<(), CallbackError>>,
}

pub(crate) type PostDigestTask = Box<dyn FnOnce() -> Result<(), CallbackError>>;

impl Tree {
    /// Runs one queued task if its scope is still alive.
    pub(crate) fn run_task(
        self: &Rc<Self>,
        task: AsyncTask,
        source: ErrorSource,
    ) {
        if !self.is_live(task.scope) {
            trace!(?source, "dropping task of a destroyed scope");
            return;
        }
        let scope = self.scope(task.scope);
        if let Err(error) = (task.run)(&scope) {
            self.report(&error, source);
        }
    }

    /// Runs every queued `apply_async` task in order.
    pub(crate) fn flush_apply_async(self: &Rc<Self>) {
        loop {
            let next = self.apply_async_queue.borrow_mut().pop_front();
            let Some(task) = next else { break };
            self.run_task(task, ErrorSource::ApplyAsync);
        }
    }

    /// Runs every queued post-digest callback in order.
    pub(crate) fn run_post_digest(&self) {
        loop {
            let next = self.post_digest_queue.borrow_mut().pop_front();
            let Some(callback) = next else { break };
            if let Err(error) = callback() {
                self.report(&error, ErrorSource::PostDigest);
            }
        }
    }

    fn schedule_deferred_digest(self: &Rc<Self>) {
        let tree = Rc::downgrade(self);
        self.config.spawner.spawn_local(Box::pin(async move {
            let Some(tree) = tree.upgrade() else { return };
            if tree.async_queue.borrow().is_empty() {
                return;
            }
            debug!("running deferred digest");
            if let Err(error) = tree.digest_from(tree.root) {
                tree.report(
                    &CallbackError::from(error),
                    ErrorSource::DeferredDigest,
                );
            }
        }));
    }

    fn schedule_apply_async_flush(self: &Rc<Self>) {
        let (handle, registration) = AbortHandle::new_pair();
        *self.apply_async_flush.borrow_mut() = Some(handle);
        let tree = Rc::downgrade(self);
        let flush = async move {
            let Some(tree) = tree.upgrade() else { return };
            tree.apply_async_flush.borrow_mut().take();
            debug!("flushing apply_async queue");
            let root = tree.scope(tree.root);
            let flushed = root.apply(|root| root.tree.flush_apply_async());
            if let Err(error) = flushed {
                tree.report(
                    &CallbackError::from(error),
                    ErrorSource::DeferredDigest,
                );
            }
        };
        self.config.spawner.spawn_local(Box::pin(async move {
            _ = Abortable::new(flush, registration).await;
        }));
    }
}

impl Scope {
    /// Queues `f` to run during the current or next digest of this tree.
    ///
    /// When no digest is running, a deferred digest is scheduled so the work
    /// runs even if nobody calls [`digest`](Scope::digest).
    pub fn eval_async<O>(&self, f: impl FnOnce(&Scope) -> O + 'static)
    where
        O: IntoCallbackResult<()>,
    {
        if !self.tree.is_live(self.id) {
            return;
        }
        let was_empty = self.tree.async_queue.borrow().is_empty();
        self.tree.async_queue.borrow_mut().push_back(AsyncTask {
            scope: self.id,
            run: Box::new(move |scope: &Scope| f(scope).into_callback_result()),
        });
        let flush_pending = self.tree.apply_async_flush.borrow().is_some();
        if was_empty && self.tree.phase.get().is_none() && !flush_pending {
            self.tree.schedule_deferred_digest();
        }
    }

    /// Queues `f` to run in a coalesced, deferred [`apply`](Scope::apply).
    ///
    /// Every call made before the flush fires shares a single digest. A digest
    /// that starts earlier runs the queued work itself and cancels the flush.
    pub fn apply_async<O>(&self, f: impl FnOnce(&Scope) -> O + 'static)
    where
        O: IntoCallbackResult<()>,
    {
        if !self.tree.is_live(self.id) {
            return;
        }
        self.tree.apply_async_queue.borrow_mut().push_back(AsyncTask {
            scope: self.id,
            run: Box::new(move |scope: &Scope| f(scope).into_callback_result()),
        });
        if self.tree.apply_async_flush.borrow().is_none() {
            self.tree.schedule_apply_async_flush();
        }
    }

    /// Queues `f` to run once after the next digest finishes, outside the
    /// digest phase.
    pub fn post_digest<O>(&self, f: impl FnOnce() -> O + 'static)
    where
        O: IntoCallbackResult<()>,
    {
        self.tree
            .post_digest_queue
            .borrow_mut()
            .push_back(Box::new(move || f().into_callback_result()));
    }
}
