use super::Phase;
use crate::{
    config::ScopeConfig,
    diagnostics::ErrorSource,
    error::{CallbackError, ScopeError},
    event::Listener,
    scheduler::{AsyncTask, PostDigestTask},
    scope::Scope,
    value::Value,
    watch::Watch,
};
use futures::future::AbortHandle;
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use slotmap::{new_key_type, SlotMap};
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

new_key_type! {
    /// Unique identifier for a scope node in its tree's arena.
    pub(crate) struct ScopeId;
}

pub(crate) type Properties = IndexMap<String, Value, FxBuildHasher>;

#[derive(Default)]
pub(crate) struct ScopeNode {
    pub parent: Option<ScopeId>,
    /// Where property reads fall through to. `None` for roots and isolated
    /// scopes.
    pub prototype: Option<ScopeId>,
    pub digest_root: ScopeId,
    pub isolated: bool,
    pub properties: Properties,
    pub watches: Vec<Rc<Watch>>,
    pub children: Vec<ScopeId>,
    pub listeners: FxHashMap<String, Vec<Rc<Listener>>>,
    pub destroying: bool,
}

/// State shared by every scope of one tree.
pub(crate) struct Tree {
    pub nodes: RefCell<SlotMap<ScopeId, ScopeNode>>,
    pub root: ScopeId,
    pub phase: Cell<Option<Phase>>,
    pub async_queue: RefCell<VecDeque<AsyncTask>>,
    pub apply_async_queue: RefCell<VecDeque<AsyncTask>>,
    pub apply_async_flush: RefCell<Option<AbortHandle>>,
    pub post_digest_queue: RefCell<VecDeque<PostDigestTask>>,
    pub last_dirty_watch: Cell<Option<u64>>,
    next_watch_id: Cell<u64>,
    pub config: ScopeConfig,
}

impl Tree {
    pub fn new(config: ScopeConfig) -> Rc<Self> {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert_with_key(|id| ScopeNode {
            digest_root: id,
            ..Default::default()
        });
        Rc::new(Self {
            nodes: RefCell::new(nodes),
            root,
            phase: Cell::new(None),
            async_queue: Default::default(),
            apply_async_queue: Default::default(),
            apply_async_flush: Default::default(),
            post_digest_queue: Default::default(),
            last_dirty_watch: Cell::new(None),
            next_watch_id: Cell::new(0),
            config,
        })
    }

    pub fn scope(self: &Rc<Self>, id: ScopeId) -> Scope {
        Scope {
            tree: Rc::clone(self),
            id,
        }
    }

    pub fn is_live(&self, id: ScopeId) -> bool {
        self.nodes.borrow().contains_key(id)
    }

    /// Runs `f` on the node, if it still exists. No user code may run in `f`.
    pub fn with_node<T>(
        &self,
        id: ScopeId,
        f: impl FnOnce(&ScopeNode) -> T,
    ) -> Option<T> {
        self.nodes.borrow().get(id).map(f)
    }

    /// Runs `f` on the node mutably, if it still exists. No user code may run
    /// in `f`.
    pub fn with_node_mut<T>(
        &self,
        id: ScopeId,
        f: impl FnOnce(&mut ScopeNode) -> T,
    ) -> Option<T> {
        self.nodes.borrow_mut().get_mut(id).map(f)
    }

    /// Ids of `id` and all of its descendants, parents before children.
    pub fn subtree(&self, id: ScopeId) -> Vec<ScopeId> {
        let nodes = self.nodes.borrow();
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = nodes.get(next) else {
                continue;
            };
            out.push(next);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Whether `ancestor` is `id` or one of its parents.
    pub fn is_ancestor_or_self(&self, ancestor: ScopeId, id: ScopeId) -> bool {
        let nodes = self.nodes.borrow();
        let mut current = Some(id);
        while let Some(next) = current {
            if next == ancestor {
                return true;
            }
            current = nodes.get(next).and_then(|node| node.parent);
        }
        false
    }

    pub fn next_watch_id(&self) -> u64 {
        let id = self.next_watch_id.get();
        self.next_watch_id.set(id + 1);
        id
    }

    /// Hands a callback failure to the configured exception handler.
    pub fn report(&self, error: &CallbackError, source: ErrorSource) {
        self.config.exception_handler.handle(error, &source);
    }

    /// Marks the tree as being in `phase` until the guard is dropped.
    pub fn begin_phase(
        &self,
        phase: Phase,
    ) -> Result<PhaseGuard<'_>, ScopeError> {
        match self.phase.get() {
            Some(current) => Err(ScopeError::InProgress(current)),
            None => {
                self.phase.set(Some(phase));
                Ok(PhaseGuard(self))
            }
        }
    }

    /// Drops every queued task and cancels the pending flush.
    pub fn clear_queues(&self) {
        let async_tasks = std::mem::take(&mut *self.async_queue.borrow_mut());
        let apply_tasks =
            std::mem::take(&mut *self.apply_async_queue.borrow_mut());
        let post_digest =
            std::mem::take(&mut *self.post_digest_queue.borrow_mut());
        if let Some(flush) = self.apply_async_flush.borrow_mut().take() {
            flush.abort();
        }
        drop((async_tasks, apply_tasks, post_digest));
    }
}

/// Clears the tree's phase marker when dropped.
pub(crate) struct PhaseGuard<'a>(&'a Tree);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.phase.set(None);
    }
}
