//! The digest loop.
//!
//! A digest walks the tree from a digest root, evaluating every watch, and
//! keeps walking until a full pass finds nothing dirty. Each pass visits
//! scopes parents-first and, within a scope, watches in registration order.
//! Watches added during a pass are visited in that same pass; watches removed
//! during a pass are skipped and swept out on the next visit to their scope.
//!
//! Two shortcuts keep a settled tree cheap to check:
//! - the watch that most recently fired is remembered, and a pass that comes
//!   back round to it while it is clean stops right there, since nothing has
//!   changed since;
//! - registering or removing any watch forgets that watch, so structural
//!   changes always get a full pass.

use crate::{
    diagnostics::ErrorSource,
    error::ScopeError,
    scope::{tree::Tree, Phase, Scope, ScopeId},
};
use std::{mem, rc::Rc};
use tracing::trace;

impl Scope {
    /// Runs the digest loop from this scope's digest root until every watch
    /// is clean, then runs any post-digest callbacks.
    ///
    /// # Errors
    /// - [`ScopeError::InProgress`] if a digest or apply is already running
    ///   in this tree.
    /// - [`ScopeError::IterationsExceeded`] if the tree is still dirty after
    ///   the configured number of passes.
    pub fn digest(&self) -> Result<(), ScopeError> {
        match self.tree.with_node(self.id, |node| node.digest_root) {
            Some(start) => self.tree.digest_from(start),
            None => Ok(()),
        }
    }
}

impl Tree {
    pub(crate) fn digest_from(
        self: &Rc<Self>,
        start: ScopeId,
    ) -> Result<(), ScopeError> {
        if !self.is_live(start) {
            return Ok(());
        }
        {
            let _phase = self.begin_phase(Phase::Digest)?;
            self.last_dirty_watch.set(None);

            let flush = self.apply_async_flush.borrow_mut().take();
            if let Some(flush) = flush {
                flush.abort();
                self.flush_apply_async();
            }

            let ttl = self.config.digest_ttl;
            let mut remaining = ttl;
            let mut passes = 0_usize;
            loop {
                self.drain_async_queue(ttl)?;
                let dirty = self.digest_once(start);
                passes += 1;
                let queued = !self.async_queue.borrow().is_empty();
                if !dirty && !queued {
                    break;
                }
                if remaining == 0 {
                    return Err(ScopeError::IterationsExceeded { ttl });
                }
                remaining -= 1;
            }
            trace!(passes, "digest settled");
        }
        self.run_post_digest();
        Ok(())
    }

    /// Runs queued `eval_async` tasks, including tasks they queue in turn.
    fn drain_async_queue(
        self: &Rc<Self>,
        ttl: usize,
    ) -> Result<(), ScopeError> {
        let mut rounds = 0;
        loop {
            if self.async_queue.borrow().is_empty() {
                return Ok(());
            }
            if rounds == ttl {
                return Err(ScopeError::IterationsExceeded { ttl });
            }
            rounds += 1;
            let batch = mem::take(&mut *self.async_queue.borrow_mut());
            trace!(tasks = batch.len(), "draining async queue");
            for task in batch {
                self.run_task(task, ErrorSource::EvalAsync);
            }
        }
    }

    /// One pass over the subtree at `start`. Returns whether any watch fired.
    fn digest_once(self: &Rc<Self>, start: ScopeId) -> bool {
        let mut dirty = false;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let swept = self.with_node_mut(id, |node| {
                let (live, removed): (Vec<_>, Vec<_>) = mem::take(
                    &mut node.watches,
                )
                .into_iter()
                .partition(|watch| !watch.removed.get());
                node.watches = live;
                removed
            });
            let Some(swept) = swept else { continue };
            drop(swept);

            let scope = self.scope(id);
            let mut index = 0;
            loop {
                let next = self
                    .with_node(id, |node| node.watches.get(index).cloned())
                    .flatten();
                let Some(watch) = next else { break };
                index += 1;
                if watch.removed.get() {
                    continue;
                }
                if watch.check(&scope) {
                    dirty = true;
                } else if self.last_dirty_watch.get() == Some(watch.id) {
                    return dirty;
                }
            }

            if let Some(children) =
                self.with_node(id, |node| node.children.clone())
            {
                stack.extend(children.into_iter().rev());
            }
        }
        dirty
    }
}
