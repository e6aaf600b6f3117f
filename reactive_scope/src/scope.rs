//! Scopes: the nodes of an observation tree.
//!
//! A [`Scope`] is a cheap, clonable handle onto one node of a tree. Every node
//! holds its own properties, watches and event listeners. Property reads fall
//! through to the parent unless the scope is isolated; writes always land on
//! the scope itself.
//!
//! ```
//! # use reactive_scope::prelude::*;
//! let root = Scope::new_root();
//! root.set("user", "alice");
//!
//! let child = root.new_scope();
//! let isolated = root.new_isolated_scope();
//! assert_eq!(child.get("user"), Value::from("alice"));
//! assert!(isolated.get("user").is_undefined());
//!
//! child.set("user", "bob");
//! assert_eq!(root.get("user"), Value::from("alice"));
//! ```

use crate::{config::ScopeConfig, error::ScopeError, value::Value};
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

pub(crate) mod tree;

pub(crate) use tree::ScopeId;
use tree::{ScopeNode, Tree};

/// What the tree is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// A digest loop is running.
    Digest,
    /// The function passed to [`Scope::apply`] is running.
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Digest => f.write_str("digest"),
            Phase::Apply => f.write_str("apply"),
        }
    }
}

/// Options for [`Scope::new_child`].
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct ChildOptions {
    /// Whether property reads stop at the new scope.
    #[builder(default)]
    pub isolated: bool,
    /// Where digests started from the new scope (and its descendants) begin.
    ///
    /// Must be the creating scope or one of its ancestors. Defaults to the
    /// creating scope's own digest root.
    #[builder(default, setter(strip_option))]
    pub digest_root: Option<Scope>,
}

/// A handle onto one node of a scope tree.
///
/// Handles stay valid after the node is destroyed: every operation on a
/// destroyed scope is a no-op and every read returns [`Value::Undefined`].
#[derive(Clone)]
pub struct Scope {
    pub(crate) tree: Rc<Tree>,
    pub(crate) id: ScopeId,
}

impl Scope {
    /// Creates the root of a new tree with the default configuration.
    pub fn new_root() -> Self {
        Self::new_root_with(ScopeConfig::default())
    }

    /// Creates the root of a new tree.
    pub fn new_root_with(config: ScopeConfig) -> Self {
        let tree = Tree::new(config);
        debug!(ttl = tree.config.digest_ttl, "created root scope");
        Self {
            id: tree.root,
            tree,
        }
    }

    /// Creates a child that reads through to this scope's properties.
    pub fn new_scope(&self) -> Scope {
        self.new_child(ChildOptions::default())
    }

    /// Creates a child that does not see this scope's properties.
    pub fn new_isolated_scope(&self) -> Scope {
        self.new_child(ChildOptions::builder().isolated(true).build())
    }

    /// Creates a child scope.
    ///
    /// A child of a destroyed scope is created already destroyed.
    pub fn new_child(&self, options: ChildOptions) -> Scope {
        let Some(inherited) =
            self.tree.with_node(self.id, |node| node.digest_root)
        else {
            return self.tree.scope(ScopeId::default());
        };
        let digest_root = match options.digest_root {
            None => inherited,
            Some(root)
                if Rc::ptr_eq(&root.tree, &self.tree)
                    && self.tree.is_ancestor_or_self(root.id, self.id) =>
            {
                root.id
            }
            Some(root) => {
                warn!(
                    requested = ?root,
                    "digest root must be the creating scope or an ancestor; \
                     inheriting instead"
                );
                inherited
            }
        };
        let id = self.tree.nodes.borrow_mut().insert(ScopeNode {
            parent: Some(self.id),
            prototype: (!options.isolated).then_some(self.id),
            digest_root,
            isolated: options.isolated,
            ..Default::default()
        });
        self.tree.with_node_mut(self.id, |node| node.children.push(id));
        debug!(?id, isolated = options.isolated, "created child scope");
        self.tree.scope(id)
    }

    /// Reads `key` from this scope or, unless isolated, its ancestors.
    pub fn get(&self, key: &str) -> Value {
        let nodes = self.tree.nodes.borrow();
        let mut current = Some(self.id);
        while let Some(id) = current {
            let Some(node) = nodes.get(id) else { break };
            if let Some(value) = node.properties.get(key) {
                return value.clone();
            }
            current = node.prototype;
        }
        Value::Undefined
    }

    /// Reads `key` from this scope only.
    pub fn get_own(&self, key: &str) -> Value {
        self.tree
            .with_node(self.id, |node| node.properties.get(key).cloned())
            .flatten()
            .unwrap_or_default()
    }

    /// Whether `key` is visible from this scope.
    pub fn has(&self, key: &str) -> bool {
        let nodes = self.tree.nodes.borrow();
        let mut current = Some(self.id);
        while let Some(id) = current {
            let Some(node) = nodes.get(id) else { break };
            if node.properties.contains_key(key) {
                return true;
            }
            current = node.prototype;
        }
        false
    }

    /// Whether `key` is set on this scope itself.
    pub fn has_own(&self, key: &str) -> bool {
        self.tree
            .with_node(self.id, |node| node.properties.contains_key(key))
            .unwrap_or(false)
    }

    /// Sets `key` on this scope, shadowing any inherited value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let (key, value) = (key.into(), value.into());
        let replaced = self.tree.with_node_mut(self.id, |node| {
            node.properties.insert(key, value)
        });
        drop(replaced);
    }

    /// Removes `key` from this scope, exposing any inherited value again.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.tree
            .with_node_mut(self.id, |node| node.properties.shift_remove(key))
            .flatten()
    }

    /// The keys set on this scope itself, in insertion order.
    pub fn own_keys(&self) -> Vec<String> {
        self.tree
            .with_node(self.id, |node| {
                node.properties.keys().cloned().collect()
            })
            .unwrap_or_default()
    }

    /// The scope this one was created from.
    pub fn parent(&self) -> Option<Scope> {
        self.tree
            .with_node(self.id, |node| node.parent)
            .flatten()
            .map(|id| self.tree.scope(id))
    }

    /// The root of this scope's tree.
    pub fn root(&self) -> Scope {
        self.tree.scope(self.tree.root)
    }

    /// Where digests started from this scope begin.
    pub fn digest_root(&self) -> Option<Scope> {
        self.tree
            .with_node(self.id, |node| node.digest_root)
            .map(|id| self.tree.scope(id))
    }

    /// The live children of this scope, in creation order.
    pub fn children(&self) -> Vec<Scope> {
        self.tree
            .with_node(self.id, |node| node.children.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|id| self.tree.scope(id))
            .collect()
    }

    /// Whether property reads stop at this scope.
    pub fn is_isolated(&self) -> bool {
        self.tree
            .with_node(self.id, |node| node.isolated)
            .unwrap_or(false)
    }

    /// Whether this scope has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        !self.tree.is_live(self.id)
    }

    /// Whether this is the root of its tree.
    pub fn is_root(&self) -> bool {
        self.id == self.tree.root
    }

    /// Number of active watches on this scope and its descendants.
    pub fn watch_count(&self) -> usize {
        let nodes = self.tree.nodes.borrow();
        self.tree
            .subtree(self.id)
            .into_iter()
            .filter_map(|id| nodes.get(id))
            .map(|node| {
                node.watches.iter().filter(|w| !w.removed.get()).count()
            })
            .sum()
    }

    /// What the tree is doing right now, if anything.
    pub fn phase(&self) -> Option<Phase> {
        self.tree.phase.get()
    }

    /// The iteration ceiling of this tree's digests.
    pub fn digest_ttl(&self) -> usize {
        self.tree.config.digest_ttl
    }

    /// Runs `f` against this scope. No digest follows.
    pub fn eval<T>(&self, f: impl FnOnce(&Scope) -> T) -> T {
        f(self)
    }

    /// Runs `f` against this scope with an extra argument. No digest follows.
    pub fn eval_with<A, T>(&self, f: impl FnOnce(&Scope, A) -> T, arg: A) -> T {
        f(self, arg)
    }

    /// Runs `f` in the apply phase, then digests from this scope's digest
    /// root.
    ///
    /// The digest runs even if `f` panics; the panic then continues. An error
    /// returned by `f` itself is handed back inside `Ok`.
    ///
    /// On a destroyed scope `f` still runs, so its result can be returned,
    /// but no phase is entered and no digest follows.
    pub fn apply<T>(
        &self,
        f: impl FnOnce(&Scope) -> T,
    ) -> Result<T, ScopeError> {
        let Some(start) =
            self.tree.with_node(self.id, |node| node.digest_root)
        else {
            return Ok(f(self));
        };
        let outcome = {
            let _phase = self.tree.begin_phase(Phase::Apply)?;
            panic::catch_unwind(AssertUnwindSafe(|| f(self)))
        };
        let digested = self.tree.digest_from(start);
        match outcome {
            Ok(value) => digested.map(|()| value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Destroys this scope and everything below it.
    ///
    /// `"$destroy"` is broadcast first, so every node of the subtree sees it
    /// once while still attached. Afterwards the nodes are gone: they take no
    /// part in digests or events, and their watches and listeners are
    /// dropped.
    pub fn destroy(&self) {
        let proceed = self
            .tree
            .with_node_mut(self.id, |node| {
                !std::mem::replace(&mut node.destroying, true)
            })
            .unwrap_or(false);
        if !proceed {
            return;
        }
        for id in self.tree.subtree(self.id) {
            self.tree.with_node_mut(id, |node| node.destroying = true);
        }

        self.broadcast("$destroy", &[]);

        let parent = self.tree.with_node(self.id, |node| node.parent).flatten();
        if let Some(parent) = parent {
            self.tree.with_node_mut(parent, |node| {
                node.children.retain(|child| *child != self.id)
            });
        }
        let ids = self.tree.subtree(self.id);
        let removed = {
            let mut nodes = self.tree.nodes.borrow_mut();
            ids.iter().filter_map(|id| nodes.remove(*id)).collect::<Vec<_>>()
        };
        self.tree.last_dirty_watch.set(None);
        if self.is_root() {
            self.tree.clear_queues();
        }
        debug!(id = ?self.id, scopes = removed.len(), "destroyed scope");
        drop(removed);
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("root", &self.is_root())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
