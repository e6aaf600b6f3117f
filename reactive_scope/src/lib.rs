#![deny(missing_docs)]
#![forbid(unsafe_code)]

//! A dirty-checking scope tree.
//!
//! State lives on [`Scope`](scope::Scope)s arranged in a tree. Instead of
//! tracking writes, the tree finds changes by polling: every
//! [`watch`](scope::Scope::watch) pairs an observe function with a reaction,
//! and a [`digest`](scope::Scope::digest) re-runs the observe functions until
//! none of them report a new value. Reactions may change state further, so
//! the digest keeps going until the tree settles, or gives up after a
//! configured number of passes.
//!
//! ```
//! use reactive_scope::prelude::*;
//!
//! let root = Scope::new_root();
//! root.set("first", "Ada");
//! root.set("last", "Lovelace");
//!
//! let _full_name = root.watch(
//!     |scope: &Scope| {
//!         let first = scope.get("first");
//!         let last = scope.get("last");
//!         Value::from(format!(
//!             "{} {}",
//!             first.as_str().unwrap_or_default(),
//!             last.as_str().unwrap_or_default()
//!         ))
//!     },
//!     |new: &Value, _old: &Value, scope: &Scope| {
//!         scope.set("full", new.clone())
//!     },
//!     false,
//! );
//!
//! root.digest().unwrap();
//! assert_eq!(root.get("full"), Value::from("Ada Lovelace"));
//!
//! root.apply(|scope| scope.set("first", "Augusta")).unwrap();
//! assert_eq!(root.get("full"), Value::from("Augusta Lovelace"));
//! ```
//!
//! ## Building blocks
//! - [`value`]: the dynamic values scopes hold and watches compare.
//! - [`scope`]: tree structure, properties, `eval`, `apply` and `destroy`.
//! - [`watch`]: plain, collection and grouped watches.
//! - [`scheduler`]: `eval_async`, `apply_async` and `post_digest`.
//! - [`event`]: `emit` and `broadcast`.
//! - [`config`] and [`diagnostics`]: tree-wide settings and failure
//!   reporting.

pub mod config;
pub mod diagnostics;
mod digest;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod scope;
pub mod value;
pub mod watch;

/// Reexports frequently-used items.
pub mod prelude {
    pub use crate::{
        config::{RootScopeProvider, ScopeConfig, DEFAULT_DIGEST_TTL},
        diagnostics::{ErrorSource, ExceptionHandler, LogExceptions},
        error::{CallbackError, ConfigError, IntoCallbackResult, ScopeError},
        event::{Event, ListenerHandle},
        scheduler::{GlobalExecutor, TaskQueue, TaskSpawner},
        scope::{ChildOptions, Phase, Scope},
        value::{is_array_like, Array, Object, ObjectKind, Value},
        watch::{Observer, WatchHandle},
    };
}
