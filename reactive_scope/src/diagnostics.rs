//! Reporting of failures raised by user callbacks.
//!
//! A failing watch, listener or queued task never aborts the loop that called
//! it. The failure is handed to the tree's [`ExceptionHandler`] together with
//! an [`ErrorSource`] naming the boundary where it was caught, and processing
//! moves on to the next callback.

use crate::error::CallbackError;
use std::fmt;

/// The boundary at which a callback failure was caught.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorSource {
    /// A watch's observe function.
    Watch,
    /// A watch's reaction.
    Reaction,
    /// An event listener for the named event.
    Listener(String),
    /// A task queued with `eval_async`.
    EvalAsync,
    /// A task queued with `apply_async`.
    ApplyAsync,
    /// A callback queued with `post_digest`.
    PostDigest,
    /// A digest started by a deferred task, which has no caller to return to.
    DeferredDigest,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Watch => f.write_str("watch"),
            ErrorSource::Reaction => f.write_str("watch reaction"),
            ErrorSource::Listener(name) => write!(f, "listener for {name:?}"),
            ErrorSource::EvalAsync => f.write_str("eval_async task"),
            ErrorSource::ApplyAsync => f.write_str("apply_async task"),
            ErrorSource::PostDigest => f.write_str("post-digest callback"),
            ErrorSource::DeferredDigest => f.write_str("deferred digest"),
        }
    }
}

/// Receives every failure caught at a callback boundary.
pub trait ExceptionHandler {
    /// Handles one failure.
    fn handle(&self, error: &CallbackError, source: &ErrorSource);
}

impl<F> ExceptionHandler for F
where
    F: Fn(&CallbackError, &ErrorSource),
{
    fn handle(&self, error: &CallbackError, source: &ErrorSource) {
        self(error, source)
    }
}

/// The default handler: logs each failure at the `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExceptions;

impl ExceptionHandler for LogExceptions {
    fn handle(&self, error: &CallbackError, source: &ErrorSource) {
        tracing::error!(%source, %error, "callback failed");
    }
}
