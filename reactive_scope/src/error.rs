//! Errors surfaced to callers of tree operations.

use crate::{scope::Phase, value::Value};
use thiserror::Error;

/// The boxed error type produced by a failing user callback.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into it with `?`
/// or [`Into`].
pub type CallbackError = throw_error::Error;

/// An error returned by a digest or by root-scope configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// The digest loop was still dirty when its iteration ceiling ran out.
    #[error("{ttl} digest iterations reached without the scope tree settling")]
    IterationsExceeded {
        /// The ceiling that was in effect.
        ttl: usize,
    },
    /// A digest or apply was requested while one is already running.
    #[error("{0} already in progress")]
    InProgress(Phase),
    /// The digest TTL can no longer change because the root already exists.
    #[error("the digest TTL cannot be changed once the root scope exists")]
    ConfigLocked,
}

/// An error reading scope configuration from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be used.
    #[error("{name} must be a positive whole number, found {value:?}")]
    InvalidTtl {
        /// The variable name.
        name: &'static str,
        /// The raw value found.
        value: String,
    },
}

/// Conversion of a callback's return value into the shape the tree stores.
///
/// This lets watches, listeners and queued tasks return either a plain value
/// or a `Result` whose error is reported instead of propagated.
pub trait IntoCallbackResult<T> {
    /// Performs the conversion.
    fn into_callback_result(self) -> Result<T, CallbackError>;
}

impl IntoCallbackResult<()> for () {
    fn into_callback_result(self) -> Result<(), CallbackError> {
        Ok(())
    }
}

impl<E> IntoCallbackResult<()> for Result<(), E>
where
    E: Into<CallbackError>,
{
    fn into_callback_result(self) -> Result<(), CallbackError> {
        self.map_err(Into::into)
    }
}

impl IntoCallbackResult<Value> for Value {
    fn into_callback_result(self) -> Result<Value, CallbackError> {
        Ok(self)
    }
}

impl<E> IntoCallbackResult<Value> for Result<Value, E>
where
    E: Into<CallbackError>,
{
    fn into_callback_result(self) -> Result<Value, CallbackError> {
        self.map_err(Into::into)
    }
}
