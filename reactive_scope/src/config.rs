//! Tree-wide configuration and the root-scope provider.

use crate::{
    diagnostics::{ExceptionHandler, LogExceptions},
    error::{ConfigError, ScopeError},
    scheduler::{GlobalExecutor, TaskSpawner},
    scope::Scope,
};
use std::{
    cell::{OnceCell, RefCell},
    env, fmt,
    rc::Rc,
};
use typed_builder::TypedBuilder;

/// The iteration ceiling used when none is configured.
pub const DEFAULT_DIGEST_TTL: usize = 10;

/// The environment variable read by [`ScopeConfig::try_from_env`].
pub const DIGEST_TTL_ENV: &str = "SCOPE_DIGEST_TTL";

/// Settings shared by every scope of one tree.
///
/// ```
/// # use reactive_scope::prelude::*;
/// let config = ScopeConfig::builder()
///     .digest_ttl(20)
///     .exception_handler(|error: &CallbackError, source: &ErrorSource| {
///         eprintln!("{source}: {error}");
///     })
///     .build();
/// let root = Scope::new_root_with(config);
/// assert_eq!(root.digest_ttl(), 20);
/// ```
#[derive(Clone, TypedBuilder)]
pub struct ScopeConfig {
    /// How many dirty passes a digest may run before it gives up.
    #[builder(default = DEFAULT_DIGEST_TTL)]
    pub digest_ttl: usize,
    /// Receives failures raised by user callbacks.
    #[builder(
        default = Rc::new(LogExceptions) as Rc<dyn ExceptionHandler>,
        setter(transform = |handler: impl ExceptionHandler + 'static| {
            Rc::new(handler) as Rc<dyn ExceptionHandler>
        })
    )]
    pub exception_handler: Rc<dyn ExceptionHandler>,
    /// Runs deferred digests and apply-async flushes.
    #[builder(
        default = Rc::new(GlobalExecutor) as Rc<dyn TaskSpawner>,
        setter(transform = |spawner: impl TaskSpawner + 'static| {
            Rc::new(spawner) as Rc<dyn TaskSpawner>
        })
    )]
    pub spawner: Rc<dyn TaskSpawner>,
}

impl ScopeConfig {
    /// Builds the default configuration, taking the digest TTL from
    /// `SCOPE_DIGEST_TTL` when it is set.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let digest_ttl = match env_wo_default(DIGEST_TTL_ENV) {
            None => DEFAULT_DIGEST_TTL,
            Some(raw) => ttl_from_str(&raw)?,
        };
        Ok(Self::builder().digest_ttl(digest_ttl).build())
    }
}

fn env_wo_default(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn ttl_from_str(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(ttl) if ttl > 0 => Ok(ttl),
        _ => Err(ConfigError::InvalidTtl {
            name: DIGEST_TTL_ENV,
            value: raw.to_string(),
        }),
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ScopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeConfig")
            .field("digest_ttl", &self.digest_ttl)
            .finish_non_exhaustive()
    }
}

/// Hands out the single root scope of an application.
///
/// The digest TTL may be adjusted until the root is first requested. After
/// that, every call to [`root_scope`](Self::root_scope) returns a handle to
/// the same tree.
pub struct RootScopeProvider {
    config: RefCell<ScopeConfig>,
    root: OnceCell<Scope>,
}

impl RootScopeProvider {
    /// Creates a provider that will build its root with `config`.
    pub fn new(config: ScopeConfig) -> Self {
        Self {
            config: RefCell::new(config),
            root: OnceCell::new(),
        }
    }

    /// The TTL the root is, or will be, built with.
    pub fn digest_ttl(&self) -> usize {
        self.config.borrow().digest_ttl
    }

    /// Changes the TTL. Fails once the root scope has been built.
    pub fn set_digest_ttl(&self, ttl: usize) -> Result<(), ScopeError> {
        if self.root.get().is_some() {
            return Err(ScopeError::ConfigLocked);
        }
        self.config.borrow_mut().digest_ttl = ttl;
        Ok(())
    }

    /// Returns the root scope, building it on first use.
    pub fn root_scope(&self) -> Scope {
        self.root
            .get_or_init(|| Scope::new_root_with(self.config.borrow().clone()))
            .clone()
    }
}

impl Default for RootScopeProvider {
    fn default() -> Self {
        Self::new(ScopeConfig::default())
    }
}
