//! Activation strategies and the registry that maps strategy names to implementations.
use std::{collections::HashMap, fmt, sync::Arc};

use derive_more::From;
use serde_json::Value;

use crate::{features::Parameters, Context, Error, Result};

/// An activation strategy deciding whether a feature is on for the given request.
pub trait Strategy: Send + Sync {
    /// `params` are the strategy parameters configured on the server for this feature.
    fn is_enabled(&self, params: &Parameters, context: &Context) -> bool;
}

/// A strategy that additionally receives the extra arguments passed to
/// [`Client::is_feature_enabled`](crate::Client::is_feature_enabled).
pub trait DynamicStrategy: Send + Sync {
    fn is_enabled(&self, params: &Parameters, context: &Context, args: &[Value]) -> bool;
}

impl<F> Strategy for F
where
    F: Fn(&Parameters, &Context) -> bool + Send + Sync,
{
    fn is_enabled(&self, params: &Parameters, context: &Context) -> bool {
        self(params, context)
    }
}

impl<F> DynamicStrategy for F
where
    F: Fn(&Parameters, &Context, &[Value]) -> bool + Send + Sync,
{
    fn is_enabled(&self, params: &Parameters, context: &Context, args: &[Value]) -> bool {
        self(params, context, args)
    }
}

/// Built-in strategy that is always on. Registered as `"default"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl Strategy for DefaultStrategy {
    fn is_enabled(&self, _params: &Parameters, _context: &Context) -> bool {
        true
    }
}

/// Either kind of strategy behind a single invocation contract.
#[derive(Clone, From)]
pub enum AnyStrategy {
    Simple(Arc<dyn Strategy>),
    Dynamic(Arc<dyn DynamicStrategy>),
}

impl AnyStrategy {
    pub fn simple(strategy: impl Strategy + 'static) -> Self {
        AnyStrategy::Simple(Arc::new(strategy))
    }

    pub fn dynamic(strategy: impl DynamicStrategy + 'static) -> Self {
        AnyStrategy::Dynamic(Arc::new(strategy))
    }

    /// Invoke the strategy. Simple strategies ignore `args`.
    pub fn is_enabled(&self, params: &Parameters, context: &Context, args: &[Value]) -> bool {
        match self {
            AnyStrategy::Simple(strategy) => strategy.is_enabled(params, context),
            AnyStrategy::Dynamic(strategy) => strategy.is_enabled(params, context, args),
        }
    }
}

impl fmt::Debug for AnyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyStrategy::Simple(_) => f.write_str("AnyStrategy::Simple"),
            AnyStrategy::Dynamic(_) => f.write_str("AnyStrategy::Dynamic"),
        }
    }
}

/// Returned by a strategy factory that cannot build its strategy.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct StrategyError {
    message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        StrategyError {
            message: message.into(),
        }
    }
}

type Factory = dyn Fn() -> std::result::Result<AnyStrategy, StrategyError> + Send + Sync;

#[derive(Clone)]
enum Entry {
    Instance(AnyStrategy),
    Factory(Arc<Factory>),
}

/// Maps strategy names (as referenced by feature definitions) to implementations.
///
/// A new registry knows the `"default"` strategy. Features referencing a name that is not
/// registered skip that strategy.
#[derive(Clone)]
pub struct StrategyRegistry {
    entries: HashMap<String, Entry>,
}

impl StrategyRegistry {
    /// Name of the built-in [`DefaultStrategy`].
    pub const DEFAULT: &'static str = "default";

    /// Create a registry with the built-in strategies.
    pub fn new() -> Self {
        let mut registry = StrategyRegistry::empty();
        registry.register(StrategyRegistry::DEFAULT, DefaultStrategy);
        registry
    }

    /// Create a registry without any strategies, not even `"default"`.
    pub fn empty() -> Self {
        StrategyRegistry {
            entries: HashMap::new(),
        }
    }

    /// Register a strategy instance under `name`, replacing any previous registration.
    ///
    /// ```
    /// # use unleash::{Context, Parameters, StrategyRegistry};
    /// let mut registry = StrategyRegistry::new();
    /// registry.register("beta", |_params: &Parameters, context: &Context| {
    ///     context.property("beta") == Some("true")
    /// });
    /// ```
    pub fn register(&mut self, name: impl Into<String>, strategy: impl Strategy + 'static) -> &mut Self {
        self.insert(name.into(), Entry::Instance(AnyStrategy::simple(strategy)))
    }

    /// Register a strategy that receives extra evaluation arguments.
    pub fn register_dynamic(
        &mut self,
        name: impl Into<String>,
        strategy: impl DynamicStrategy + 'static,
    ) -> &mut Self {
        self.insert(name.into(), Entry::Instance(AnyStrategy::dynamic(strategy)))
    }

    /// Register a factory that builds a fresh strategy on every evaluation. A factory returning an
    /// error makes evaluation fail with [`Error::InvalidStrategy`].
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> std::result::Result<AnyStrategy, StrategyError> + Send + Sync + 'static,
    {
        self.insert(name.into(), Entry::Factory(Arc::new(factory)))
    }

    fn insert(&mut self, name: String, entry: Entry) -> &mut Self {
        self.entries.insert(name, entry);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Resolve `name` to a strategy. Returns `Ok(None)` for unknown names.
    pub fn resolve(&self, name: &str) -> Result<Option<AnyStrategy>> {
        match self.entries.get(name) {
            None => Ok(None),
            Some(Entry::Instance(strategy)) => Ok(Some(strategy.clone())),
            Some(Entry::Factory(factory)) => {
                factory()
                    .map(Some)
                    .map_err(|source| Error::InvalidStrategy {
                        name: name.to_owned(),
                        source,
                    })
            }
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        StrategyRegistry::new()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("StrategyRegistry")
            .field("strategies", &names)
            .finish()
    }
}
