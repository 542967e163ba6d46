use std::sync::Arc;

use serde_json::Value;

use crate::{
    features::FeatureDefinition,
    fetcher::{FeatureFetcher, HttpFetcher},
    refresh::RefreshTrigger,
    store::FeatureStore,
    strategy::StrategyRegistry,
    ClientConfig, Context, Result,
};

/// A client for the Unleash API.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```
/// # use unleash::{Client, ClientConfig, Context};
/// let client = ClientConfig::new("http://localhost:4242/api/client/features")
///     .enabled(false)
///     .to_client()
///     .unwrap();
///
/// assert!(client.is_feature_disabled("new-checkout", &Context::new(), &[]).unwrap());
/// ```
#[derive(Debug)]
pub struct Client {
    store: Arc<FeatureStore>,
    strategies: StrategyRegistry,
    refresh_trigger: RefreshTrigger,
}

impl Client {
    /// Create a new `Client` fetching features over HTTP.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP fetcher cannot be built from `config`, see [`HttpFetcher::new`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Client::with_fetcher(config, fetcher))
    }

    /// Create a new `Client` that gets feature definitions from `fetcher`.
    pub fn with_fetcher(config: ClientConfig, fetcher: impl FeatureFetcher + 'static) -> Self {
        let store = Arc::new(FeatureStore::new(&config, Box::new(fetcher)));
        let refresh_trigger = RefreshTrigger::new(&store, config.refresh_threshold);

        Client {
            store,
            strategies: config.strategies,
            refresh_trigger,
        }
    }

    /// Check whether feature `name` is enabled for `context`.
    ///
    /// `args` are handed to [`DynamicStrategy`](crate::DynamicStrategy) implementations. Features
    /// that don't exist are reported as disabled.
    ///
    /// # Errors
    ///
    /// - Acquisition errors when failover is disabled, see [`FeatureStore::get_features`].
    /// - [`Error::InvalidStrategy`](crate::Error::InvalidStrategy) when a strategy factory fails.
    pub fn is_feature_enabled(&self, name: &str, context: &Context, args: &[Value]) -> Result<bool> {
        let Some(feature) = self.store.get_feature(name)? else {
            log::trace!(target: "unleash", feature = name; "feature not found");
            return Ok(false);
        };

        let enabled = feature
            .eval(&self.strategies, context, args)
            .inspect_err(|err| {
                log::warn!(target: "unleash",
                    feature = name,
                    context:serde = context;
                    "error occurred while evaluating a feature: {:?}", err,
                );
            })?;

        log::trace!(target: "unleash",
                    feature = name,
                    context:serde = context,
                    enabled;
                    "evaluated a feature");

        Ok(enabled)
    }

    /// Negation of [`Client::is_feature_enabled`].
    pub fn is_feature_disabled(&self, name: &str, context: &Context, args: &[Value]) -> Result<bool> {
        self.is_feature_enabled(name, context, args)
            .map(|enabled| !enabled)
    }

    pub fn get_feature(&self, name: &str) -> Result<Option<FeatureDefinition>> {
        self.store.get_feature(name)
    }

    pub fn get_features(&self) -> Result<Arc<[FeatureDefinition]>> {
        self.store.get_features()
    }

    /// Force a fetch from the server. See [`FeatureStore::refresh_cache`].
    pub fn refresh_cache(&self) -> Result<()> {
        self.store.refresh_cache()
    }

    pub fn store(&self) -> &Arc<FeatureStore> {
        &self.store
    }

    /// Get the post-request refresh hook for this client. Clones are cheap and share state.
    pub fn refresh_trigger(&self) -> RefreshTrigger {
        self.refresh_trigger.clone()
    }
}
