use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Deserializer};

use crate::{
    cache::{Cache, InMemoryCache},
    clock::{Clock, SystemClock},
    fetcher::HttpFetcher,
    refresh::RefreshTrigger,
    strategy::StrategyRegistry,
    Client, Result,
};

/// Caching behavior of the feature store.
///
/// Derives `Deserialize` so it can be embedded in the host application's configuration files.
/// `ttl` is given in whole seconds.
///
/// ```
/// # use unleash::CacheConfig;
/// let cache: CacheConfig = serde_json::from_str(r#"{ "ttl": 30, "failover": false }"#).unwrap();
/// assert!(cache.enabled);
/// assert_eq!(cache.ttl.as_secs(), 30);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Read through the durable cache before fetching. Defaults to `true`.
    pub enabled: bool,
    /// How long a fetched feature set stays fresh. Defaults to
    /// [`CacheConfig::DEFAULT_TTL`].
    #[serde(deserialize_with = "seconds")]
    pub ttl: Duration,
    /// Fall back to the last successfully fetched set when fetching fails. Defaults to `true`.
    pub failover: bool,
}

impl CacheConfig {
    /// Default value for [`CacheConfig::ttl`].
    pub const DEFAULT_TTL: Duration = Duration::from_secs(15);
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            ttl: CacheConfig::DEFAULT_TTL,
            failover: true,
        }
    }
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Configuration for [`Client`].
pub struct ClientConfig {
    pub(crate) enabled: bool,
    pub(crate) features_endpoint: String,
    pub(crate) api_key: Option<String>,
    pub(crate) app_name: Option<String>,
    pub(crate) instance_id: Option<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) cache: CacheConfig,
    pub(crate) cache_store: Option<Arc<dyn Cache>>,
    pub(crate) strategies: StrategyRegistry,
    pub(crate) refresh_threshold: f64,
    pub(crate) clock: Arc<dyn Clock>,
}

impl ClientConfig {
    /// Create a default configuration fetching features from `features_endpoint`.
    ///
    /// ```
    /// # use unleash::ClientConfig;
    /// ClientConfig::new("https://unleash.example.com/api/client/features");
    /// ```
    pub fn new(features_endpoint: impl Into<String>) -> Self {
        ClientConfig {
            enabled: true,
            features_endpoint: features_endpoint.into(),
            api_key: None,
            app_name: None,
            instance_id: None,
            request_timeout: HttpFetcher::DEFAULT_TIMEOUT,
            cache: CacheConfig::default(),
            cache_store: None,
            strategies: StrategyRegistry::new(),
            refresh_threshold: RefreshTrigger::DEFAULT_THRESHOLD_FACTOR,
            clock: Arc::new(SystemClock),
        }
    }

    /// Global switch. A disabled client reports every feature as off and never touches the
    /// network or the cache.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// API token sent in the `Authorization` header.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sent as `UNLEASH-APPNAME`.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Sent as `UNLEASH-INSTANCEID`.
    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    /// Use `store` as the durable cache instead of the default [`InMemoryCache`].
    pub fn cache_store(mut self, store: Arc<dyn Cache>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    /// Fraction of the TTL after which a finished request triggers a proactive refresh. See
    /// [`RefreshTrigger`].
    ///
    /// Must be in `0.0..1.0`. Other values are ignored with a warning and the previous value is
    /// kept.
    pub fn refresh_threshold(mut self, factor: f64) -> Self {
        if (0.0..1.0).contains(&factor) {
            self.refresh_threshold = factor;
        } else {
            log::warn!(
                target: "unleash", factor;
                "ignoring refresh threshold outside of 0.0..1.0"
            );
        }
        self
    }

    /// Override the time source used for expiry. The default [`InMemoryCache`] shares it.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn cache_store_or_default(&self) -> Arc<dyn Cache> {
        match &self.cache_store {
            Some(store) => Arc::clone(store),
            None => Arc::new(InMemoryCache::with_clock(Arc::clone(&self.clock))),
        }
    }

    /// Create a new [`Client`] using this configuration.
    ///
    /// ```
    /// # use unleash::{ClientConfig, Client};
    /// let client: Client = ClientConfig::new("http://localhost:4242/api/client/features")
    ///     .to_client()
    ///     .unwrap();
    /// ```
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("enabled", &self.enabled)
            .field("features_endpoint", &self.features_endpoint)
            .field("app_name", &self.app_name)
            .field("instance_id", &self.instance_id)
            .field("request_timeout", &self.request_timeout)
            .field("cache", &self.cache)
            .field("strategies", &self.strategies)
            .field("refresh_threshold", &self.refresh_threshold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CacheConfig, ClientConfig};

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://localhost/features");

        assert!(config.enabled);
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.cache.ttl, Duration::from_secs(15));
        assert!(config.cache.failover);
        assert_eq!(config.refresh_threshold, 0.75);
        assert!(config.strategies.contains("default"));
    }

    #[test]
    fn cache_config_from_json() {
        let cache: CacheConfig =
            serde_json::from_str(r#"{ "enabled": false, "ttl": 60 }"#).unwrap();

        assert_eq!(
            cache,
            CacheConfig {
                enabled: false,
                ttl: Duration::from_secs(60),
                failover: true,
            }
        );
    }

    #[test]
    fn refresh_threshold_out_of_range_is_ignored() {
        let config = ClientConfig::new("http://localhost/features").refresh_threshold(0.5);
        assert_eq!(config.refresh_threshold, 0.5);

        for factor in [f64::NAN, -0.25, 1.0, 3.0, f64::INFINITY] {
            let config = ClientConfig::new("http://localhost/features").refresh_threshold(factor);
            assert_eq!(config.refresh_threshold, 0.75, "factor {factor}");
        }
    }

    #[test]
    fn debug_hides_api_key() {
        let config = ClientConfig::new("http://localhost/features").api_key("secret-token");
        assert!(!format!("{config:?}").contains("secret-token"));
    }
}
