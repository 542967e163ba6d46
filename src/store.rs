//! Thread-safe holder of the active feature set. [`FeatureStore`] decides whether the in-memory
//! snapshot is still fresh and, if not, acquires a new one from the durable cache, the server or
//! the failover entry.
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use crate::{
    cache::CacheController,
    clock::Clock,
    config::CacheConfig,
    features::{FeatureDefinition, FeatureSet},
    fetcher::FeatureFetcher,
    ClientConfig, Result,
};

#[derive(Debug, Default)]
struct Snapshot {
    /// `None` until a feature set has been acquired.
    features: Option<Arc<[FeatureDefinition]>>,
    expires: Option<i64>,
}

impl Snapshot {
    fn fresh_features(&self, now: i64) -> Option<&Arc<[FeatureDefinition]>> {
        match (&self.features, self.expires) {
            (Some(features), Some(expires)) if expires > now => Some(features),
            _ => None,
        }
    }
}

/// Holds the current feature definitions and their expiry.
///
/// The feature list is always replaced as a whole, so readers get a consistent snapshot that is
/// not affected by later refreshes.
pub struct FeatureStore {
    enabled: bool,
    cache_config: CacheConfig,
    fetcher: Box<dyn FeatureFetcher>,
    cache: CacheController,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Snapshot>,
}

impl FeatureStore {
    pub(crate) fn new(config: &ClientConfig, fetcher: Box<dyn FeatureFetcher>) -> FeatureStore {
        FeatureStore {
            enabled: config.enabled,
            cache_config: config.cache.clone(),
            fetcher,
            cache: CacheController::new(config.cache_store_or_default(), config.cache.ttl),
            clock: Arc::clone(&config.clock),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Get all feature definitions.
    ///
    /// Returns the in-memory snapshot while it's fresh. Otherwise reads through the cache (or
    /// fetches directly when caching is disabled). A disabled client always gets an empty list.
    ///
    /// # Errors
    ///
    /// Acquisition failures are returned only when failover is disabled.
    pub fn get_features(&self) -> Result<Arc<[FeatureDefinition]>> {
        let now = self.clock.now();

        if let Some(features) = self.read_snapshot().fresh_features(now) {
            return Ok(Arc::clone(features));
        }

        if !self.enabled {
            return Ok(Arc::from(Vec::new()));
        }

        let data = match self.acquire() {
            Ok(data) => data,
            Err(err) if self.cache_config.failover && err.is_acquisition_failure() => {
                log::warn!(target: "unleash", "using failover features after error: {}", err);
                self.cache.failover()
            }
            Err(err) => return Err(err),
        };

        let expires = match data.expires {
            Some(expires) => expires,
            None => self.expires(),
        };
        let features: Arc<[FeatureDefinition]> = Arc::from(data.features);
        self.replace(Arc::clone(&features), expires);

        Ok(features)
    }

    /// Get the first feature definition named `name`.
    pub fn get_feature(&self, name: &str) -> Result<Option<FeatureDefinition>> {
        let features = self.get_features()?;
        Ok(features.iter().find(|feature| feature.name == name).cloned())
    }

    /// Fetch features from the server, bypassing the freshness check, and update the cache, the
    /// failover entry and the snapshot. Does nothing unless both the client and caching are
    /// enabled.
    pub fn refresh_cache(&self) -> Result<()> {
        if self.can_refresh() {
            self.fetch_features()?;
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Expiry of the current snapshot in unix seconds.
    ///
    /// If nothing has set an expiry yet, one TTL from now is computed and remembered.
    pub fn expires(&self) -> i64 {
        if let Some(expires) = self.read_snapshot().expires {
            return expires;
        }

        let expires = self.cache.expires_at(self.clock.now());
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *snapshot.expires.get_or_insert(expires)
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now()
    }

    pub(crate) fn can_refresh(&self) -> bool {
        self.enabled && self.cache_config.enabled
    }

    fn acquire(&self) -> Result<FeatureSet> {
        if self.cache_config.enabled {
            self.cache.get_or_fetch(|| self.fetch_features())
        } else {
            self.fetch_features()
        }
    }

    fn fetch_features(&self) -> Result<FeatureSet> {
        let mut data = self.fetcher.fetch()?;

        let expires = self.cache.expires_at(self.clock.now());
        data.expires = Some(expires);

        self.cache.store(&data)?;
        self.replace(Arc::from(data.features.clone()), expires);

        Ok(data)
    }

    fn replace(&self, features: Arc<[FeatureDefinition]>, expires: i64) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *snapshot = Snapshot {
            features: Some(features),
            expires: Some(expires),
        };
    }

    fn read_snapshot(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FeatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStore")
            .field("enabled", &self.enabled)
            .field("cache_config", &self.cache_config)
            .field("snapshot", &*self.read_snapshot())
            .finish_non_exhaustive()
    }
}
