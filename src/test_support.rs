//! Test doubles shared by unit tests.
use std::{
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use crate::{
    cache::{Cache, InMemoryCache},
    clock::Clock,
    features::{FeatureDefinition, FeatureSet},
    fetcher::FeatureFetcher,
    Error, Result,
};

/// A clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualClock(AtomicI64);

impl ManualClock {
    pub(crate) fn new(now: i64) -> Self {
        ManualClock(AtomicI64::new(now))
    }

    pub(crate) fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fetcher returning a preset response and counting calls.
#[derive(Debug)]
pub(crate) struct StubFetcher {
    response: Mutex<Option<FeatureSet>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub(crate) fn returning(features: Vec<FeatureDefinition>) -> Self {
        StubFetcher {
            response: Mutex::new(Some(FeatureSet {
                features,
                expires: None,
            })),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        StubFetcher {
            response: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_features(&self, features: Vec<FeatureDefinition>) {
        *self.response.lock().unwrap() = Some(FeatureSet {
            features,
            expires: None,
        });
    }

    pub(crate) fn fail(&self) {
        *self.response.lock().unwrap() = None;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeatureFetcher for StubFetcher {
    fn fetch(&self) -> Result<FeatureSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.response.lock().unwrap() {
            Some(set) => Ok(set.clone()),
            None => Err(decode_error()),
        }
    }
}

/// Wraps an [`InMemoryCache`] and counts every access.
#[derive(Debug)]
pub(crate) struct CountingCache {
    inner: InMemoryCache,
    accesses: AtomicUsize,
}

impl CountingCache {
    pub(crate) fn new(inner: InMemoryCache) -> Self {
        CountingCache {
            inner,
            accesses: AtomicUsize::new(0),
        }
    }

    /// Number of `get`, `set` and `forever` calls so far.
    pub(crate) fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }
}

impl Cache for CountingCache {
    fn get(&self, key: &str) -> Option<String> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl);
    }

    fn forever(&self, key: &str, value: String) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        self.inner.forever(key, value);
    }
}

/// An acquisition failure, as produced by a malformed response body.
pub(crate) fn decode_error() -> Error {
    serde_json::from_str::<FeatureSet>("<html>").unwrap_err().into()
}
