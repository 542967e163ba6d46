//! Proactive cache refresh run after a request has been handled.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::store::FeatureStore;

/// Refreshes the feature cache before it expires, off the request path.
///
/// Call [`RefreshTrigger::request_finished`] once the response for a request has been delivered.
/// When `now + ttl * threshold_factor` is past the current expiry, a background thread fetches
/// fresh features so that no request has to wait for the fetch at expiry time. With the defaults
/// (15s TTL, factor 0.75) that is once more than 3.75s of the TTL window have elapsed.
///
/// The trigger holds a weak reference to the store: once the [`Client`](crate::Client) is gone,
/// it does nothing.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    store: Weak<FeatureStore>,
    threshold_factor: f64,
    /// Set while a refresh thread is running.
    in_flight: Arc<AtomicBool>,
}

impl RefreshTrigger {
    /// Default value for the threshold factor.
    pub const DEFAULT_THRESHOLD_FACTOR: f64 = 0.75;

    pub(crate) fn new(store: &Arc<FeatureStore>, threshold_factor: f64) -> Self {
        RefreshTrigger {
            store: Arc::downgrade(store),
            threshold_factor,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn threshold_factor(&self) -> f64 {
        self.threshold_factor
    }

    /// Returns `true` if the store is due for a proactive refresh.
    pub fn should_refresh(&self) -> bool {
        match self.store.upgrade() {
            Some(store) => self.is_due(&store),
            None => false,
        }
    }

    /// Hook to run after a request has been fully handled.
    ///
    /// Spawns a refresh thread if one is due and none is running yet. Errors are logged and never
    /// returned. The returned handle may be dropped to detach the thread.
    pub fn request_finished(&self) -> Option<JoinHandle<()>> {
        let store = self.store.upgrade()?;

        if !store.can_refresh() || !self.is_due(&store) {
            return None;
        }

        if self.in_flight.swap(true, Ordering::AcqRel) {
            log::debug!(target: "unleash", "proactive refresh already in flight");
            return None;
        }

        let in_flight = Arc::clone(&self.in_flight);
        let spawned = std::thread::Builder::new()
            .name("unleash-refresh".to_owned())
            .spawn(move || {
                log::debug!(target: "unleash", "refreshing features ahead of expiry");
                let result =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| store.refresh_cache()));
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        log::warn!(target: "unleash", "proactive refresh failed: {}", err);
                    }
                    Err(_) => {
                        log::warn!(target: "unleash", "proactive refresh panicked");
                    }
                }
                in_flight.store(false, Ordering::Release);
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::warn!(target: "unleash", "failed to spawn refresh thread: {:?}", err);
                self.in_flight.store(false, Ordering::Release);
                None
            }
        }
    }

    fn is_due(&self, store: &FeatureStore) -> bool {
        is_due(
            store.now(),
            store.cache_ttl(),
            store.expires(),
            self.threshold_factor,
        )
    }
}

/// `now + ttl * factor > expires`
fn is_due(now: i64, ttl: Duration, expires: i64, factor: f64) -> bool {
    now as f64 + ttl.as_secs_f64() * factor > expires as f64
}
