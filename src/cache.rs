//! Durable cache abstraction and the TTL/failover bookkeeping built on top of it.
use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex, PoisonError, RwLock},
    time::Duration,
};

use crate::{
    clock::{Clock, SystemClock},
    features::FeatureSet,
    Result,
};

/// Key of the TTL-bound feature set entry.
pub const CACHE_KEY: &str = "unleash.cache";
/// Key of the non-expiring last-known-good feature set.
pub const FAILOVER_KEY: &str = "unleash.failover";

/// A durable key-value cache holding serialized feature sets.
///
/// Implement this to back the client with a shared store (Redis, a file, ...). Values are JSON
/// strings.
pub trait Cache: Send + Sync {
    /// Returns the stored value, or `None` if it's missing or expired.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` for `ttl`.
    fn set(&self, key: &str, value: String, ttl: Duration);
    /// Store `value` until it's overwritten.
    fn forever(&self, key: &str, value: String);
}

#[derive(Debug)]
struct Entry {
    value: String,
    /// Unix seconds after which the entry is gone. `None` never expires.
    deadline: Option<i64>,
}

/// Process-local [`Cache`].
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache measuring expiry on `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryCache {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn insert(&self, key: &str, value: String, deadline: Option<i64>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), Entry { value, deadline });
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        InMemoryCache::new()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        match entry.deadline {
            Some(deadline) if deadline <= now => None,
            _ => Some(entry.value.clone()),
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let deadline = self.clock.now().saturating_add(secs(ttl));
        self.insert(key, value, Some(deadline));
    }

    fn forever(&self, key: &str, value: String) {
        self.insert(key, value, None);
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryCache")
            .field("entries", &entries.len())
            .finish()
    }
}

pub(crate) fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Keeps the TTL entry and the failover entry in a [`Cache`] up to date.
pub(crate) struct CacheController {
    cache: Arc<dyn Cache>,
    ttl: Duration,
    /// The fill currently running, if any. Callers that miss while it runs wait for its outcome
    /// instead of fetching themselves.
    fill: Mutex<Option<Arc<Fill>>>,
}

enum FillState {
    Running,
    Done(Result<FeatureSet>),
    /// The leader unwound without producing a result.
    Abandoned,
}

struct Fill {
    state: Mutex<FillState>,
    done: Condvar,
}

impl Fill {
    fn new() -> Fill {
        Fill {
            state: Mutex::new(FillState::Running),
            done: Condvar::new(),
        }
    }

    /// Block until the fill completes. Returns `None` if it was abandoned.
    fn wait(&self) -> Option<Result<FeatureSet>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self
            .done
            .wait_while(state, |state| matches!(state, FillState::Running))
            .unwrap_or_else(PoisonError::into_inner);
        match &*state {
            FillState::Done(result) => Some(result.clone()),
            FillState::Running | FillState::Abandoned => None,
        }
    }

    fn complete(&self, outcome: FillState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
        self.done.notify_all();
    }
}

enum Role {
    Cached(FeatureSet),
    Follower(Arc<Fill>),
    Leader(Arc<Fill>),
}

/// Publishes the leader's outcome when dropped, including when `fetch` panics.
struct LeaderGuard<'a> {
    slot: &'a Mutex<Option<Arc<Fill>>>,
    fill: Arc<Fill>,
    result: Option<Result<FeatureSet>>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let outcome = match self.result.take() {
            Some(result) => FillState::Done(result),
            None => FillState::Abandoned,
        };
        self.fill.complete(outcome);
    }
}

impl CacheController {
    pub(crate) fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        CacheController {
            cache,
            ttl,
            fill: Mutex::new(None),
        }
    }

    pub(crate) fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expiry of a feature set fetched at `now`.
    pub(crate) fn expires_at(&self, now: i64) -> i64 {
        now.saturating_add(secs(self.ttl))
    }

    /// Read the TTL entry, falling back to `fetch` on a miss. `fetch` is expected to call
    /// [`CacheController::store`].
    ///
    /// Only one caller runs `fetch` at a time. Callers missing while it runs get the same result,
    /// successful or not.
    pub(crate) fn get_or_fetch(
        &self,
        fetch: impl FnOnce() -> Result<FeatureSet>,
    ) -> Result<FeatureSet> {
        if let Some(set) = self.read(CACHE_KEY) {
            log::debug!(target: "unleash", "using cached features");
            return Ok(set);
        }

        let fill = loop {
            match self.join_fill() {
                Role::Cached(set) => {
                    log::debug!(target: "unleash", "using features cached by a concurrent fetch");
                    return Ok(set);
                }
                Role::Follower(fill) => match fill.wait() {
                    Some(result) => {
                        log::debug!(target: "unleash", "using result of a concurrent fetch");
                        return result;
                    }
                    None => continue,
                },
                Role::Leader(fill) => break fill,
            }
        };

        let mut leader = LeaderGuard {
            slot: &self.fill,
            fill,
            result: None,
        };
        let result = fetch();
        leader.result = Some(result.clone());
        result
    }

    fn join_fill(&self) -> Role {
        let mut current = self.fill.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(fill) = &*current {
            return Role::Follower(Arc::clone(fill));
        }

        // A fill may have completed between our first read and taking the lock.
        if let Some(set) = self.read(CACHE_KEY) {
            return Role::Cached(set);
        }

        let fill = Arc::new(Fill::new());
        *current = Some(Arc::clone(&fill));
        Role::Leader(fill)
    }

    /// Write a freshly fetched set to both the TTL entry and the failover entry.
    pub(crate) fn store(&self, set: &FeatureSet) -> Result<()> {
        let value = serde_json::to_string(set)?;
        self.cache.set(CACHE_KEY, value.clone(), self.ttl);
        self.cache.forever(FAILOVER_KEY, value);
        Ok(())
    }

    /// Last-known-good feature set, or an empty set if there's none.
    pub(crate) fn failover(&self) -> FeatureSet {
        self.read(FAILOVER_KEY).unwrap_or_default()
    }

    fn read(&self, key: &str) -> Option<FeatureSet> {
        let value = self.cache.get(key)?;
        match serde_json::from_str(&value) {
            Ok(set) => Some(set),
            Err(err) => {
                log::warn!(target: "unleash", key; "ignoring undecodable cache entry: {:?}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Barrier,
        },
        time::{Duration, Instant},
    };

    use super::{Cache, CacheController, InMemoryCache, CACHE_KEY, FAILOVER_KEY};
    use crate::{
        features::{FeatureDefinition, FeatureSet, StrategyConfig},
        test_support::{decode_error, ManualClock},
        Error,
    };

    fn sample_set() -> FeatureSet {
        FeatureSet {
            features: vec![
                FeatureDefinition::new("a", true).with_strategy(
                    StrategyConfig::new("userWithId").with_parameter("userIds", "1,2"),
                ),
                FeatureDefinition::new("b", false),
            ],
            expires: Some(1_015),
        }
    }

    #[test]
    fn in_memory_entries_expire() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = InMemoryCache::with_clock(clock.clone());

        cache.set("k", "v".to_owned(), Duration::from_secs(15));
        cache.forever("f", "w".to_owned());

        clock.advance(14);
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        clock.advance(1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.get("f").as_deref(), Some("w"));
    }

    #[test]
    fn store_writes_ttl_and_failover_entries() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = Arc::new(InMemoryCache::with_clock(clock.clone()));
        let controller = CacheController::new(cache.clone(), Duration::from_secs(15));

        controller.store(&sample_set()).unwrap();

        assert!(cache.get(CACHE_KEY).is_some());
        assert!(cache.get(FAILOVER_KEY).is_some());

        clock.advance(60);
        assert!(cache.get(CACHE_KEY).is_none());
        assert_eq!(controller.failover(), sample_set());
    }

    #[test]
    fn cached_set_round_trips() {
        let cache = Arc::new(InMemoryCache::with_clock(Arc::new(ManualClock::new(1_000))));
        let controller = CacheController::new(cache, Duration::from_secs(15));
        controller.store(&sample_set()).unwrap();

        let read = controller
            .get_or_fetch(|| panic!("must not fetch on a cache hit"))
            .unwrap();

        assert_eq!(read.features, sample_set().features);
        assert_eq!(read.expires, Some(1_015));
    }

    #[test]
    fn failover_defaults_to_empty() {
        let controller = CacheController::new(Arc::new(InMemoryCache::new()), Duration::from_secs(15));
        assert_eq!(controller.failover(), FeatureSet::default());
    }

    #[test]
    fn undecodable_entry_is_a_miss() {
        let cache = Arc::new(InMemoryCache::new());
        cache.set(CACHE_KEY, "{not json".to_owned(), Duration::from_secs(15));
        cache.forever(FAILOVER_KEY, "42".to_owned());
        let controller = CacheController::new(cache, Duration::from_secs(15));

        let fetched = controller.get_or_fetch(|| Ok(sample_set())).unwrap();

        assert_eq!(fetched, sample_set());
        assert_eq!(controller.failover(), FeatureSet::default());
    }

    #[test]
    fn concurrent_misses_fetch_once() {
        const THREADS: usize = 8;

        let controller = Arc::new(CacheController::new(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(15),
        ));
        let fetches = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let controller = Arc::clone(&controller);
                let fetches = Arc::clone(&fetches);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    controller
                        .get_or_fetch(|| {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            let set = sample_set();
                            controller.store(&set)?;
                            Ok(set)
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), sample_set());
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_misses_share_a_failed_fetch() {
        const THREADS: usize = 4;
        const FETCH_TIME: Duration = Duration::from_millis(200);

        let controller = Arc::new(CacheController::new(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(15),
        ));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let controller = Arc::clone(&controller);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let started = Instant::now();
                    let result = controller.get_or_fetch(|| {
                        std::thread::sleep(FETCH_TIME);
                        Err(decode_error())
                    });
                    (result, started.elapsed())
                })
            })
            .collect();

        for handle in handles {
            let (result, waited) = handle.join().unwrap();
            assert!(matches!(result, Err(Error::Decode(_))));
            // Failing fetches must not queue up behind each other.
            assert!(waited < FETCH_TIME * 2, "waited {waited:?}");
        }
    }

    #[test]
    fn waiter_fetches_itself_when_leader_panics() {
        let controller = Arc::new(CacheController::new(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(15),
        ));

        let leader = {
            let controller = Arc::clone(&controller);
            std::thread::spawn(move || {
                controller.get_or_fetch(|| {
                    std::thread::sleep(Duration::from_millis(100));
                    panic!("fetch blew up");
                })
            })
        };
        std::thread::sleep(Duration::from_millis(20));

        let fetched = controller.get_or_fetch(|| Ok(sample_set())).unwrap();

        assert!(leader.join().is_err());
        assert_eq!(fetched, sample_set());
    }
}
