use chrono::Utc;

/// Source of the current time, in unix seconds.
///
/// Expiry timestamps and freshness checks all go through a `Clock`, so the whole cache lifecycle
/// can be driven deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}
