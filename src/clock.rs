//! Clock abstraction for wall-clock reads.
//!
//! Cache stamps and monthly usage keys depend on wall-clock time, which
//! `tokio::time::pause()` cannot control. Routing those reads through a
//! [`Clock`] lets tests pin time with [`ManualClock`] while production
//! uses [`SystemClock`].
//!
//! Rate-limiter waits are the exception: they use `tokio::time` directly
//! and are driven in tests with `#[tokio::test(start_paused = true)]`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time as a UTC datetime.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current time as milliseconds since the Unix epoch.
    fn epoch_millis(&self) -> u64 {
        self.now_utc().timestamp_millis().max(0) as u64
    }
}

/// System clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Starts at the given epoch-millisecond instant and only moves when told
/// to. Cloning shares the underlying instant.
///
/// ```rust
/// # use heimdall::clock::{Clock, ManualClock};
/// # use std::time::Duration;
/// let clock = ManualClock::starting_at(1_700_000_000_000);
/// clock.advance(Duration::from_secs(30));
/// assert_eq!(clock.epoch_millis(), 1_700_000_030_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock pinned at the given epoch milliseconds.
    pub fn starting_at(epoch_millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(epoch_millis)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: std::time::Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Pin the clock to an absolute epoch-millisecond instant.
    pub fn set(&self, epoch_millis: u64) {
        self.millis.store(epoch_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let ms = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(ms as i64)
            .single()
            .expect("epoch millis in range")
    }

    fn epoch_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
