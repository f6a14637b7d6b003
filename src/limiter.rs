//! Per-service sliding-window rate limiting with FIFO queueing.
//!
//! Each service gets one [`RateLimiter`] that admits at most `capacity`
//! tasks within any trailing `window`. Excess tasks queue in FIFO order
//! and a single drain loop feeds them through as slots free up — the
//! limiter delays work, it never rejects it.
//!
//! # Drain loop
//!
//! [`RateLimiter::execute`] enqueues a type-erased job and spawns the
//! drain loop if one isn't already running (`draining` flag). The loop
//! waits for a free slot, pops the head job, records the admission
//! timestamp *before* invoking it, awaits it, and settles the caller's
//! oneshot. A failing task rejects only its own caller; the loop moves on.
//! Because a second `execute()` arriving mid-drain only enqueues, there is
//! never more than one drainer per limiter.
//!
//! Waits use `tokio::time`, so tests drive the loop with
//! `#[tokio::test(start_paused = true)]`.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::service::{ServiceConfig, ServiceId, ServiceTable};
use crate::telemetry;
use crate::{HeimdallError, Result};

/// Queued unit of work: runs the caller's task and settles its oneshot.
type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct LimiterState {
    /// Admission times within the current window, oldest first. Pruned of
    /// entries older than `window` before any capacity check.
    timestamps: VecDeque<Instant>,
    /// Tasks awaiting a slot. FIFO order is the fairness contract.
    queue: VecDeque<Job>,
    /// Guard against concurrent drain loops.
    draining: bool,
}

/// Read-only snapshot of a limiter's window and queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStatus {
    /// Admissions currently inside the rolling window.
    pub in_window: usize,
    /// Free slots remaining in the window.
    pub remaining: usize,
    /// Tasks queued for a slot.
    pub queued: usize,
    /// Time until the next slot frees up. Zero when admissible now.
    pub next_slot_in: Duration,
}

/// Admits at most `capacity` tasks per rolling `window` for one service.
pub struct RateLimiter {
    service: ServiceId,
    capacity: usize,
    window: Duration,
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimiter {
    /// Create a limiter from a service's rate-card row.
    pub fn new(service: ServiceId, config: &ServiceConfig) -> Self {
        Self {
            service,
            capacity: config.capacity as usize,
            window: config.window,
            state: Arc::new(Mutex::new(LimiterState {
                timestamps: VecDeque::new(),
                queue: VecDeque::new(),
                draining: false,
            })),
        }
    }

    /// Whether a task would be admitted right now.
    ///
    /// Prunes expired admissions; no other side effect.
    pub fn can_admit(&self) -> bool {
        let mut state = self.state.lock().expect("limiter state poisoned");
        prune(&mut state.timestamps, self.window);
        state.timestamps.len() < self.capacity
    }

    /// Time until the window frees a slot. Zero when admissible now.
    ///
    /// Advisory only: admission is always re-checked after any wait, since
    /// the window may have changed in the meantime.
    pub fn time_until_next_slot(&self) -> Duration {
        let mut state = self.state.lock().expect("limiter state poisoned");
        prune(&mut state.timestamps, self.window);
        next_slot_in(&state.timestamps, self.capacity, self.window)
    }

    /// Run `task` as soon as the window and queue allow.
    ///
    /// Tasks run in enqueue order. The returned future settles with the
    /// task's own result — rate limiting only ever delays, the sole
    /// limiter-originated failure is [`HeimdallError::LimiterClosed`] when
    /// [`reset()`](Self::reset) discards a still-queued job.
    pub async fn execute<T, F, Fut>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T>>();
        let service = self.service;
        let enqueued_at = Instant::now();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                metrics::histogram!(
                    telemetry::RATE_LIMIT_WAIT_SECONDS,
                    "service" => service.as_str(),
                )
                .record(enqueued_at.elapsed().as_secs_f64());
                let result = task().await;
                // Send fails only if the caller stopped waiting; the task
                // already ran and was accounted for either way.
                let _ = tx.send(result);
            })
        });

        let spawn_drainer = {
            let mut state = self.state.lock().expect("limiter state poisoned");
            state.queue.push_back(job);
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };
        if spawn_drainer {
            tokio::spawn(drain(
                Arc::clone(&self.state),
                self.capacity,
                self.window,
                self.service,
            ));
        }

        rx.await.map_err(|_| HeimdallError::LimiterClosed)?
    }

    /// Snapshot of window occupancy and queue depth.
    pub fn status(&self) -> LimiterStatus {
        let mut state = self.state.lock().expect("limiter state poisoned");
        prune(&mut state.timestamps, self.window);
        LimiterStatus {
            in_window: state.timestamps.len(),
            remaining: self.capacity.saturating_sub(state.timestamps.len()),
            queued: state.queue.len(),
            next_slot_in: next_slot_in(&state.timestamps, self.capacity, self.window),
        }
    }

    /// Clear the window and discard queued jobs.
    ///
    /// Discarded jobs settle their callers with
    /// [`HeimdallError::LimiterClosed`]. Tasks already invoked are
    /// unaffected. Intended for tests.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("limiter state poisoned");
        state.timestamps.clear();
        state.queue.clear();
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if oldest.elapsed() >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

fn next_slot_in(timestamps: &VecDeque<Instant>, capacity: usize, window: Duration) -> Duration {
    if timestamps.len() < capacity {
        return Duration::ZERO;
    }
    match timestamps.front() {
        Some(oldest) => window.saturating_sub(oldest.elapsed()),
        None => Duration::ZERO,
    }
}

/// Single drain loop for one limiter. Exits when the queue empties.
async fn drain(
    state: Arc<Mutex<LimiterState>>,
    capacity: usize,
    window: Duration,
    service: ServiceId,
) {
    loop {
        // Wait for a free slot, re-checking after every sleep: the window
        // contents may have changed while we slept.
        loop {
            let wait = {
                let mut s = state.lock().expect("limiter state poisoned");
                prune(&mut s.timestamps, window);
                next_slot_in(&s.timestamps, capacity, window)
            };
            if wait.is_zero() {
                break;
            }
            debug!(
                service = %service,
                wait_ms = wait.as_millis() as u64,
                "window full, waiting for next slot"
            );
            tokio::time::sleep(wait).await;
        }

        // The admission stamp goes in before the task runs, so a
        // long-running task cannot let later jobs over-admit within the
        // same window.
        let job = {
            let mut s = state.lock().expect("limiter state poisoned");
            match s.queue.pop_front() {
                Some(job) => {
                    s.timestamps.push_back(Instant::now());
                    Some(job)
                }
                None => {
                    s.draining = false;
                    None
                }
            }
        };
        match job {
            Some(job) => job().await,
            None => return,
        }
    }
}

/// Explicit registry of per-service limiters.
///
/// Built eagerly from a [`ServiceTable`] at startup — every known service
/// gets its limiter up front, and the registry is passed by reference to
/// call sites rather than living as hidden module-level state.
pub struct LimiterRegistry {
    limiters: HashMap<ServiceId, Arc<RateLimiter>>,
}

impl LimiterRegistry {
    /// Create one limiter per service from the rate card.
    pub fn new(table: &ServiceTable) -> Self {
        let limiters = ServiceId::ALL
            .into_iter()
            .map(|id| (id, Arc::new(RateLimiter::new(id, table.get(id)))))
            .collect();
        Self { limiters }
    }

    /// The limiter for a service. Every known service has one.
    pub fn get(&self, service: ServiceId) -> &Arc<RateLimiter> {
        self.limiters
            .get(&service)
            .expect("registry covers every ServiceId")
    }

    /// Reset every limiter. Intended for tests.
    pub fn reset_all(&self) {
        for limiter in self.limiters.values() {
            limiter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(
            ServiceId::CoinGecko,
            &ServiceConfig::new(capacity, window),
        )
    }

    #[test]
    fn fresh_limiter_admits() {
        let limiter = limiter(2, Duration::from_secs(1));
        assert!(limiter.can_admit());
        assert_eq!(limiter.time_until_next_slot(), Duration::ZERO);
    }

    #[test]
    fn fresh_status_is_empty() {
        let limiter = limiter(3, Duration::from_secs(1));
        let status = limiter.status();
        assert_eq!(status.in_window, 0);
        assert_eq!(status.remaining, 3);
        assert_eq!(status.queued, 0);
        assert_eq!(status.next_slot_in, Duration::ZERO);
    }

    #[test]
    fn registry_covers_all_services() {
        let registry = LimiterRegistry::new(&ServiceTable::rate_card());
        for service in ServiceId::ALL {
            assert!(registry.get(service).can_admit());
        }
    }
}
