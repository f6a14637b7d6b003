//! Composition root: cache → quota → rate limit → fetch.
//!
//! [`Governor`] owns the rate card, the per-service limiter registry, the
//! two-tier response cache, and the monthly usage tracker, and wires them
//! into one pipeline per request:
//!
//! ```text
//! cache lookup ── fresh hit ──────────────────────────► done (no quota)
//!      │ miss
//!      ▼
//! monthly-cap check ── exhausted ──► QuotaExceeded (no network attempt)
//!      │ ok
//!      ▼
//! rate-limiter slot (FIFO wait) ──► caller's fetch closure
//!      │ success                         │ failure
//!      ▼                                 ▼
//! cache store + usage record        stale fallback, else propagate
//! ```
//!
//! The cap check lives inside the cache-miss path, so an over-quota
//! service with a stale entry still serves stale data; `QuotaExceeded`
//! surfaces only when there is nothing cached at all.

mod builder;

pub use builder::GovernorBuilder;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::{FetchOptions, Fetched, ResponseCache, derive_key};
use crate::limiter::{LimiterRegistry, LimiterStatus};
use crate::service::{ServiceId, ServiceTable};
use crate::telemetry;
use crate::usage::{UsageReport, UsageTracker};
use crate::Result;

/// Request governance for the configured services.
///
/// ```rust,no_run
/// use heimdall::{FetchOptions, Governor, ServiceId};
/// use std::time::Duration;
///
/// # async fn example() -> heimdall::Result<()> {
/// let governor = Governor::builder().build()?;
///
/// let price = governor
///     .fetch(
///         ServiceId::CoinGecko,
///         "simple_price",
///         &[("ids", "ethereum"), ("vs_currencies", "usd")],
///         &FetchOptions::new().ttl(Duration::from_secs(30)),
///         || async {
///             // perform the actual HTTP request here
///             Ok(serde_json::json!({"ethereum": {"usd": 3000.0}}))
///         },
///     )
///     .await?;
///
/// if price.stale {
///     // last known value, the live fetch failed
/// }
/// # Ok(())
/// # }
/// ```
pub struct Governor {
    table: Arc<ServiceTable>,
    limiters: LimiterRegistry,
    cache: Arc<ResponseCache>,
    usage: UsageTracker,
    sweep_interval: Duration,
}

impl Governor {
    /// Create a new builder for configuring a governor.
    pub fn builder() -> GovernorBuilder {
        GovernorBuilder::new()
    }

    pub(crate) fn from_parts(
        table: Arc<ServiceTable>,
        limiters: LimiterRegistry,
        cache: Arc<ResponseCache>,
        usage: UsageTracker,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            table,
            limiters,
            cache,
            usage,
            sweep_interval,
        }
    }

    /// Run one governed request: cache, monthly cap, rate limit, fetch.
    ///
    /// `fetch_fn` performs the actual provider call; it runs at most once,
    /// only after a cache miss and only when the monthly budget allows.
    pub async fn fetch<T, F, Fut>(
        &self,
        service: ServiceId,
        endpoint: &str,
        params: &[(&str, &str)],
        options: &FetchOptions,
        fetch_fn: F,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let started = std::time::Instant::now();
        let limiter = Arc::clone(self.limiters.get(service));
        let result = self
            .cache
            .fetch_with_cache(service, endpoint, params, options, || async move {
                self.usage
                    .guarded_request(service, &limiter, fetch_fn)
                    .await
            })
            .await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            telemetry::REQUESTS_TOTAL,
            "service" => service.as_str(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(
            telemetry::REQUEST_DURATION_SECONDS,
            "service" => service.as_str(),
        )
        .record(started.elapsed().as_secs_f64());

        result
    }

    /// Current month's usage for a service.
    pub fn usage(&self, service: ServiceId) -> UsageReport {
        self.usage.usage(service)
    }

    /// Whether a service has crossed 80% of its monthly budget.
    pub fn is_near_limit(&self, service: ServiceId) -> bool {
        self.usage.is_near_limit(service)
    }

    /// Whether a service's monthly budget is spent.
    pub fn has_exceeded_limit(&self, service: ServiceId) -> bool {
        self.usage.has_exceeded(service)
    }

    /// Record one request against a service's monthly budget, outside the
    /// [`fetch()`](Self::fetch) pipeline.
    pub fn record_usage(&self, service: ServiceId) {
        self.usage.record(service);
    }

    /// Window occupancy and queue depth for a service's limiter.
    pub fn limiter_status(&self, service: ServiceId) -> LimiterStatus {
        self.limiters.get(service).status()
    }

    /// Drop the cached entry for one logical request from both tiers.
    pub fn invalidate(&self, service: ServiceId, endpoint: &str, params: &[(&str, &str)]) {
        self.cache.invalidate(&derive_key(service, endpoint, params));
    }

    /// Purge expired cache entries from both tiers once.
    pub fn sweep(&self) {
        self.cache.sweep();
    }

    /// Run the cache sweep on the configured interval in a background
    /// task. Abort the returned handle to stop sweeping.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.cache.spawn_sweeper(self.sweep_interval)
    }

    /// The rate card this governor was built with.
    pub fn table(&self) -> &ServiceTable {
        &self.table
    }

    /// Clear limiter windows, queues, and the current month's usage for
    /// every service. Intended for tests.
    pub fn reset(&self) {
        self.limiters.reset_all();
        for service in ServiceId::ALL {
            self.usage.reset(service);
        }
    }
}
