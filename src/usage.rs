//! Monthly call budgets, independent of burst rate limiting.
//!
//! The rolling-window limiter governs burst *rate*; [`UsageTracker`]
//! governs monthly *volume*. Counters are keyed per service per calendar
//! month (`api_usage_{service}_{YYYY-MM}`) in the durable store, so they
//! survive restarts and roll over to a fresh zero each month without any
//! explicit reset.
//!
//! [`UsageTracker::guarded_request`] is the enforcement point: it fails
//! fast when the month's budget is spent (no network attempt), warns when
//! usage crosses 80%, delegates to the service's rate limiter, and records
//! the call once it completes.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::warn;

use crate::cache::DiskStore;
use crate::clock::Clock;
use crate::limiter::RateLimiter;
use crate::service::{ServiceId, ServiceTable};
use crate::telemetry;
use crate::{HeimdallError, Result};

/// Usage fraction above which near-limit warnings fire.
const NEAR_LIMIT_PERCENT: f64 = 80.0;

/// A service's position against its monthly budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageReport {
    /// Calls recorded this calendar month.
    pub used: u64,
    /// Monthly budget. `None` = unbounded.
    pub limit: Option<u64>,
    /// `used / limit * 100`; zero when unbounded.
    pub percentage: f64,
}

/// Month key for a given instant: `"{year}-{month:02}"`.
pub fn month_key(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

/// First day of the month after `now`, as `YYYY-MM-01`.
fn next_reset(now: DateTime<Utc>) -> String {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    format!("{year:04}-{month:02}-01")
}

fn storage_key(service: ServiceId, month: &str) -> String {
    format!("api_usage_{}_{month}", service.as_str())
}

/// Per-service, per-calendar-month request counting with hard-cap
/// enforcement.
pub struct UsageTracker {
    table: Arc<ServiceTable>,
    store: DiskStore,
    clock: Arc<dyn Clock>,
}

impl UsageTracker {
    /// Create a tracker over the given durable store.
    pub fn new(table: Arc<ServiceTable>, store: DiskStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            table,
            store,
            clock,
        }
    }

    /// Record one completed request against the current month.
    pub fn record(&self, service: ServiceId) {
        let key = storage_key(service, &month_key(self.clock.now_utc()));
        let count = self.read_count(&key) + 1;
        self.store.insert(&key, count.to_string());
    }

    /// Current month's usage for a service.
    pub fn usage(&self, service: ServiceId) -> UsageReport {
        let key = storage_key(service, &month_key(self.clock.now_utc()));
        let used = self.read_count(&key);
        let limit = self.table.get(service).monthly_limit;
        let percentage = match limit {
            Some(limit) => used as f64 / limit as f64 * 100.0,
            None => 0.0,
        };
        UsageReport {
            used,
            limit,
            percentage,
        }
    }

    /// Whether usage has crossed 80% of the monthly budget.
    pub fn is_near_limit(&self, service: ServiceId) -> bool {
        self.usage(service).percentage > NEAR_LIMIT_PERCENT
    }

    /// Whether the monthly budget is spent. Always false when unbounded.
    pub fn has_exceeded(&self, service: ServiceId) -> bool {
        let report = self.usage(service);
        match report.limit {
            Some(limit) => report.used >= limit,
            None => false,
        }
    }

    /// Clear the current month's counter. Intended for tests and manual
    /// administration.
    pub fn reset(&self, service: ServiceId) {
        let key = storage_key(service, &month_key(self.clock.now_utc()));
        self.store.remove(&key);
    }

    /// Enforce the monthly cap around a rate-limited fetch.
    ///
    /// Fails fast with [`HeimdallError::QuotaExceeded`] before any network
    /// attempt when the budget is spent. Otherwise delegates to the
    /// service's [`RateLimiter`] and records usage after the call
    /// completes: on success always, on failure only when the service's
    /// `count_failed_calls` toggle is set. A job discarded before it ever
    /// ran ([`HeimdallError::LimiterClosed`]) never counts.
    pub async fn guarded_request<T, F, Fut>(
        &self,
        service: ServiceId,
        limiter: &RateLimiter,
        fetch: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let now = self.clock.now_utc();
        let report = self.usage(service);
        if let Some(limit) = report.limit {
            if report.used >= limit {
                metrics::counter!(
                    telemetry::QUOTA_REJECTED_TOTAL,
                    "service" => service.as_str(),
                )
                .increment(1);
                return Err(HeimdallError::QuotaExceeded {
                    service,
                    used: report.used,
                    limit,
                    resets: next_reset(now),
                });
            }
            if report.percentage > NEAR_LIMIT_PERCENT {
                warn!(
                    service = %service,
                    used = report.used,
                    limit,
                    percentage = format!("{:.1}", report.percentage),
                    "approaching monthly quota"
                );
            }
        }

        let result = limiter.execute(fetch).await;
        match &result {
            Ok(_) => self.record(service),
            // Never ran; nothing to bill.
            Err(HeimdallError::LimiterClosed) => {}
            Err(_) if self.table.get(service).count_failed_calls => self.record(service),
            Err(_) => {}
        }
        result
    }

    fn read_count(&self, key: &str) -> u64 {
        match self.store.get(key) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(count) => count,
                Err(_) => {
                    warn!(key, value = %raw, "corrupt usage counter, resetting to 0");
                    0
                }
            },
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_key_is_zero_padded() {
        let march = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(month_key(march), "2026-03");
    }

    #[test]
    fn next_reset_rolls_into_next_month() {
        let march = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(next_reset(march), "2026-04-01");
    }

    #[test]
    fn next_reset_rolls_over_december() {
        let december = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(next_reset(december), "2027-01-01");
    }

    #[test]
    fn storage_key_matches_contract() {
        assert_eq!(
            storage_key(ServiceId::CoinGecko, "2026-08"),
            "api_usage_coingecko_2026-08"
        );
    }
}
