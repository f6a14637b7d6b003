//! Telemetry metric name constants.
//!
//! Centralised metric names for heimdall operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `service` — provider name (e.g. "coingecko", "basescan")
//! - `status` — outcome: "ok" or "error"
//! - `tier` — cache tier that satisfied a read: "memory" or "disk"

/// Total requests dispatched through the governor.
///
/// Labels: `service`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "heimdall_requests_total";

/// Request duration in seconds, cache hits included.
///
/// Labels: `service`.
pub const REQUEST_DURATION_SECONDS: &str = "heimdall_request_duration_seconds";

/// Total fresh cache hits.
///
/// Labels: `service`, `tier` ("memory" | "disk").
pub const CACHE_HITS_TOTAL: &str = "heimdall_cache_hits_total";

/// Total cache misses (fresh entry absent from both tiers).
///
/// Labels: `service`.
pub const CACHE_MISSES_TOTAL: &str = "heimdall_cache_misses_total";

/// Total expired entries served because a live fetch failed.
///
/// Labels: `service`.
pub const STALE_SERVED_TOTAL: &str = "heimdall_stale_served_total";

/// Total requests rejected by the monthly hard cap.
///
/// Labels: `service`.
pub const QUOTA_REJECTED_TOTAL: &str = "heimdall_quota_rejected_total";

/// Time a task spent queued for a rate-limiter slot, in seconds.
///
/// Labels: `service`.
pub const RATE_LIMIT_WAIT_SECONDS: &str = "heimdall_rate_limit_wait_seconds";
