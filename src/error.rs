//! Heimdall error types

use crate::service::ServiceId;

/// Heimdall error types
#[derive(Debug, thiserror::Error)]
pub enum HeimdallError {
    /// Monthly call budget for a service is exhausted.
    ///
    /// Raised before any network attempt. `resets` is the first day of the
    /// next calendar month (`YYYY-MM-01`), when the counter starts fresh.
    #[error("monthly quota exhausted for {service}: {used}/{limit} calls used, resets {resets}")]
    QuotaExceeded {
        service: ServiceId,
        used: u64,
        limit: u64,
        resets: String,
    },

    // Fetch errors built by caller-supplied fetch closures. The governance
    // layer propagates these verbatim when no stale fallback exists.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// The limiter was reset while this request was still queued; the job
    /// was discarded before it ever ran.
    #[error("rate limiter closed while request was queued")]
    LimiterClosed,
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;
