//! Heimdall - Request governance for third-party market-data APIs
//!
//! This crate guards the free-tier quotas of external data providers
//! (price, gas, TVL, DEX data) behind one composable layer: a per-service
//! sliding-window rate limiter, a two-tier response cache with
//! stale-on-error fallback, and monthly usage tracking with hard-cap
//! enforcement. It performs no I/O of its own — callers supply the fetch
//! closure, heimdall decides whether and when it runs.
//!
//! # Example
//!
//! ```rust,no_run
//! use heimdall::{FetchOptions, Governor, ServiceId};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let governor = Governor::builder().build()?;
//!
//!     let gas = governor
//!         .fetch(
//!             ServiceId::Basescan,
//!             "gas_price",
//!             &[("module", "proxy"), ("action", "eth_gasPrice")],
//!             &FetchOptions::new().ttl(Duration::from_secs(15)),
//!             || async {
//!                 // the actual HTTP call lives with the caller
//!                 Ok(serde_json::json!({"result": "0x2faf080"}))
//!             },
//!         )
//!         .await?;
//!
//!     if gas.stale {
//!         eprintln!("provider unreachable, showing last known gas price");
//!     }
//!     println!("{}", gas.data);
//!     Ok(())
//! }
//! ```
//!
//! # Pieces
//!
//! The three components compose through [`Governor`] but are usable on
//! their own:
//!
//! - [`RateLimiter`] / [`LimiterRegistry`] — at most N admissions per
//!   rolling window, FIFO queueing, single drain loop per service.
//! - [`ResponseCache`] — memory + disk tiers, deterministic keys, serves
//!   stale data when a live fetch fails.
//! - [`UsageTracker`] — calendar-month call counting against the rate
//!   card's monthly budgets.

pub mod cache;
pub mod clock;
pub mod error;
pub mod governor;
pub mod limiter;
pub mod service;
pub mod telemetry;
pub mod usage;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheEntry, FetchOptions, Fetched, ResponseCache, TierPolicy};
pub use error::{HeimdallError, Result};
pub use governor::{Governor, GovernorBuilder};
pub use limiter::{LimiterRegistry, LimiterStatus, RateLimiter};
pub use service::{ServiceConfig, ServiceId, ServiceTable};
pub use usage::{UsageReport, UsageTracker};
