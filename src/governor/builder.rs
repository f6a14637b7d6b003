//! Builder for configuring governor instances.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheConfig, DiskStore, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::limiter::LimiterRegistry;
use crate::service::{ServiceConfig, ServiceId, ServiceTable};
use crate::usage::UsageTracker;
use crate::Result;

use super::Governor;

/// Default interval for the background cache sweep.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Builder for configuring [`Governor`] instances.
///
/// ```rust,no_run
/// use heimdall::{Governor, ServiceConfig, ServiceId};
/// use std::time::Duration;
///
/// # fn example() -> heimdall::Result<()> {
/// let governor = Governor::builder()
///     .service_config(
///         ServiceId::CoinGecko,
///         ServiceConfig::new(10, Duration::from_secs(60)).monthly_limit(5_000),
///     )
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct GovernorBuilder {
    table: ServiceTable,
    overrides: Vec<(ServiceId, ServiceConfig)>,
    cache_dir: Option<PathBuf>,
    cache_config: CacheConfig,
    sweep_interval: Duration,
    clock: Option<Arc<dyn Clock>>,
}

impl GovernorBuilder {
    pub fn new() -> Self {
        Self {
            table: ServiceTable::rate_card(),
            overrides: Vec::new(),
            cache_dir: None,
            cache_config: CacheConfig::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            clock: None,
        }
    }

    /// Replace the entire rate card.
    pub fn service_table(mut self, table: ServiceTable) -> Self {
        self.table = table;
        self
    }

    /// Override one service's limits. Validated at
    /// [`build()`](Self::build).
    pub fn service_config(mut self, service: ServiceId, config: ServiceConfig) -> Self {
        self.overrides.push((service, config));
        self
    }

    /// Directory for the durable tier. Default:
    /// `{user cache dir}/heimdall`.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Response cache tuning (memory capacity, default TTL).
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Interval for [`Governor::start_sweeper`]. Default: 5 minutes.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Replace the wall clock. Intended for tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and assemble the governor.
    pub fn build(self) -> Result<Governor> {
        let mut table = self.table;
        for (service, config) in self.overrides {
            table = table.with_config(service, config)?;
        }
        let table = Arc::new(table);

        let cache_dir = self.cache_dir.unwrap_or_else(default_cache_dir);
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        let limiters = LimiterRegistry::new(&table);
        let cache = Arc::new(ResponseCache::new(
            &self.cache_config,
            DiskStore::open(cache_dir.join("responses.json")),
            Arc::clone(&clock),
        ));
        let usage = UsageTracker::new(
            Arc::clone(&table),
            DiskStore::open(cache_dir.join("usage.json")),
            clock,
        );

        Ok(Governor::from_parts(
            table,
            limiters,
            cache,
            usage,
            self.sweep_interval,
        ))
    }
}

impl Default for GovernorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default durable-tier directory: `{user cache dir}/heimdall`.
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("heimdall")
}
