//! Typed per-service configuration (the rate card).
//!
//! Every external data provider gets one [`ServiceConfig`] row: burst
//! capacity over a rolling window, an optional monthly call budget, and
//! whether failed calls bill against that budget. The set of known
//! services is closed ([`ServiceId`]) so unknown-service mistakes surface
//! at startup, not per call.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{HeimdallError, Result};

/// One external market-data provider.
///
/// Each service has fully independent rate-limiter, cache, and usage
/// state; nothing is shared across services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceId {
    /// Token prices, market charts, trending lists.
    CoinGecko,
    /// Protocol TVL.
    DefiLlama,
    /// Base chain explorer (gas, transactions).
    Basescan,
    /// DEX pair data.
    DexScreener,
    /// On-chain DEX pools and OHLCV.
    GeckoTerminal,
}

impl ServiceId {
    /// All known services, in rate-card order.
    pub const ALL: [ServiceId; 5] = [
        ServiceId::CoinGecko,
        ServiceId::DefiLlama,
        ServiceId::Basescan,
        ServiceId::DexScreener,
        ServiceId::GeckoTerminal,
    ];

    /// Stable lowercase name, used in cache keys, storage keys, metric
    /// labels, and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::CoinGecko => "coingecko",
            ServiceId::DefiLlama => "defillama",
            ServiceId::Basescan => "basescan",
            ServiceId::DexScreener => "dexscreener",
            ServiceId::GeckoTerminal => "geckoterminal",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = HeimdallError;

    fn from_str(s: &str) -> Result<Self> {
        ServiceId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| HeimdallError::UnknownService(s.to_string()))
    }
}

/// Rate and quota limits for one service.
///
/// ```rust
/// # use heimdall::ServiceConfig;
/// # use std::time::Duration;
/// let config = ServiceConfig::new(30, Duration::from_secs(60))
///     .monthly_limit(10_000)
///     .count_failed_calls(true);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum requests admitted per rolling window.
    pub capacity: u32,
    /// Rolling window length.
    pub window: Duration,
    /// Monthly call budget. `None` = unbounded.
    pub monthly_limit: Option<u64>,
    /// Whether a failed fetch still consumes monthly quota. Some providers
    /// bill attempted calls regardless of outcome. Default: false.
    pub count_failed_calls: bool,
}

impl ServiceConfig {
    /// Create a config with the given burst limit and no monthly budget.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            monthly_limit: None,
            count_failed_calls: false,
        }
    }

    /// Set the monthly call budget.
    pub fn monthly_limit(mut self, limit: u64) -> Self {
        self.monthly_limit = Some(limit);
        self
    }

    /// Set whether failed fetches consume monthly quota.
    pub fn count_failed_calls(mut self, enabled: bool) -> Self {
        self.count_failed_calls = enabled;
        self
    }

    fn validate(&self, service: ServiceId) -> Result<()> {
        if self.capacity == 0 {
            return Err(HeimdallError::Configuration(format!(
                "{service}: capacity must be at least 1"
            )));
        }
        if self.window.is_zero() {
            return Err(HeimdallError::Configuration(format!(
                "{service}: window must be non-zero"
            )));
        }
        if self.monthly_limit == Some(0) {
            return Err(HeimdallError::Configuration(format!(
                "{service}: monthly limit of 0 would reject every call; use a positive \
                 limit or leave it unbounded"
            )));
        }
        Ok(())
    }
}

/// Startup-validated table of per-service limits.
///
/// Built once (typically from [`ServiceTable::rate_card()`]) and shared by
/// reference with the limiter registry and usage tracker. Every
/// [`ServiceId`] always has a row, so lookups are infallible.
#[derive(Debug, Clone)]
pub struct ServiceTable {
    entries: HashMap<ServiceId, ServiceConfig>,
}

impl ServiceTable {
    /// Default free-tier rate card for the known providers.
    pub fn rate_card() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            ServiceId::CoinGecko,
            ServiceConfig::new(30, Duration::from_secs(60)).monthly_limit(10_000),
        );
        entries.insert(
            ServiceId::DefiLlama,
            ServiceConfig::new(300, Duration::from_secs(60)),
        );
        entries.insert(
            ServiceId::Basescan,
            ServiceConfig::new(5, Duration::from_secs(1)).monthly_limit(100_000),
        );
        entries.insert(
            ServiceId::DexScreener,
            ServiceConfig::new(300, Duration::from_secs(60)),
        );
        entries.insert(
            ServiceId::GeckoTerminal,
            ServiceConfig::new(30, Duration::from_secs(60)),
        );
        Self { entries }
    }

    /// Replace one service's row, validating the new config.
    pub fn with_config(mut self, service: ServiceId, config: ServiceConfig) -> Result<Self> {
        config.validate(service)?;
        self.entries.insert(service, config);
        Ok(self)
    }

    /// Limits for a service. Every known service has a row.
    pub fn get(&self, service: ServiceId) -> &ServiceConfig {
        self.entries
            .get(&service)
            .expect("rate card covers every ServiceId")
    }
}

impl Default for ServiceTable {
    fn default() -> Self {
        Self::rate_card()
    }
}
