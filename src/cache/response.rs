//! Two-tier response cache with stale-on-error fallback.
//!
//! [`ResponseCache`] layers a bounded in-memory tier (moka) over a durable
//! on-disk tier ([`DiskStore`]). Entries carry their own `cachedAt` /
//! `expiresAt` stamps rather than relying on the store's eviction, because
//! an expired entry must stay readable: when a live fetch fails, the last
//! known value is served as stale instead of surfacing the error.
//!
//! # Read path
//!
//! Fresh reads check the memory tier first, then the durable tier. A fresh
//! durable hit is promoted back into memory (write-through promotion) with
//! a short TTL clamped to the entry's real expiry, so promotion never
//! extends freshness. Corrupt durable entries are logged, removed, and
//! treated as absent — never surfaced.
//!
//! # Growth bound
//!
//! The memory tier is capacity-bounded by moka. The durable tier is only
//! bounded by [`sweep()`](ResponseCache::sweep), which purges expired
//! entries from both tiers; run it on an interval via
//! [`spawn_sweeper()`](ResponseCache::spawn_sweeper) to keep
//! written-once-never-reread keys from accumulating.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::key::derive_key;
use super::store::DiskStore;
use crate::clock::Clock;
use crate::service::ServiceId;
use crate::telemetry;
use crate::Result;

/// Configuration for the response cache.
///
/// ```rust
/// # use heimdall::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_memory_entries(5_000)
///     .default_ttl(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries held in the memory tier. Default: 1,000.
    pub max_memory_entries: u64,
    /// TTL applied when a fetch doesn't specify one. Default: 60s.
    pub default_ttl: Duration,
    /// TTL granted to entries promoted from the durable tier, clamped to
    /// the entry's own expiry. Default: 60s.
    pub promotion_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_entries: 1_000,
            default_ttl: Duration::from_secs(60),
            promotion_ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of memory-tier entries.
    pub fn max_memory_entries(mut self, n: u64) -> Self {
        self.max_memory_entries = n;
        self
    }

    /// Set the TTL used when a fetch doesn't specify one.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the promotion TTL for durable-tier hits.
    pub fn promotion_ttl(mut self, ttl: Duration) -> Self {
        self.promotion_ttl = ttl;
        self
    }
}

/// Which tier(s) a write lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierPolicy {
    /// Memory only — entry is lost on restart.
    Memory,
    /// Durable only — readable after restart, slower first read.
    Durable,
    /// Both tiers.
    #[default]
    Both,
}

impl TierPolicy {
    fn writes_memory(self) -> bool {
        matches!(self, TierPolicy::Memory | TierPolicy::Both)
    }

    fn writes_durable(self) -> bool {
        matches!(self, TierPolicy::Durable | TierPolicy::Both)
    }
}

/// Per-call options for [`ResponseCache::fetch_with_cache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Entry TTL; `None` uses the cache default.
    pub ttl: Option<Duration>,
    /// Skip the fresh-hit lookup and always fetch.
    pub force_refresh: bool,
    /// Where a successful fetch is stored.
    pub tier: TierPolicy,
}

impl FetchOptions {
    /// Create options with defaults (cache-default TTL, both tiers).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Bypass the fresh-hit lookup for this call.
    pub fn force_refresh(mut self, enabled: bool) -> Self {
        self.force_refresh = enabled;
        self
    }

    /// Set which tier(s) the result is written to.
    pub fn tier(mut self, tier: TierPolicy) -> Self {
        self.tier = tier;
        self
    }
}

/// A cached payload with its freshness stamps.
///
/// The serialized camelCase form (`{data, cachedAt, expiresAt}`) is the
/// durable-tier value contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Opaque payload.
    pub data: serde_json::Value,
    /// Write time, epoch millis.
    pub cached_at: u64,
    /// `cached_at + ttl`, epoch millis.
    pub expires_at: u64,
}

impl CacheEntry {
    fn is_fresh(&self, now_millis: u64) -> bool {
        now_millis <= self.expires_at
    }
}

/// Data envelope returned by [`ResponseCache::fetch_with_cache`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    /// The payload.
    pub data: T,
    /// Whether the payload came from cache rather than the fetch.
    pub cached: bool,
    /// Whether the payload was past its expiry (served because the live
    /// fetch failed). Implies `cached`.
    pub stale: bool,
}

enum TierHit {
    Memory,
    Disk,
}

impl TierHit {
    fn as_str(&self) -> &'static str {
        match self {
            TierHit::Memory => "memory",
            TierHit::Disk => "disk",
        }
    }
}

/// Two-tier key/value cache over an arbitrary async fetch function.
pub struct ResponseCache {
    memory: moka::sync::Cache<String, CacheEntry>,
    disk: DiskStore,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    promotion_ttl: Duration,
}

impl ResponseCache {
    /// Create a cache over the given durable store.
    pub fn new(config: &CacheConfig, disk: DiskStore, clock: Arc<dyn Clock>) -> Self {
        let memory = moka::sync::Cache::builder()
            .max_capacity(config.max_memory_entries)
            .build();
        Self {
            memory,
            disk,
            clock,
            default_ttl: config.default_ttl,
            promotion_ttl: config.promotion_ttl,
        }
    }

    /// Fresh-only read: returns the payload when a non-expired entry
    /// exists in either tier, `None` otherwise.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.lookup_fresh(key).map(|(entry, _)| entry.data)
    }

    /// Store a payload with the given TTL.
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Duration, tier: TierPolicy) {
        let now = self.clock.epoch_millis();
        let entry = CacheEntry {
            data: value,
            cached_at: now,
            expires_at: now + ttl.as_millis() as u64,
        };
        if tier.writes_durable() {
            match serde_json::to_string(&entry) {
                Ok(raw) => self.disk.insert(key, raw),
                Err(e) => warn!(key, error = %e, "failed to serialize cache entry"),
            }
        }
        if tier.writes_memory() {
            self.memory.insert(key.to_string(), entry);
        }
    }

    /// Remove an entry from both tiers immediately.
    pub fn invalidate(&self, key: &str) {
        self.memory.invalidate(key);
        self.disk.remove(key);
    }

    /// Purge expired entries from both tiers.
    pub fn sweep(&self) {
        let now = self.clock.epoch_millis();
        let expired: Vec<String> = self
            .memory
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        for key in &expired {
            self.memory.invalidate(key);
        }
        let dropped = self.disk.retain(|_, raw| {
            match serde_json::from_str::<CacheEntry>(raw) {
                Ok(entry) => entry.is_fresh(now),
                // Unparseable entries go with the sweep as well.
                Err(_) => false,
            }
        });
        if !expired.is_empty() || dropped > 0 {
            debug!(memory = expired.len(), disk = dropped, "swept expired cache entries");
        }
    }

    /// Run [`sweep()`](Self::sweep) on a fixed interval in a background
    /// task. Dropping the returned handle does not stop the task; abort it
    /// to stop sweeping.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately; skip it so the first sweep
            // happens one full interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        })
    }

    /// Serve from cache when fresh, otherwise fetch; on fetch failure fall
    /// back to any entry for the key regardless of expiry.
    ///
    /// 1. Unless `force_refresh`, a fresh hit returns immediately with
    ///    `cached: true` — no fetch.
    /// 2. On miss, `fetch` runs; success is stored and returned with
    ///    `cached: false`.
    /// 3. On fetch failure, a stale entry (if any) is returned with
    ///    `cached: true, stale: true` and the error is swallowed; with no
    ///    entry at all the original error propagates verbatim.
    pub async fn fetch_with_cache<T, F, Fut>(
        &self,
        service: ServiceId,
        endpoint: &str,
        params: &[(&str, &str)],
        options: &FetchOptions,
        fetch: F,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = derive_key(service, endpoint, params);
        let ttl = options.ttl.unwrap_or(self.default_ttl);

        if !options.force_refresh {
            if let Some((entry, tier)) = self.lookup_fresh(&key) {
                match serde_json::from_value::<T>(entry.data) {
                    Ok(data) => {
                        metrics::counter!(
                            telemetry::CACHE_HITS_TOTAL,
                            "service" => service.as_str(),
                            "tier" => tier.as_str(),
                        )
                        .increment(1);
                        debug!(service = %service, key = %key, tier = tier.as_str(), "cache hit");
                        return Ok(Fetched {
                            data,
                            cached: true,
                            stale: false,
                        });
                    }
                    Err(e) => {
                        // Payload no longer matches the caller's type:
                        // treat as absent.
                        warn!(service = %service, key = %key, error = %e, "cache entry failed to deserialize, removing");
                        self.invalidate(&key);
                    }
                }
            }
            metrics::counter!(
                telemetry::CACHE_MISSES_TOTAL,
                "service" => service.as_str(),
            )
            .increment(1);
        }

        match fetch().await {
            Ok(data) => {
                match serde_json::to_value(&data) {
                    Ok(value) => self.set(&key, value, ttl, options.tier),
                    Err(e) => {
                        warn!(service = %service, key = %key, error = %e, "response not cacheable")
                    }
                }
                Ok(Fetched {
                    data,
                    cached: false,
                    stale: false,
                })
            }
            Err(fetch_err) => {
                // Last known value, however old, beats an error for a
                // read-only dashboard.
                if let Some(entry) = self.lookup_any(&key) {
                    if let Ok(data) = serde_json::from_value::<T>(entry.data) {
                        warn!(
                            service = %service,
                            key = %key,
                            error = %fetch_err,
                            "fetch failed, serving stale cache entry"
                        );
                        metrics::counter!(
                            telemetry::STALE_SERVED_TOTAL,
                            "service" => service.as_str(),
                        )
                        .increment(1);
                        return Ok(Fetched {
                            data,
                            cached: true,
                            stale: true,
                        });
                    }
                }
                Err(fetch_err)
            }
        }
    }

    /// Fresh read across both tiers, promoting durable hits into memory.
    fn lookup_fresh(&self, key: &str) -> Option<(CacheEntry, TierHit)> {
        let now = self.clock.epoch_millis();
        if let Some(entry) = self.memory.get(key) {
            if entry.is_fresh(now) {
                return Some((entry, TierHit::Memory));
            }
        }
        let raw = self.disk.get(key)?;
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if entry.is_fresh(now) => {
                // Write-through promotion, clamped so it never outlives the
                // entry's real expiry.
                let mut promoted = entry.clone();
                promoted.expires_at = entry
                    .expires_at
                    .min(now + self.promotion_ttl.as_millis() as u64);
                self.memory.insert(key.to_string(), promoted);
                Some((entry, TierHit::Disk))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(key, error = %e, "corrupt cache entry, removing");
                self.disk.remove(key);
                None
            }
        }
    }

    /// Any-age read for stale fallback: memory first, then durable.
    fn lookup_any(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.get(key) {
            return Some(entry);
        }
        let raw = self.disk.get(key)?;
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "corrupt cache entry, removing");
                self.disk.remove(key);
                None
            }
        }
    }
}
