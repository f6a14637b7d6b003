//! Caching subsystem.
//!
//! Two tiers behind one façade:
//!
//! - **Ephemeral tier** — bounded in-memory map (moka), fastest, lost on
//!   restart.
//! - **Durable tier** — [`store::DiskStore`], one JSON file per namespace
//!   under the cache directory, survives restarts.
//!
//! [`response::ResponseCache`] composes the tiers and layers the
//! fetch-through logic ([`ResponseCache::fetch_with_cache`]) with stale
//! fallback on fetch failure. [`key::derive_key`] fixes the canonical
//! cache-key scheme shared by both tiers.

pub mod key;
pub mod response;
pub mod store;

pub use key::derive_key;
pub use response::{CacheConfig, CacheEntry, FetchOptions, Fetched, ResponseCache, TierPolicy};
pub use store::DiskStore;
