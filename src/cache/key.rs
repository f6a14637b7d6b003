//! Deterministic cache-key derivation.
//!
//! Keys have the form `api_{service}_{endpoint}_{k=v&k2=v2}` with params
//! sorted lexicographically, so the same logical request always maps to
//! the same key regardless of param insertion order. The string form is
//! also the durable-tier storage key, which makes it a compatibility
//! contract — don't change it without migrating persisted entries.

use crate::service::ServiceId;

/// Derive the canonical cache key for `(service, endpoint, params)`.
pub fn derive_key(service: ServiceId, endpoint: &str, params: &[(&str, &str)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0).then(a.1.cmp(b.1)));
    let params_part = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("api_{}_{}_{}", service.as_str(), endpoint, params_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_insertion_order_independent() {
        let k1 = derive_key(ServiceId::CoinGecko, "price", &[("ids", "eth"), ("vs", "usd")]);
        let k2 = derive_key(ServiceId::CoinGecko, "price", &[("vs", "usd"), ("ids", "eth")]);
        assert_eq!(k1, k2);
    }

    #[test]
    fn key_differs_on_service() {
        let k1 = derive_key(ServiceId::CoinGecko, "price", &[("ids", "eth")]);
        let k2 = derive_key(ServiceId::DefiLlama, "price", &[("ids", "eth")]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn key_differs_on_endpoint() {
        let k1 = derive_key(ServiceId::CoinGecko, "price", &[]);
        let k2 = derive_key(ServiceId::CoinGecko, "trending", &[]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn key_differs_on_param_values() {
        let k1 = derive_key(ServiceId::CoinGecko, "price", &[("ids", "eth")]);
        let k2 = derive_key(ServiceId::CoinGecko, "price", &[("ids", "btc")]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn key_matches_storage_contract() {
        let key = derive_key(ServiceId::Basescan, "gas", &[("module", "proxy")]);
        assert_eq!(key, "api_basescan_gas_module=proxy");
    }

    #[test]
    fn empty_params_keep_namespace_shape() {
        let key = derive_key(ServiceId::DexScreener, "pairs", &[]);
        assert_eq!(key, "api_dexscreener_pairs_");
    }
}
