//! Tests for the typed rate card — [`ServiceId`], [`ServiceConfig`],
//! [`ServiceTable`].

use std::time::Duration;

use heimdall::{HeimdallError, ServiceConfig, ServiceId, ServiceTable};

#[test]
fn rate_card_has_a_row_for_every_service() {
    let table = ServiceTable::rate_card();
    for service in ServiceId::ALL {
        let config = table.get(service);
        assert!(config.capacity > 0, "{service} has no burst capacity");
        assert!(!config.window.is_zero(), "{service} has a zero window");
    }
}

#[test]
fn rate_card_monthly_limits_match_free_tiers() {
    let table = ServiceTable::rate_card();
    assert_eq!(table.get(ServiceId::CoinGecko).monthly_limit, Some(10_000));
    assert_eq!(table.get(ServiceId::Basescan).monthly_limit, Some(100_000));
    assert_eq!(table.get(ServiceId::DefiLlama).monthly_limit, None);
}

#[test]
fn service_names_are_stable() {
    assert_eq!(ServiceId::CoinGecko.to_string(), "coingecko");
    assert_eq!(ServiceId::DexScreener.to_string(), "dexscreener");
    assert_eq!(ServiceId::GeckoTerminal.to_string(), "geckoterminal");
}

#[test]
fn names_parse_back_to_ids() {
    for service in ServiceId::ALL {
        assert_eq!(service.as_str().parse::<ServiceId>().unwrap(), service);
    }
}

#[test]
fn unknown_name_is_rejected_with_the_input() {
    match "etherscan".parse::<ServiceId>() {
        Err(HeimdallError::UnknownService(name)) => assert_eq!(name, "etherscan"),
        other => panic!("expected UnknownService, got {other:?}"),
    }
}

#[test]
fn invalid_overrides_fail_at_table_construction() {
    let zero_capacity = ServiceTable::rate_card().with_config(
        ServiceId::CoinGecko,
        ServiceConfig::new(0, Duration::from_secs(60)),
    );
    assert!(matches!(zero_capacity, Err(HeimdallError::Configuration(_))));

    let zero_window = ServiceTable::rate_card().with_config(
        ServiceId::CoinGecko,
        ServiceConfig::new(10, Duration::ZERO),
    );
    assert!(matches!(zero_window, Err(HeimdallError::Configuration(_))));
}

#[test]
fn config_builder_sets_fields() {
    let config = ServiceConfig::new(30, Duration::from_secs(60))
        .monthly_limit(5_000)
        .count_failed_calls(true);
    assert_eq!(config.capacity, 30);
    assert_eq!(config.window, Duration::from_secs(60));
    assert_eq!(config.monthly_limit, Some(5_000));
    assert!(config.count_failed_calls);
}

#[test]
fn serde_round_trips_service_ids() {
    let json = serde_json::to_string(&ServiceId::DefiLlama).unwrap();
    assert_eq!(json, "\"defillama\"");
    let parsed: ServiceId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, ServiceId::DefiLlama);
}
