//! End-to-end portfolio flows: enter holdings, get a recommendation,
//! record cycles, persist, export and import.

use rust_decimal_macros::dec;
use std::path::PathBuf;

use rebalancer::config::AppConfig;
use rebalancer::engine::portfolio::PortfolioState;
use rebalancer::storage::{self, ImportError};
use rebalancer::strategy::AllocationEngine;
use rebalancer::types::{Action, CycleKind, RebalanceError};

const CONFIG: &str = r#"
[asset]
symbol = "BTC"
coingecko_id = "bitcoin"
normalize_rules = true

[[asset.rules]]
min_price = 140000
target = 0.2

[[asset.rules]]
min_price = 130000
max_price = 139999
target = 0.25

[[asset.rules]]
min_price = 120000
max_price = 129999
target = 0.3

[[asset.rules]]
min_price = 109000
max_price = 119999
target = 0.35

[[asset.rules]]
min_price = 99000
max_price = 108999
target = 0.45

[[asset.rules]]
min_price = 89000
max_price = 98999
target = 0.55

[[asset.rules]]
min_price = 79000
max_price = 88999
target = 0.65

[[asset.rules]]
min_price = 69000
max_price = 78999
target = 0.75

[[asset.rules]]
min_price = 59000
max_price = 68999
target = 0.8
"#;

fn engine() -> AllocationEngine {
    let cfg = AppConfig::parse(CONFIG).unwrap();
    AllocationEngine::new(cfg.asset.rule_table().unwrap())
}

fn temp_path(tag: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("rebalancer_flow_{tag}_{}.json", uuid::Uuid::new_v4()));
    p
}

#[test]
fn test_btc_table_boundaries() {
    let engine = engine();
    // Former gap values now belong to the lower tier
    assert_eq!(engine.rule_for(dec!(139999.5)).target_fraction, dec!(0.25));
    assert_eq!(engine.rule_for(dec!(140000)).target_fraction, dec!(0.2));
    assert_eq!(engine.rule_for(dec!(1000000)).target_fraction, dec!(0.2));
    // Below the lowest configured tier
    assert_eq!(engine.rule_for(dec!(30000)).target_fraction, dec!(0.8));
    assert_eq!(engine.rule_for(dec!(0)).target_fraction, dec!(0.8));
}

#[test]
fn test_recommendation_at_btc_prices() {
    let engine = engine();
    let mut state = PortfolioState::new();
    state.set_quantities("0.1", "5000");

    // 0.1 BTC at 100k = 10000 of 15000; target 45% = 6750 → sell 3250
    let (_, result) = state.recommend(&engine, dec!(100000)).unwrap();
    assert_eq!(result.total_value, dec!(15000));
    assert_eq!(result.target_fraction, dec!(0.45));
    assert_eq!(result.action, Action::Sell);
    assert_eq!(result.trade_amount_quote, dec!(3250));
    assert_eq!(result.trade_amount_base, dec!(0.0325));

    // At 60k: 6000 of 11000; target 80% = 8800 → buy 2800
    let (_, result) = state.recommend(&engine, dec!(60000)).unwrap();
    assert_eq!(result.target_fraction, dec!(0.8));
    assert_eq!(result.action, Action::Buy);
    assert_eq!(result.trade_amount_quote, dec!(2800));
}

#[test]
fn test_empty_portfolio_has_no_recommendation() {
    let mut state = PortfolioState::new();
    state.set_quantities("0", "0");
    assert_eq!(
        state.recommend(&engine(), dec!(100)).unwrap_err(),
        RebalanceError::NoData
    );
}

#[test]
fn test_cycle_flow_persists_across_restarts() {
    let path = temp_path("state");
    let path_str = path.to_string_lossy().to_string();

    let mut state = storage::load_state(Some(&path_str)).unwrap().unwrap_or_default();
    assert!(state.ledger().is_empty());

    state.set_quantities("5", "500");
    let snapshot = state.snapshot(dec!(100)).unwrap();
    let deposit = state.record_deposit(&snapshot).unwrap();
    assert_eq!(deposit.cycle_number, 1);
    assert_eq!(deposit.kind, CycleKind::Deposit);
    assert_eq!(deposit.total_value_at_cycle, dec!(1000));
    assert_eq!(deposit.profit_since_previous, None);
    storage::save_state(&state, Some(&path_str)).unwrap();

    // Restart
    let mut state = storage::load_state(Some(&path_str)).unwrap().unwrap();
    state.set_quantities("4", "700");
    let snapshot = state.snapshot(dec!(110)).unwrap();
    let sell = state.record_movement(&snapshot, CycleKind::Sell).unwrap();
    assert_eq!(sell.cycle_number, 2);
    assert_eq!(sell.total_value_at_cycle, dec!(1140));
    assert_eq!(sell.profit_since_previous, Some(dec!(140)));
    storage::save_state(&state, Some(&path_str)).unwrap();

    let state = storage::load_state(Some(&path_str)).unwrap().unwrap();
    assert_eq!(state.ledger().len(), 2);
    assert_eq!(state.ledger().next_cycle_number(), 3);
    assert_eq!(state.ledger().cumulative_profit(), dec!(140));

    storage::delete_state(Some(&path_str)).unwrap();
}

#[test]
fn test_rejected_cycles_leave_history_untouched() {
    let mut state = PortfolioState::new();
    state.set_quantities("1", "100");
    let snapshot = state.snapshot(dec!(100)).unwrap();

    assert!(matches!(
        state.record_movement(&snapshot, CycleKind::Buy),
        Err(RebalanceError::InvalidState(_))
    ));
    assert!(state.ledger().is_empty());

    state.record_deposit(&snapshot).unwrap();
    let before = state.clone();
    assert!(matches!(
        state.record_deposit(&snapshot),
        Err(RebalanceError::InvalidState(_))
    ));
    assert_eq!(state, before);
}

#[test]
fn test_export_import_between_machines() {
    let mut laptop = PortfolioState::new();
    laptop.set_quantities("0.5", "2500");
    let s = laptop.snapshot(dec!(60000)).unwrap();
    laptop.record_deposit(&s).unwrap();
    laptop.set_quantities("0.45", "5800");
    let s = laptop.snapshot(dec!(70000)).unwrap();
    laptop.record_movement(&s, CycleKind::Sell).unwrap();

    let export = temp_path("export");
    storage::export_state(&laptop, &export).unwrap();

    let desktop = storage::import_state(&export).unwrap();
    assert_eq!(desktop, laptop);
    // 0.45 * 70000 + 5800 = 37300; 0.5 * 60000 + 2500 = 32500
    assert_eq!(
        desktop.ledger().last().unwrap().profit_since_previous,
        Some(dec!(4800))
    );

    std::fs::remove_file(&export).unwrap();
}

#[test]
fn test_fractional_holdings_survive_save_and_export() {
    let mut state = PortfolioState::new();
    state.set_quantities("0.123456789012345678", "1843.27");
    let s = state.snapshot(dec!(98765.4321)).unwrap();
    state.record_deposit(&s).unwrap();
    state.set_quantities("0.1398765432109", "207.913");
    let s = state.snapshot(dec!(87412.0937)).unwrap();
    state.record_movement(&s, CycleKind::Buy).unwrap();

    let saved = temp_path("precise_state");
    let saved_str = saved.to_string_lossy().to_string();
    storage::save_state(&state, Some(&saved_str)).unwrap();
    let reloaded = storage::load_state(Some(&saved_str)).unwrap().unwrap();
    assert_eq!(reloaded, state);

    let export = temp_path("precise_export");
    storage::export_state(&reloaded, &export).unwrap();
    let imported = storage::import_state(&export).unwrap();
    assert_eq!(imported, state);

    std::fs::remove_file(&saved).unwrap();
    std::fs::remove_file(&export).unwrap();
}

#[test]
fn test_failed_import_keeps_current_state() {
    let mut state = PortfolioState::new();
    state.set_quantities("1", "1");
    let s = state.snapshot(dec!(10)).unwrap();
    state.record_deposit(&s).unwrap();
    let before = state.clone();

    let bad = temp_path("bad");
    std::fs::write(&bad, r#"{"volatileQtyText":"1","stableQtyText":"1","cycleHistory":{}}"#).unwrap();

    match storage::import_state(&bad) {
        Ok(imported) => state = imported,
        Err(e) => assert!(matches!(e, ImportError::Malformed(_))),
    }
    assert_eq!(state, before);

    std::fs::remove_file(&bad).unwrap();
}

#[test]
fn test_reset_then_new_deposit() {
    let mut state = PortfolioState::new();
    state.set_quantities("2", "0");
    let s = state.snapshot(dec!(50)).unwrap();
    state.record_deposit(&s).unwrap();

    state.reset();
    assert!(state.ledger().is_empty());
    assert_eq!(state.volatile_qty_text(), "");

    state.set_quantities("1", "0");
    let s = state.snapshot(dec!(50)).unwrap();
    let record = state.record_deposit(&s).unwrap();
    assert_eq!(record.cycle_number, 1);
}
