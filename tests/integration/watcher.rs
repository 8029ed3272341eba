//! Price watcher lifecycle against a scripted supplier.

use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use rebalancer::engine::portfolio::PortfolioState;
use rebalancer::engine::watcher::{poll_once, PriceTick, PriceWatcher};
use rebalancer::strategy::rules::RuleTable;
use rebalancer::strategy::AllocationEngine;
use rebalancer::types::{Action, AllocationRule, RebalanceError};

use crate::mock_supplier::{ScriptedSupplier, SlowSupplier};

const FAST: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(5);

/// Wait until the watcher publishes a tick matching `pred`.
async fn wait_for(
    rx: &mut tokio::sync::watch::Receiver<PriceTick>,
    pred: impl Fn(&PriceTick) -> bool,
) -> PriceTick {
    timeout(WAIT, async {
        loop {
            {
                let tick = rx.borrow_and_update();
                if pred(&*tick) {
                    return (*tick).clone();
                }
            }
            rx.changed().await.expect("watcher ended early");
        }
    })
    .await
    .expect("timed out waiting for tick")
}

#[tokio::test]
async fn test_poll_once_live_and_unavailable() {
    let live = poll_once(&ScriptedSupplier::fixed(dec!(67000)), "BTC").await;
    assert_eq!(live.price(), Some(dec!(67000)));

    let down = poll_once(&ScriptedSupplier::failing(), "BTC").await;
    assert_eq!(down.price(), None);
    match down {
        PriceTick::Unavailable { reason, .. } => assert!(reason.contains("429")),
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_tick_is_immediate() {
    // Long interval: only the immediate first fetch can satisfy the wait
    let watcher = PriceWatcher::start(
        Arc::new(ScriptedSupplier::fixed(dec!(100))),
        "BTC".into(),
        Duration::from_secs(3600),
    )
    .unwrap();
    let mut rx = watcher.subscribe();

    let tick = wait_for(&mut rx, |t| !t.is_pending()).await;
    assert_eq!(tick.price(), Some(dec!(100)));
    assert_eq!(watcher.latest().price(), Some(dec!(100)));
    assert!(watcher.is_running());

    watcher.stop().await;
}

#[tokio::test]
async fn test_failure_publishes_unavailable() {
    let watcher =
        PriceWatcher::start(Arc::new(ScriptedSupplier::failing()), "BTC".into(), FAST).unwrap();
    let mut rx = watcher.subscribe();

    let down = wait_for(&mut rx, |t| !t.is_pending()).await;
    assert!(matches!(down, PriceTick::Unavailable { .. }));
    assert_eq!(down.price(), None);
    assert_eq!(watcher.latest().price(), None);

    watcher.stop().await;
}

#[tokio::test]
async fn test_recovers_after_failure() {
    let supplier = ScriptedSupplier::new(
        "flaky",
        vec![Err(RebalanceError::supplier("flaky", "timeout")), Ok(dec!(120))],
    );
    let calls = supplier.call_counter();
    let watcher = PriceWatcher::start(Arc::new(supplier), "BTC".into(), FAST).unwrap();
    let mut rx = watcher.subscribe();

    wait_for(&mut rx, |t| t.price() == Some(dec!(120))).await;
    assert!(calls.load(Ordering::SeqCst) >= 2);

    watcher.stop().await;
}

#[tokio::test]
async fn test_zero_interval_rejected() {
    let result = PriceWatcher::start(
        Arc::new(ScriptedSupplier::fixed(dec!(100))),
        "BTC".into(),
        Duration::ZERO,
    );
    assert!(matches!(result, Err(RebalanceError::InvalidInput(_))));
}

#[tokio::test]
async fn test_stop_interrupts_fetch_in_flight() {
    let supplier = SlowSupplier::new(Duration::from_secs(60), dec!(100));
    let watcher = PriceWatcher::start(Arc::new(supplier), "BTC".into(), FAST).unwrap();
    let rx = watcher.subscribe();

    // Let the first fetch start
    tokio::time::sleep(FAST * 3).await;
    assert!(rx.borrow().is_pending());

    let stopped = timeout(Duration::from_secs(2), watcher.stop()).await;
    assert!(stopped.is_ok());
}

#[tokio::test]
async fn test_stop_ends_polling() {
    let supplier = ScriptedSupplier::fixed(dec!(50));
    let calls = supplier.call_counter();
    let watcher = PriceWatcher::start(Arc::new(supplier), "BTC".into(), FAST).unwrap();
    let mut rx = watcher.subscribe();

    wait_for(&mut rx, |t| !t.is_pending()).await;
    watcher.stop().await;

    // The sender is gone once the task exits
    let closed = timeout(WAIT, async {
        while rx.changed().await.is_ok() {}
    })
    .await;
    assert!(closed.is_ok());

    let after_stop = calls.load(Ordering::SeqCst);
    tokio::time::sleep(FAST * 5).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);
}

#[tokio::test]
async fn test_dropping_watcher_ends_task() {
    let supplier = ScriptedSupplier::fixed(dec!(50));
    let calls = supplier.call_counter();
    let watcher = PriceWatcher::start(Arc::new(supplier), "BTC".into(), FAST).unwrap();
    let mut rx = watcher.subscribe();
    wait_for(&mut rx, |t| !t.is_pending()).await;

    drop(watcher);
    let closed = timeout(WAIT, async {
        while rx.changed().await.is_ok() {}
    })
    .await;
    assert!(closed.is_ok());
    assert!(calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_ticks_drive_recommendations() {
    let engine = AllocationEngine::new(
        RuleTable::new(vec![
            AllocationRule::new(dec!(200), None, dec!(0.6)),
            AllocationRule::new(dec!(0), Some(dec!(200)), dec!(0.8)),
        ])
        .unwrap(),
    );
    let mut state = PortfolioState::new();
    state.set_quantities("10", "1000");

    let supplier = ScriptedSupplier::new("script", vec![Ok(dec!(200))]);
    let watcher = PriceWatcher::start(Arc::new(supplier), "BTC".into(), FAST).unwrap();
    let mut rx = watcher.subscribe();

    let tick = wait_for(&mut rx, |t| t.price().is_some()).await;
    let price = tick.price().unwrap();
    let (_, result) = state.recommend(&engine, price).unwrap();
    assert_eq!(result.action, Action::Sell);
    assert_eq!(result.trade_amount_quote, dec!(200));
    assert_eq!(result.trade_amount_base, dec!(1));

    watcher.stop().await;
}
