//! Price watcher: scheduled polling of a price supplier.
//!
//! `PriceWatcher::start` spawns a task that asks the supplier for a price on
//! every interval tick and publishes the outcome on a `watch` channel.
//! `stop` signals the task and waits for it to finish. Dropping the watcher
//! without calling `stop` aborts the task.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::data::PriceSupplier;
use crate::types::RebalanceError;

/// Latest known state of the price feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceTick {
    /// No fetch has completed yet.
    Pending,
    Live { price: Decimal, at: DateTime<Utc> },
    /// The last fetch failed. No price is carried over; recommendations
    /// are withheld until a fetch succeeds again.
    Unavailable { reason: String, at: DateTime<Utc> },
}

impl PriceTick {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            PriceTick::Live { price, .. } => Some(*price),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PriceTick::Pending)
    }
}

/// Fetch once and turn the outcome into a tick.
pub async fn poll_once(supplier: &dyn PriceSupplier, symbol: &str) -> PriceTick {
    match supplier.current_price(symbol).await {
        Ok(price) => {
            debug!(symbol, %price, supplier = supplier.name(), "Price updated");
            PriceTick::Live { price, at: Utc::now() }
        }
        Err(e) => {
            warn!(symbol, error = %e, "Price fetch failed");
            PriceTick::Unavailable { reason: e.to_string(), at: Utc::now() }
        }
    }
}

pub struct PriceWatcher {
    rx: watch::Receiver<PriceTick>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PriceWatcher {
    /// Start polling `symbol` every `every`. The first fetch happens
    /// immediately. Must be called from within a tokio runtime.
    ///
    /// A zero interval is rejected with `InvalidInput`.
    pub fn start(
        supplier: Arc<dyn PriceSupplier>,
        symbol: String,
        every: Duration,
    ) -> Result<Self, RebalanceError> {
        if every.is_zero() {
            return Err(RebalanceError::InvalidInput(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        let (tx, rx) = watch::channel(PriceTick::Pending);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        info!(
            symbol = %symbol,
            supplier = supplier.name(),
            interval_secs = every.as_secs_f64(),
            "Price watcher starting"
        );

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        // A fetch in flight must not hold up shutdown
                        let tick = tokio::select! {
                            _ = &mut shutdown_rx => break,
                            tick = poll_once(supplier.as_ref(), &symbol) => tick,
                        };
                        if tx.send(tick).is_err() {
                            break;
                        }
                    }
                }
            }
            info!(symbol = %symbol, "Price watcher stopped");
        });

        Ok(Self {
            rx,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Most recent tick.
    pub fn latest(&self) -> PriceTick {
        self.rx.borrow().clone()
    }

    /// A receiver that is notified on every new tick.
    pub fn subscribe(&self) -> watch::Receiver<PriceTick> {
        self.rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the polling task and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Price watcher task ended abnormally");
            }
        }
    }
}

impl Drop for PriceWatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
