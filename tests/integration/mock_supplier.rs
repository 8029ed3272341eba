//! Mock price supplier for integration testing.
//!
//! Replays a scripted sequence of outcomes, one per call. Once the script
//! is exhausted the last outcome repeats, so a watcher can keep ticking
//! for as long as a test needs.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rebalancer::data::PriceSupplier;
use rebalancer::types::RebalanceError;

pub type Outcome = Result<Decimal, RebalanceError>;

pub struct ScriptedSupplier {
    name: String,
    script: Mutex<VecDeque<Outcome>>,
    last: Mutex<Option<Outcome>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSupplier {
    pub fn new(name: &str, script: Vec<Outcome>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always returns `price`.
    pub fn fixed(price: Decimal) -> Self {
        Self::new("fixed", vec![Ok(price)])
    }

    /// Always fails as if the endpoint were rate-limiting.
    pub fn failing() -> Self {
        Self::new(
            "failing",
            vec![Err(RebalanceError::supplier("failing", "HTTP 429 Too Many Requests"))],
        )
    }

    /// Shared call counter, readable after the supplier moved into a watcher.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PriceSupplier for ScriptedSupplier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn current_price(&self, _symbol: &str) -> Result<Decimal, RebalanceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(RebalanceError::supplier(&self.name, "empty script"))),
        }
    }
}

/// Answers every request only after `delay`.
pub struct SlowSupplier {
    delay: Duration,
    price: Decimal,
}

impl SlowSupplier {
    pub fn new(delay: Duration, price: Decimal) -> Self {
        Self { delay, price }
    }
}

#[async_trait]
impl PriceSupplier for SlowSupplier {
    fn name(&self) -> &str {
        "slow"
    }

    async fn current_price(&self, _symbol: &str) -> Result<Decimal, RebalanceError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.price)
    }
}
