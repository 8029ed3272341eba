//! Ordered fallback across several price suppliers.
//!
//! Suppliers are tried in the configured order; the first positive price
//! wins. When every supplier fails the error lists each failure so the
//! driver can log why no price is available.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use super::PriceSupplier;
use crate::types::RebalanceError;

const SUPPLIER_NAME: &str = "fallback";

pub struct FallbackSupplier {
    chain: Vec<Box<dyn PriceSupplier>>,
}

impl FallbackSupplier {
    pub fn new(chain: Vec<Box<dyn PriceSupplier>>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl PriceSupplier for FallbackSupplier {
    fn name(&self) -> &str {
        SUPPLIER_NAME
    }

    async fn current_price(&self, symbol: &str) -> Result<Decimal, RebalanceError> {
        let mut failures = Vec::with_capacity(self.chain.len());

        for supplier in &self.chain {
            match supplier.current_price(symbol).await {
                Ok(price) if price > Decimal::ZERO => return Ok(price),
                Ok(price) => {
                    warn!(supplier = supplier.name(), %price, "Ignoring non-positive price");
                    failures.push(format!("{}: non-positive price {price}", supplier.name()));
                }
                Err(e) => {
                    warn!(supplier = supplier.name(), error = %e, "Price supplier failed");
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            failures.push("no suppliers configured".to_string());
        }
        Err(RebalanceError::supplier(SUPPLIER_NAME, failures.join("; ")))
    }
}
