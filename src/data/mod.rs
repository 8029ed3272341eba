//! Price suppliers.
//!
//! Defines the `PriceSupplier` trait and provides HTTP implementations for
//! CoinGecko and Binance, plus an ordered fallback chain. Suppliers are the
//! only part of the crate that talks to the network; everything they return
//! is either a positive price or `RebalanceError::SupplierUnavailable`.

pub mod binance;
pub mod coingecko;
pub mod fallback;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::Secret;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, ProviderKind};
use crate::types::RebalanceError;
use binance::BinanceClient;
use coingecko::CoinGeckoClient;
use fallback::FallbackSupplier;

/// Abstraction over a live price source for the volatile asset.
#[async_trait]
pub trait PriceSupplier: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// Current price of one unit of `symbol` in the quote currency.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, RebalanceError>;
}

/// Reject zero or negative prices coming back from an endpoint.
pub(crate) fn ensure_positive(supplier: &str, price: Decimal) -> Result<Decimal, RebalanceError> {
    if price > Decimal::ZERO {
        Ok(price)
    } else {
        Err(RebalanceError::supplier(
            supplier,
            format!("non-positive price {price}"),
        ))
    }
}

/// Build the configured supplier chain for the asset in `cfg`.
pub fn build_supplier(cfg: &AppConfig) -> Result<Arc<dyn PriceSupplier>> {
    let feed = &cfg.price_feed;
    let timeout = Duration::from_secs(feed.timeout_secs);

    let mut chain: Vec<Box<dyn PriceSupplier>> = Vec::new();
    for provider in &feed.providers {
        match provider {
            ProviderKind::Coingecko => {
                let api_key = feed
                    .coingecko_api_key_env
                    .as_deref()
                    .and_then(|env| AppConfig::resolve_env(env).ok())
                    .map(Secret::new);
                let client = CoinGeckoClient::new(
                    feed.coingecko_base_url.clone(),
                    &feed.vs_currency,
                    api_key,
                    timeout,
                )?
                .with_asset(&cfg.asset.symbol, &cfg.asset.coingecko_id);
                chain.push(Box::new(client));
            }
            ProviderKind::Binance => {
                let client = BinanceClient::new(feed.binance_base_url.clone(), timeout)?
                    .with_asset(&cfg.asset.symbol, &cfg.asset.binance_pair());
                chain.push(Box::new(client));
            }
        }
    }

    if chain.is_empty() {
        anyhow::bail!("No price providers configured");
    }
    Ok(Arc::new(FallbackSupplier::new(chain)))
}
