//! Binance spot ticker price supplier.
//!
//! API: `https://api.binance.com/api/v3/ticker/price?symbol={pair}`
//! Response: `{"symbol": "BTCUSDT", "price": "67012.50000000"}`
//! Auth: none. Used as a fallback behind CoinGecko.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{ensure_positive, PriceSupplier};
use crate::types::RebalanceError;

const BASE_URL: &str = "https://api.binance.com";
const SUPPLIER_NAME: &str = "binance";

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    /// Binance sends prices as decimal strings.
    price: String,
}

pub struct BinanceClient {
    http: Client,
    base_url: String,
    /// Upper-cased ticker → trading pair.
    pairs: HashMap<String, String>,
}

impl BinanceClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("rebalancer/0.1.0")
            .build()
            .context("Failed to build Binance HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
            pairs: HashMap::new(),
        })
    }

    /// Register the trading pair quoted for a ticker.
    pub fn with_asset(mut self, symbol: &str, pair: &str) -> Self {
        self.pairs.insert(symbol.to_uppercase(), pair.to_uppercase());
        self
    }

    /// Configured pair, or `{SYMBOL}USDT` when none was registered.
    fn pair(&self, symbol: &str) -> String {
        let symbol = symbol.to_uppercase();
        self.pairs
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| format!("{symbol}USDT"))
    }
}

fn parse_ticker(body: &str, pair: &str) -> Result<Decimal, RebalanceError> {
    let ticker: TickerPrice = serde_json::from_str(body).map_err(|e| {
        RebalanceError::supplier(SUPPLIER_NAME, format!("invalid response body: {e}"))
    })?;
    if ticker.symbol != pair {
        return Err(RebalanceError::supplier(
            SUPPLIER_NAME,
            format!("asked for {pair}, got {}", ticker.symbol),
        ));
    }
    let price = Decimal::from_str(ticker.price.trim()).map_err(|_| {
        RebalanceError::supplier(SUPPLIER_NAME, format!("unparsable price {:?}", ticker.price))
    })?;
    ensure_positive(SUPPLIER_NAME, price.normalize())
}

#[async_trait]
impl PriceSupplier for BinanceClient {
    fn name(&self) -> &str {
        SUPPLIER_NAME
    }

    async fn current_price(&self, symbol: &str) -> Result<Decimal, RebalanceError> {
        let pair = self.pair(symbol);
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            urlencoding::encode(&pair)
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RebalanceError::supplier(SUPPLIER_NAME, format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RebalanceError::supplier(SUPPLIER_NAME, format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| RebalanceError::supplier(SUPPLIER_NAME, format!("read failed: {e}")))?;

        let price = parse_ticker(&body, &pair)?;
        debug!(symbol, pair = %pair, %price, "Binance price fetched");
        Ok(price)
    }
}
