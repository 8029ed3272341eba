//! CoinGecko price supplier.
//!
//! API: `https://api.coingecko.com/api/v3/simple/price?ids={id}&vs_currencies={vs}`
//! Response: `{"bitcoin": {"usd": 67012.5}}`
//! Auth: none for the public tier; an optional demo key is sent in the
//! `x-cg-demo-api-key` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{ensure_positive, PriceSupplier};
use crate::types::RebalanceError;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const SUPPLIER_NAME: &str = "coingecko";

/// `{coin_id: {vs_currency: price}}`
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct SimplePriceResponse(HashMap<String, HashMap<String, Decimal>>);

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    vs_currency: String,
    api_key: Option<SecretString>,
    /// Upper-cased ticker → CoinGecko coin id.
    coin_ids: HashMap<String, String>,
}

impl CoinGeckoClient {
    pub fn new(
        base_url: Option<String>,
        vs_currency: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("rebalancer/0.1.0")
            .build()
            .context("Failed to build CoinGecko HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
            vs_currency: vs_currency.to_lowercase(),
            api_key,
            coin_ids: HashMap::new(),
        })
    }

    /// Register the CoinGecko coin id for a ticker.
    pub fn with_asset(mut self, symbol: &str, coin_id: &str) -> Self {
        self.coin_ids.insert(symbol.to_uppercase(), coin_id.to_string());
        self
    }

    fn coin_id(&self, symbol: &str) -> Result<&str, RebalanceError> {
        self.coin_ids
            .get(&symbol.to_uppercase())
            .map(String::as_str)
            .ok_or_else(|| {
                RebalanceError::supplier(SUPPLIER_NAME, format!("no coin id configured for {symbol}"))
            })
    }

    fn price_url(&self, coin_id: &str) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            urlencoding::encode(coin_id),
            urlencoding::encode(&self.vs_currency),
        )
    }
}

/// Pull the price for `coin_id` / `vs_currency` out of a response body.
fn parse_price(body: &str, coin_id: &str, vs_currency: &str) -> Result<Decimal, RebalanceError> {
    let parsed: SimplePriceResponse = serde_json::from_str(body).map_err(|e| {
        RebalanceError::supplier(SUPPLIER_NAME, format!("invalid response body: {e}"))
    })?;
    let price = parsed
        .0
        .get(coin_id)
        .and_then(|quotes| quotes.get(vs_currency))
        .copied()
        .ok_or_else(|| {
            RebalanceError::supplier(
                SUPPLIER_NAME,
                format!("response has no {coin_id}/{vs_currency} quote"),
            )
        })?;
    ensure_positive(SUPPLIER_NAME, price)
}

#[async_trait]
impl PriceSupplier for CoinGeckoClient {
    fn name(&self) -> &str {
        SUPPLIER_NAME
    }

    async fn current_price(&self, symbol: &str) -> Result<Decimal, RebalanceError> {
        let coin_id = self.coin_id(symbol)?;
        let url = self.price_url(coin_id);

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key.expose_secret().as_str());
        }

        let resp = request
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

        let price = parse_price(&body, coin_id, &self.vs_currency)?;
        debug!(symbol, %price, "CoinGecko price fetched");
        Ok(price)
    }
}
