//! Binance market-data adapter, the primary crypto source.
//!
//! One 24hr-ticker request per symbol. A failed symbol degrades to its last
//! cached value (marked stale) instead of failing the whole call.

use crate::cache::TtlCache;
use crate::error::ProviderError;
use crate::provider::{Price, PriceProvider};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const CACHE_TTL: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    symbol: String,
    #[serde(rename = "priceChange", default)]
    price_change: String,
    #[serde(rename = "priceChangePercent", default)]
    price_change_percent: String,
    #[serde(rename = "lastPrice", default)]
    last_price: String,
}

pub struct BinanceProvider {
    base_url: String,
    client: reqwest::Client,
    cache: TtlCache<String, Price>,
}

impl BinanceProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            cache: TtlCache::new(CACHE_TTL),
        }
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<TickerResponse, ProviderError> {
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let ticker = response.json::<TickerResponse>().await?;
        Ok(ticker)
    }
}

/// Parses an upstream numeric string, defaulting to zero. The ticker fields
/// arrive as strings; a malformed field must not fail the whole call.
fn parse_field(raw: &str) -> f64 {
    raw.parse().unwrap_or(0.0)
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    #[instrument(name = "BinanceFetch", skip(self), fields(count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &[String]) -> Result<Vec<Price>, ProviderError> {
        if let Some(cached) = self.cache.get_all(symbols).await {
            debug!("returning cached ticker prices");
            return Ok(cached);
        }

        info!(?symbols, "fetching tickers");

        let now = Utc::now();
        let mut prices = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            match self.fetch_ticker(symbol).await {
                Ok(ticker) => {
                    let resolved = if ticker.symbol.is_empty() {
                        symbol.clone()
                    } else {
                        ticker.symbol
                    };
                    prices.push(Price {
                        name: symbol_display_name(&resolved).to_string(),
                        symbol: resolved,
                        price: parse_field(&ticker.last_price),
                        daily_change: parse_field(&ticker.price_change),
                        daily_pct: parse_field(&ticker.price_change_percent),
                        last_updated: now,
                        stale: false,
                    });
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "ticker request failed");
                    if let Some(mut cached) = self.cache.get_stale(symbol).await {
                        cached.stale = true;
                        prices.push(cached);
                    }
                }
            }
        }

        self.cache
            .put_many(prices.iter().map(|p| (p.symbol.clone(), p.clone())))
            .await;

        Ok(prices)
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/api/v3/ping", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Display names for common trading pairs; the pair itself otherwise.
pub fn symbol_display_name(symbol: &str) -> &str {
    match symbol {
        "BTCUSDT" => "Bitcoin",
        "ETHUSDT" => "Ethereum",
        "SOLUSDT" => "Solana",
        "BNBUSDT" => "BNB",
        "XRPUSDT" => "XRP",
        "ADAUSDT" => "Cardano",
        "DOGEUSDT" => "Dogecoin",
        "DOTUSDT" => "Polkadot",
        "MATICUSDT" => "Polygon",
        "AVAXUSDT" => "Avalanche",
        other => other,
    }
}
