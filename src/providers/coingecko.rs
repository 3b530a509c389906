//! CoinGecko market-data adapter, the rate-limited fallback source.
//!
//! CoinGecko keys quotes by coin id ("bitcoin"), not trading pair
//! ("BTCUSDT"); requests go through [`symbol_to_coin_id`]. The longer cache
//! TTL protects the free-tier quota, since by the time this adapter is
//! asked the primary has already failed.

use crate::cache::TtlCache;
use crate::error::ProviderError;
use crate::provider::{ExchangeRate, ExchangeRateProvider, Price, PriceProvider};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

const CACHE_TTL: Duration = Duration::from_secs(60);
const EXCHANGE_RATE_TTL: Duration = Duration::from_secs(5 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CoinQuote {
    #[serde(default)]
    usd: f64,
    #[serde(default)]
    usd_24h_change: f64,
}

#[derive(Debug, Deserialize)]
struct TetherQuote {
    // the fiat key is "try", a Rust keyword
    #[serde(rename = "try", default)]
    try_rate: Option<f64>,
}

pub struct CoinGeckoProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    cache: TtlCache<String, Price>,
    exchange_rate: Mutex<Option<(ExchangeRate, Instant)>>,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            cache: TtlCache::new(CACHE_TTL),
            exchange_rate: Mutex::new(None),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ProviderError> {
        let mut request = self.client.get(url);
        if !self.api_key.is_empty() {
            request = request.header("x-cg-demo-api-key", &self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "coingecko"
    }

    #[instrument(name = "CoinGeckoFetch", skip(self), fields(count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &[String]) -> Result<Vec<Price>, ProviderError> {
        let coin_ids: Vec<String> = symbols.iter().map(|s| symbol_to_coin_id(s)).collect();

        if let Some(cached) = self.cache.get_all(&coin_ids).await {
            debug!("returning cached coin prices");
            return Ok(cached);
        }

        info!(?coin_ids, "fetching coin prices");

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_24hr_change=true",
            self.base_url,
            coin_ids.join(",")
        );
        let quotes: HashMap<String, CoinQuote> = self.get_json(&url).await?;

        let now = Utc::now();
        let mut prices = Vec::with_capacity(symbols.len());
        for (symbol, coin_id) in symbols.iter().zip(&coin_ids) {
            // Unknown coins are omitted, not placeholdered
            let Some(quote) = quotes.get(coin_id) else {
                continue;
            };
            prices.push(Price {
                symbol: symbol.clone(),
                name: coin_display_name(coin_id).to_string(),
                price: quote.usd,
                // Absolute change is not in the simple API
                daily_change: 0.0,
                daily_pct: quote.usd_24h_change,
                last_updated: now,
                stale: false,
            });
        }

        self.cache
            .put_many(
                prices
                    .iter()
                    .map(|p| (symbol_to_coin_id(&p.symbol), p.clone())),
            )
            .await;

        Ok(prices)
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/ping", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn exchange_rates(&self) -> Option<&dyn ExchangeRateProvider> {
        Some(self)
    }
}

#[async_trait]
impl ExchangeRateProvider for CoinGeckoProvider {
    /// USD/TRY proxied by tether's quoted TRY price. This is an
    /// approximation of the actual FX rate, not a direct feed; the peg can
    /// drift.
    async fn fetch_exchange_rate(&self) -> Result<ExchangeRate, ProviderError> {
        {
            let cached = self.exchange_rate.lock().await;
            if let Some((rate, fetched_at)) = *cached {
                if fetched_at.elapsed() < EXCHANGE_RATE_TTL {
                    return Ok(rate);
                }
            }
        }

        info!("fetching USD/TRY exchange rate");

        let url = format!("{}/simple/price?ids=tether&vs_currencies=try", self.base_url);
        let result: HashMap<String, TetherQuote> = self.get_json(&url).await?;

        let rate = result
            .get("tether")
            .and_then(|q| q.try_rate)
            .filter(|r| *r > 0.0)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("invalid exchange rate response".to_string())
            })?;

        let exchange_rate = ExchangeRate {
            rate,
            last_updated: Utc::now(),
        };

        *self.exchange_rate.lock().await = Some((exchange_rate, Instant::now()));
        info!(rate, "fetched USD/TRY exchange rate");
        Ok(exchange_rate)
    }
}

/// Maps an internal trading pair to CoinGecko's coin id. Unmapped pairs fall
/// back to stripping the quote-asset suffix and lowercasing.
pub fn symbol_to_coin_id(symbol: &str) -> String {
    let id = match symbol {
        "BTCUSDT" => "bitcoin",
        "ETHUSDT" => "ethereum",
        "SOLUSDT" => "solana",
        "BNBUSDT" => "binancecoin",
        "XRPUSDT" => "ripple",
        "ADAUSDT" => "cardano",
        "DOGEUSDT" => "dogecoin",
        "DOTUSDT" => "polkadot",
        "MATICUSDT" => "matic-network",
        "AVAXUSDT" => "avalanche-2",
        other => return other.trim_end_matches("USDT").to_lowercase(),
    };
    id.to_string()
}

fn coin_display_name(coin_id: &str) -> &str {
    match coin_id {
        "bitcoin" => "Bitcoin",
        "ethereum" => "Ethereum",
        "solana" => "Solana",
        "binancecoin" => "BNB",
        "ripple" => "XRP",
        "cardano" => "Cardano",
        "dogecoin" => "Dogecoin",
        "polkadot" => "Polkadot",
        "matic-network" => "Polygon",
        "avalanche-2" => "Avalanche",
        other => other,
    }
}
