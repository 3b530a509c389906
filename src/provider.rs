//! Price model and the contract every data source implements.

use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point-in-time quote for one tradable symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub symbol: String,
    pub name: String,
    /// Current unit price in the source's native currency. Never negative.
    pub price: f64,
    /// Absolute daily change; zero when the source does not supply it.
    pub daily_change: f64,
    pub daily_pct: f64,
    pub last_updated: DateTime<Utc>,
    /// True when the value is known or suspected outdated (non-trading day,
    /// fetch failure served from cache). Consumers must not treat a stale
    /// price as fresh.
    pub stale: bool,
}

impl Price {
    /// Zero-priced stale placeholder for a symbol the source could not serve.
    pub fn placeholder(symbol: &str, name: &str) -> Self {
        Price {
            symbol: symbol.to_string(),
            name: name.to_string(),
            price: 0.0,
            daily_change: 0.0,
            daily_pct: 0.0,
            last_updated: Utc::now(),
            stale: true,
        }
    }
}

/// An exchange rate with the time it was observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub rate: f64,
    pub last_updated: DateTime<Utc>,
}

/// Contract for all price data sources.
///
/// `fetch_prices` returns quotes for the requested symbols where available;
/// whether unknown symbols are omitted or returned as stale zero-price
/// placeholders is adapter-specific and documented per adapter. No ordering
/// guarantee across symbols; callers index results by symbol.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider name for logging and identification.
    fn name(&self) -> &str;

    async fn fetch_prices(&self, symbols: &[String]) -> Result<Vec<Price>, ProviderError>;

    /// Lightweight liveness probe. Never errors; any failure reads as false.
    async fn is_healthy(&self) -> bool;

    /// Releases held resources. Idempotent.
    async fn close(&self) -> Result<(), ProviderError>;

    /// Optional capability: not every source can quote exchange rates.
    /// Callers must check before use instead of downcasting.
    fn exchange_rates(&self) -> Option<&dyn ExchangeRateProvider> {
        None
    }
}

/// Optional capability for providers that can quote USD/TRY.
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    async fn fetch_exchange_rate(&self) -> Result<ExchangeRate, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_stale_and_zero() {
        let p = Price::placeholder("KUT", "KUT Fund");
        assert_eq!(p.symbol, "KUT");
        assert_eq!(p.price, 0.0);
        assert_eq!(p.daily_change, 0.0);
        assert!(p.stale);
    }
}
