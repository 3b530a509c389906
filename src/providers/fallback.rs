//! Two-provider fallback composition.
//!
//! The primary's answer is returned verbatim whenever it answers at all.
//! Partial or stale results from the primary do NOT trigger the secondary;
//! only a hard error does, and then the secondary gets exactly one attempt.

use crate::error::ProviderError;
use crate::provider::{ExchangeRate, ExchangeRateProvider, Price, PriceProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{instrument, warn};

pub struct FallbackProvider {
    name: String,
    primary: Arc<dyn PriceProvider>,
    secondary: Arc<dyn PriceProvider>,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn PriceProvider>, secondary: Arc<dyn PriceProvider>) -> Self {
        let name = format!("{}+{}", primary.name(), secondary.name());
        Self {
            name,
            primary,
            secondary,
        }
    }
}

#[async_trait]
impl PriceProvider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "FallbackFetch", skip_all, fields(provider = %self.name))]
    async fn fetch_prices(&self, symbols: &[String]) -> Result<Vec<Price>, ProviderError> {
        match self.primary.fetch_prices(symbols).await {
            Ok(prices) => Ok(prices),
            Err(e) => {
                warn!(
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    error = %e,
                    transient = e.is_transient(),
                    "primary provider failed, trying secondary"
                );
                self.secondary.fetch_prices(symbols).await
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        self.primary.is_healthy().await || self.secondary.is_healthy().await
    }

    async fn close(&self) -> Result<(), ProviderError> {
        let first = self.primary.close().await;
        let second = self.secondary.close().await;
        first.and(second)
    }

    fn exchange_rates(&self) -> Option<&dyn ExchangeRateProvider> {
        Some(self)
    }
}

#[async_trait]
impl ExchangeRateProvider for FallbackProvider {
    /// Delegates to whichever member advertises the capability, primary
    /// first. Neither advertising it is a configuration error, not a
    /// transient one.
    async fn fetch_exchange_rate(&self) -> Result<ExchangeRate, ProviderError> {
        if let Some(rates) = self.primary.exchange_rates() {
            match rates.fetch_exchange_rate().await {
                Ok(rate) => return Ok(rate),
                Err(e) => {
                    warn!(
                        primary = self.primary.name(),
                        error = %e,
                        "primary exchange rate failed, trying secondary"
                    );
                }
            }
        }
        if let Some(rates) = self.secondary.exchange_rates() {
            return rates.fetch_exchange_rate().await;
        }
        Err(ProviderError::UnsupportedCapability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Price;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        name: &'static str,
        healthy: bool,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, fail: bool) -> Self {
            Self {
                name,
                healthy: !fail,
                fail,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_prices(&self, symbols: &[String]) -> Result<Vec<Price>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Status(503));
            }
            Ok(symbols
                .iter()
                .map(|s| Price {
                    price: 100.0,
                    ..Price::placeholder(s, self.name)
                })
                .collect())
        }

        async fn is_healthy(&self) -> bool {
            self.healthy
        }

        async fn close(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn symbols() -> Vec<String> {
        vec!["BTCUSDT".to_string()]
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let primary = Arc::new(ScriptedProvider::new("primary", false));
        let secondary = Arc::new(ScriptedProvider::new("secondary", false));
        let fallback = FallbackProvider::new(primary.clone(), secondary.clone());

        let prices = fallback.fetch_prices(&symbols()).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_tries_secondary_once() {
        let primary = Arc::new(ScriptedProvider::new("primary", true));
        let secondary = Arc::new(ScriptedProvider::new("secondary", false));
        let fallback = FallbackProvider::new(primary.clone(), secondary.clone());

        let prices = fallback.fetch_prices(&symbols()).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_secondary_error() {
        let primary = Arc::new(ScriptedProvider::new("primary", true));
        let secondary = Arc::new(ScriptedProvider::new("secondary", true));
        let fallback = FallbackProvider::new(primary.clone(), secondary.clone());

        let err = fallback.fetch_prices(&symbols()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status(503)));
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_health_is_an_or() {
        let healthy = Arc::new(ScriptedProvider::new("primary", false));
        let failing = Arc::new(ScriptedProvider::new("secondary", true));

        let fallback = FallbackProvider::new(failing.clone(), healthy.clone());
        assert!(fallback.is_healthy().await);

        let both_down = FallbackProvider::new(
            Arc::new(ScriptedProvider::new("a", true)),
            Arc::new(ScriptedProvider::new("b", true)),
        );
        assert!(!both_down.is_healthy().await);
    }

    #[tokio::test]
    async fn test_no_exchange_rate_capability_anywhere() {
        let fallback = FallbackProvider::new(
            Arc::new(ScriptedProvider::new("primary", false)),
            Arc::new(ScriptedProvider::new("secondary", false)),
        );
        let err = fallback
            .exchange_rates()
            .unwrap()
            .fetch_exchange_rate()
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedCapability));
    }

    #[test]
    fn test_composed_name() {
        let fallback = FallbackProvider::new(
            Arc::new(ScriptedProvider::new("binance", false)),
            Arc::new(ScriptedProvider::new("coingecko", false)),
        );
        assert_eq!(fallback.name(), "binance+coingecko");
    }
}
