//! Valuation engine: joins live prices with stored holdings.
//!
//! Price trouble never fails a valuation. A provider that is missing,
//! erroring, or over its deadline degrades that asset class to zero-priced
//! stale placeholders; store errors are the only hard failures here. Every
//! holding appears in the result no matter what; tracked symbols without a
//! holding appear with zero quantity.

use crate::error::StoreError;
use crate::provider::{ExchangeRate, Price, PriceProvider};
use crate::providers::binance::symbol_display_name;
use crate::providers::tefas::fund_display_name;
use crate::store::{HoldingKind, HoldingStore};
use chrono::{DateTime, Utc};
use futures::future;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{instrument, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One symbol priced and joined: what you own, what it is worth now.
#[derive(Debug, Clone, Serialize)]
pub struct ValuedAsset {
    pub symbol: String,
    pub name: String,
    pub kind: HoldingKind,
    pub quantity: f64,
    pub cost_basis: f64,
    pub price: f64,
    pub daily_pct: f64,
    pub value: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub stale: bool,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub kind: HoldingKind,
    pub assets: Vec<ValuedAsset>,
    pub total_value: f64,
    pub total_cost: f64,
    pub total_pnl: f64,
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub funds: ClassSummary,
    pub crypto: ClassSummary,
    pub total_value: f64,
    pub total_cost: f64,
    pub total_pnl: f64,
    pub pnl_pct: f64,
    pub generated_at: DateTime<Utc>,
}

pub struct Aggregator {
    fund_provider: Option<Arc<dyn PriceProvider>>,
    crypto_provider: Option<Arc<dyn PriceProvider>>,
    tracked_funds: Vec<String>,
    tracked_crypto: Vec<String>,
    store: Arc<dyn HoldingStore>,
    fetch_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        fund_provider: Option<Arc<dyn PriceProvider>>,
        crypto_provider: Option<Arc<dyn PriceProvider>>,
        store: Arc<dyn HoldingStore>,
    ) -> Self {
        Self {
            fund_provider,
            crypto_provider,
            tracked_funds: Vec::new(),
            tracked_crypto: Vec::new(),
            store,
            fetch_timeout: FETCH_TIMEOUT,
        }
    }

    /// Symbols watched beyond the stored holdings. They show up in the
    /// valuation with zero quantity.
    pub fn with_tracked(mut self, funds: Vec<String>, crypto: Vec<String>) -> Self {
        self.tracked_funds = funds;
        self.tracked_crypto = crypto;
        self
    }

    #[cfg(test)]
    fn with_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    fn provider_for(&self, kind: HoldingKind) -> Option<&Arc<dyn PriceProvider>> {
        match kind {
            HoldingKind::Fund => self.fund_provider.as_ref(),
            HoldingKind::Crypto => self.crypto_provider.as_ref(),
        }
    }

    fn tracked_for(&self, kind: HoldingKind) -> &[String] {
        match kind {
            HoldingKind::Fund => &self.tracked_funds,
            HoldingKind::Crypto => &self.tracked_crypto,
        }
    }

    /// Prices for one asset class, or stale zero placeholders when the class
    /// has no working provider.
    async fn prices_for(&self, kind: HoldingKind, symbols: &[String]) -> Vec<Price> {
        let Some(provider) = self.provider_for(kind) else {
            warn!(%kind, "no provider configured, serving placeholders");
            return placeholders(kind, symbols);
        };

        match timeout(self.fetch_timeout, provider.fetch_prices(symbols)).await {
            Ok(Ok(prices)) => prices,
            Ok(Err(e)) => {
                warn!(%kind, provider = provider.name(), error = %e, "price fetch failed");
                placeholders(kind, symbols)
            }
            Err(_) => {
                warn!(%kind, provider = provider.name(), "price fetch deadline exceeded");
                placeholders(kind, symbols)
            }
        }
    }

    /// Values one asset class. Every holding appears, placeholdered when its
    /// price is missing; tracked symbols without a holding join with zero
    /// quantity and cost.
    #[instrument(name = "ClassAssets", skip(self))]
    pub async fn class_assets(&self, kind: HoldingKind) -> Result<ClassSummary, StoreError> {
        let holdings = self.store.by_kind(kind).await?;

        let mut symbols: Vec<String> = self.tracked_for(kind).to_vec();
        for holding in &holdings {
            if !symbols.contains(&holding.symbol) {
                symbols.push(holding.symbol.clone());
            }
        }
        if symbols.is_empty() {
            return Ok(summarize(kind, Vec::new()));
        }

        let prices = self.prices_for(kind, &symbols).await;
        let by_symbol: HashMap<&str, &Price> =
            prices.iter().map(|p| (p.symbol.as_str(), p)).collect();

        let mut assets: Vec<ValuedAsset> = holdings
            .iter()
            .map(|holding| {
                let price = match by_symbol.get(holding.symbol.as_str()) {
                    Some(price) => (*price).clone(),
                    None => Price::placeholder(
                        &holding.symbol,
                        &display_name(kind, &holding.symbol),
                    ),
                };
                join_price(kind, holding.quantity, holding.cost_basis, &price)
            })
            .collect();

        let held: HashSet<&str> = holdings.iter().map(|h| h.symbol.as_str()).collect();
        for price in &prices {
            if !held.contains(price.symbol.as_str()) {
                assets.push(join_price(kind, 0.0, 0.0, price));
            }
        }

        Ok(summarize(kind, assets))
    }

    /// Full portfolio: both classes valued concurrently, then totalled.
    pub async fn summary(&self) -> Result<PortfolioSummary, StoreError> {
        let (funds, crypto) = future::try_join(
            self.class_assets(HoldingKind::Fund),
            self.class_assets(HoldingKind::Crypto),
        )
        .await?;

        let total_value = funds.total_value + crypto.total_value;
        let total_cost = funds.total_cost + crypto.total_cost;
        let total_pnl = total_value - total_cost;
        Ok(PortfolioSummary {
            pnl_pct: pct(total_pnl, total_cost),
            funds,
            crypto,
            total_value,
            total_cost,
            total_pnl,
            generated_at: Utc::now(),
        })
    }

    /// Bare single-symbol lookup. A holding is joined when one exists but is
    /// not required; any failure to produce a price surfaces as not-found.
    pub async fn quote(&self, kind: HoldingKind, symbol: &str) -> Result<ValuedAsset, StoreError> {
        let symbol = symbol.to_uppercase();
        let provider = self.provider_for(kind).ok_or(StoreError::NotFound)?;

        let symbols = [symbol.clone()];
        let prices = match timeout(self.fetch_timeout, provider.fetch_prices(&symbols)).await {
            Ok(Ok(prices)) => prices,
            Ok(Err(e)) => {
                warn!(%symbol, error = %e, "single symbol fetch failed");
                return Err(StoreError::NotFound);
            }
            Err(_) => return Err(StoreError::NotFound),
        };
        let price = prices
            .into_iter()
            .find(|p| p.symbol == symbol)
            .ok_or(StoreError::NotFound)?;

        let (quantity, cost_basis) = match self.store.get_by_symbol(kind, &symbol).await {
            Ok(holding) => (holding.quantity, holding.cost_basis),
            Err(_) => (0.0, 0.0),
        };
        Ok(join_price(kind, quantity, cost_basis, &price))
    }

    /// USD/TRY via the crypto provider's capability, if it has one.
    pub async fn exchange_rate(&self) -> Option<ExchangeRate> {
        let provider = self.crypto_provider.as_ref()?;
        let rates = provider.exchange_rates()?;
        match timeout(self.fetch_timeout, rates.fetch_exchange_rate()).await {
            Ok(Ok(rate)) => Some(rate),
            Ok(Err(e)) => {
                warn!(error = %e, "exchange rate fetch failed");
                None
            }
            Err(_) => {
                warn!("exchange rate fetch deadline exceeded");
                None
            }
        }
    }
}

fn display_name(kind: HoldingKind, symbol: &str) -> String {
    match kind {
        HoldingKind::Fund => fund_display_name(symbol),
        HoldingKind::Crypto => symbol_display_name(symbol).to_string(),
    }
}

fn placeholders(kind: HoldingKind, symbols: &[String]) -> Vec<Price> {
    symbols
        .iter()
        .map(|s| Price::placeholder(s, &display_name(kind, s)))
        .collect()
}

fn pct(pnl: f64, cost: f64) -> f64 {
    if cost > 0.0 { pnl / cost * 100.0 } else { 0.0 }
}

fn join_price(kind: HoldingKind, quantity: f64, cost_basis: f64, price: &Price) -> ValuedAsset {
    let value = quantity * price.price;
    let pnl = value - cost_basis;
    ValuedAsset {
        symbol: price.symbol.clone(),
        name: price.name.clone(),
        kind,
        quantity,
        cost_basis,
        price: price.price,
        daily_pct: price.daily_pct,
        value,
        pnl,
        pnl_pct: pct(pnl, cost_basis),
        stale: price.stale,
        last_updated: price.last_updated,
    }
}

fn summarize(kind: HoldingKind, assets: Vec<ValuedAsset>) -> ClassSummary {
    let total_value: f64 = assets.iter().map(|a| a.value).sum();
    let total_cost: f64 = assets.iter().map(|a| a.cost_basis).sum();
    let total_pnl = total_value - total_cost;
    ClassSummary {
        kind,
        assets,
        total_value,
        total_cost,
        total_pnl,
        pnl_pct: pct(total_pnl, total_cost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::store::memory::MemoryStore;
    use crate::store::NewHolding;
    use async_trait::async_trait;
    use chrono::Utc;

    enum Script {
        Prices(Vec<(&'static str, f64)>),
        Fail,
        Hang,
    }

    struct StubProvider {
        script: Script,
    }

    #[async_trait]
    impl PriceProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn fetch_prices(&self, symbols: &[String]) -> Result<Vec<Price>, ProviderError> {
            match &self.script {
                Script::Prices(quotes) => Ok(quotes
                    .iter()
                    .filter(|(symbol, _)| symbols.iter().any(|s| s == symbol))
                    .map(|(symbol, price)| Price {
                        symbol: symbol.to_string(),
                        name: symbol.to_string(),
                        price: *price,
                        daily_change: 0.0,
                        daily_pct: 1.5,
                        last_updated: Utc::now(),
                        stale: false,
                    })
                    .collect()),
                Script::Fail => Err(ProviderError::Status(503)),
                Script::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        async fn is_healthy(&self) -> bool {
            true
        }

        async fn close(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn provider(script: Script) -> Option<Arc<dyn PriceProvider>> {
        Some(Arc::new(StubProvider { script }))
    }

    async fn seeded_store(holdings: &[(HoldingKind, &str, f64, f64)]) -> Arc<dyn HoldingStore> {
        let store = MemoryStore::new();
        for (kind, symbol, quantity, cost_basis) in holdings {
            store
                .create(NewHolding {
                    kind: *kind,
                    symbol: symbol.to_string(),
                    quantity: *quantity,
                    cost_basis: *cost_basis,
                })
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_fund_valuation_and_pnl() {
        let store = seeded_store(&[(HoldingKind::Fund, "KUT", 100.0, 1200.0)]).await;
        let aggregator = Aggregator::new(
            provider(Script::Prices(vec![("KUT", 13.316)])),
            None,
            store,
        );

        let class = aggregator.class_assets(HoldingKind::Fund).await.unwrap();
        assert_eq!(class.assets.len(), 1);

        let kut = &class.assets[0];
        assert!((kut.value - 1331.6).abs() < 1e-9);
        assert!((kut.pnl - 131.6).abs() < 1e-9);
        assert!((kut.pnl_pct - 10.966666666666667).abs() < 1e-9);
        assert!(!kut.stale);
    }

    #[tokio::test]
    async fn test_no_provider_yields_stale_placeholders() {
        let store = seeded_store(&[
            (HoldingKind::Fund, "KUT", 100.0, 1200.0),
            (HoldingKind::Fund, "YZG", 50.0, 800.0),
        ])
        .await;
        let aggregator = Aggregator::new(None, None, store);

        let class = aggregator.class_assets(HoldingKind::Fund).await.unwrap();
        assert_eq!(class.assets.len(), 2);
        for asset in &class.assets {
            assert_eq!(asset.price, 0.0);
            assert_eq!(asset.value, 0.0);
            assert!(asset.stale);
        }
        // Cost is preserved even when prices are unavailable
        assert_eq!(class.total_cost, 2000.0);
        assert_eq!(class.total_pnl, -2000.0);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_not_errors() {
        let store = seeded_store(&[(HoldingKind::Crypto, "BTCUSDT", 0.5, 20000.0)]).await;
        let aggregator = Aggregator::new(None, provider(Script::Fail), store);

        let class = aggregator.class_assets(HoldingKind::Crypto).await.unwrap();
        assert_eq!(class.assets.len(), 1);
        assert!(class.assets[0].stale);
        assert_eq!(class.assets[0].name, "Bitcoin");
    }

    #[tokio::test]
    async fn test_slow_provider_hits_deadline() {
        let store = seeded_store(&[(HoldingKind::Crypto, "BTCUSDT", 0.5, 20000.0)]).await;
        let aggregator = Aggregator::new(None, provider(Script::Hang), store)
            .with_timeout(Duration::from_millis(50));

        let class = aggregator.class_assets(HoldingKind::Crypto).await.unwrap();
        assert_eq!(class.assets.len(), 1);
        assert!(class.assets[0].stale);
        assert_eq!(class.assets[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_tracked_symbol_without_holding_has_zero_quantity() {
        let store = seeded_store(&[(HoldingKind::Fund, "KUT", 100.0, 1200.0)]).await;
        let aggregator = Aggregator::new(
            provider(Script::Prices(vec![("KUT", 13.0), ("YZG", 20.0)])),
            None,
            store,
        )
        .with_tracked(vec!["KUT".to_string(), "YZG".to_string()], vec![]);

        let class = aggregator.class_assets(HoldingKind::Fund).await.unwrap();
        assert_eq!(class.assets.len(), 2);

        let yzg = class.assets.iter().find(|a| a.symbol == "YZG").unwrap();
        assert_eq!(yzg.quantity, 0.0);
        assert_eq!(yzg.value, 0.0);
        assert_eq!(yzg.price, 20.0);
        // Watch-only rows must not skew totals
        assert!((class.total_value - 1300.0).abs() < 1e-9);
        assert_eq!(class.total_cost, 1200.0);
    }

    #[tokio::test]
    async fn test_summary_totals_across_classes() {
        let store = seeded_store(&[
            (HoldingKind::Fund, "KUT", 100.0, 1200.0),
            (HoldingKind::Fund, "YZG", 10.0, 100.0),
            (HoldingKind::Crypto, "BTCUSDT", 0.1, 5000.0),
            (HoldingKind::Crypto, "ETHUSDT", 2.0, 4000.0),
        ])
        .await;
        let aggregator = Aggregator::new(
            provider(Script::Prices(vec![("KUT", 13.0), ("YZG", 20.0)])),
            provider(Script::Prices(vec![
                ("BTCUSDT", 60000.0),
                ("ETHUSDT", 2500.0),
            ])),
            store,
        );

        let summary = aggregator.summary().await.unwrap();
        // funds: 100*13 + 10*20 = 1500; crypto: 0.1*60000 + 2*2500 = 11000
        assert!((summary.funds.total_value - 1500.0).abs() < 1e-9);
        assert!((summary.crypto.total_value - 11000.0).abs() < 1e-9);
        assert!((summary.total_value - 12500.0).abs() < 1e-9);
        assert!((summary.total_cost - 10300.0).abs() < 1e-9);
        assert!((summary.total_pnl - 2200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_cost_basis_has_zero_pct() {
        let store = seeded_store(&[(HoldingKind::Fund, "KUT", 100.0, 0.0)]).await;
        let aggregator =
            Aggregator::new(provider(Script::Prices(vec![("KUT", 13.0)])), None, store);

        let class = aggregator.class_assets(HoldingKind::Fund).await.unwrap();
        assert_eq!(class.assets[0].pnl_pct, 0.0);
        assert_eq!(class.pnl_pct, 0.0);
    }

    #[tokio::test]
    async fn test_missing_symbol_in_response_gets_placeholder() {
        let store = seeded_store(&[
            (HoldingKind::Fund, "KUT", 100.0, 1200.0),
            (HoldingKind::Fund, "ZZZ", 10.0, 100.0),
        ])
        .await;
        let aggregator = Aggregator::new(
            provider(Script::Prices(vec![("KUT", 13.0)])),
            None,
            store,
        );

        let class = aggregator.class_assets(HoldingKind::Fund).await.unwrap();
        let zzz = class.assets.iter().find(|a| a.symbol == "ZZZ").unwrap();
        assert!(zzz.stale);
        assert_eq!(zzz.value, 0.0);
        assert_eq!(zzz.name, "ZZZ Fund");
    }

    #[tokio::test]
    async fn test_quote_without_provider_is_not_found() {
        let store = seeded_store(&[]).await;
        let aggregator = Aggregator::new(None, None, store);

        let err = aggregator
            .quote(HoldingKind::Fund, "KUT")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_quote_unknown_symbol_is_not_found() {
        let store = seeded_store(&[]).await;
        let aggregator =
            Aggregator::new(provider(Script::Prices(vec![("KUT", 13.0)])), None, store);

        let err = aggregator
            .quote(HoldingKind::Fund, "ZZZ")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_quote_joins_holding_when_present() {
        let store = seeded_store(&[(HoldingKind::Fund, "KUT", 100.0, 1200.0)]).await;
        let aggregator = Aggregator::new(
            provider(Script::Prices(vec![("KUT", 13.316)])),
            None,
            store,
        );

        let asset = aggregator.quote(HoldingKind::Fund, "kut").await.unwrap();
        assert!((asset.value - 1331.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_quote_without_holding_defaults_to_zero_position() {
        let store = seeded_store(&[]).await;
        let aggregator =
            Aggregator::new(provider(Script::Prices(vec![("KUT", 13.0)])), None, store);

        let asset = aggregator.quote(HoldingKind::Fund, "KUT").await.unwrap();
        assert_eq!(asset.quantity, 0.0);
        assert_eq!(asset.cost_basis, 0.0);
        assert_eq!(asset.price, 13.0);
        assert_eq!(asset.value, 0.0);
    }
}
