pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod log;
pub mod portfolio;
pub mod provider;
pub mod providers;
pub mod store;

use crate::config::AppConfig;
use crate::portfolio::Aggregator;
use crate::provider::PriceProvider;
use crate::providers::{
    BinanceProvider, BrowserSession, CoinGeckoProvider, FallbackProvider, TefasProvider,
};
use crate::store::fjall::FjallStore;
use crate::store::{HoldingKind, HoldingStore, NewHolding};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum AppCommand {
    Summary,
    Health,
    Rate,
    Quote {
        kind: HoldingKind,
        symbol: String,
    },
    HoldingsList,
    HoldingsAdd {
        kind: HoldingKind,
        symbol: String,
        quantity: f64,
        cost_basis: f64,
    },
    HoldingsUpdate {
        id: i64,
        quantity: Option<f64>,
        cost_basis: Option<f64>,
    },
    HoldingsRemove {
        id: i64,
    },
}

/// Fund prices come through a driven browser session; the session starts
/// lazily on the first fetch, so constructing the provider is cheap.
fn build_fund_provider(config: &AppConfig) -> Option<Arc<dyn PriceProvider>> {
    if !config.tefas.enabled || config.tefas.funds.is_empty() {
        return None;
    }
    let session = Arc::new(BrowserSession::new(
        &config.tefas.webdriver_url,
        config.tefas.headless,
    ));
    Some(Arc::new(TefasProvider::new(session)))
}

fn build_crypto_provider(config: &AppConfig) -> Option<Arc<dyn PriceProvider>> {
    let binance: Option<Arc<dyn PriceProvider>> = config
        .binance
        .enabled
        .then(|| Arc::new(BinanceProvider::new(&config.binance.base_url)) as _);
    let coingecko: Option<Arc<dyn PriceProvider>> = config.coingecko.enabled.then(|| {
        Arc::new(CoinGeckoProvider::new(
            &config.coingecko.base_url,
            &config.coingecko.api_key,
        )) as _
    });

    match (binance, coingecko) {
        (Some(primary), Some(secondary)) => {
            Some(Arc::new(FallbackProvider::new(primary, secondary)))
        }
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

/// First-run seeding: configured holdings land in the store once, when it
/// is still empty. An already-populated store is left untouched.
async fn seed_holdings(config: &AppConfig, store: &dyn HoldingStore) -> Result<()> {
    if config.holdings.is_empty() || !store.is_empty().await? {
        return Ok(());
    }

    let seeds: Vec<NewHolding> = config
        .holdings
        .iter()
        .map(|seed| NewHolding {
            kind: seed.kind,
            symbol: seed.symbol.to_uppercase(),
            quantity: seed.quantity,
            cost_basis: seed.cost_basis,
        })
        .collect();
    let created = store.bulk_create(seeds).await?;
    info!(created, "seeded holdings from config");
    Ok(())
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store: Arc<dyn HoldingStore> = Arc::new(FjallStore::open(&config.store_path()?)?);
    seed_holdings(&config, store.as_ref()).await?;

    let fund_provider = build_fund_provider(&config);
    let crypto_provider = build_crypto_provider(&config);
    let aggregator = Aggregator::new(
        fund_provider.clone(),
        crypto_provider.clone(),
        Arc::clone(&store),
    )
    .with_tracked(
        config.tefas.funds.iter().map(|s| s.to_uppercase()).collect(),
        config
            .binance
            .symbols
            .iter()
            .map(|s| s.to_uppercase())
            .collect(),
    );

    let result = match command {
        AppCommand::Summary => cli::summary::run(&aggregator).await,
        AppCommand::Health => cli::health(fund_provider.as_ref(), crypto_provider.as_ref()).await,
        AppCommand::Rate => cli::rate(&aggregator).await,
        AppCommand::Quote { kind, symbol } => cli::quote(&aggregator, kind, &symbol).await,
        AppCommand::HoldingsList => cli::holdings::list(store.as_ref()).await,
        AppCommand::HoldingsAdd {
            kind,
            symbol,
            quantity,
            cost_basis,
        } => cli::holdings::add(store.as_ref(), kind, &symbol, quantity, cost_basis).await,
        AppCommand::HoldingsUpdate {
            id,
            quantity,
            cost_basis,
        } => cli::holdings::update(store.as_ref(), id, quantity, cost_basis).await,
        AppCommand::HoldingsRemove { id } => cli::holdings::remove(store.as_ref(), id).await,
    };

    // The browser session must be torn down even when the command failed,
    // but never hold the process hostage.
    for provider in [&fund_provider, &crypto_provider].into_iter().flatten() {
        match tokio::time::timeout(Duration::from_secs(30), provider.close()).await {
            Ok(Err(e)) => {
                warn!(provider = provider.name(), error = %e, "provider close failed")
            }
            Err(_) => warn!(provider = provider.name(), "provider close timed out"),
            Ok(Ok(())) => {}
        }
    }

    result
}
