//! Terminal rendering for every subcommand.

pub mod holdings;
pub mod summary;
pub mod ui;

use crate::portfolio::Aggregator;
use crate::provider::PriceProvider;
use anyhow::Result;
use comfy_table::Cell;
use std::sync::Arc;

/// Probes every configured provider and prints a status table.
pub async fn health(
    fund_provider: Option<&Arc<dyn PriceProvider>>,
    crypto_provider: Option<&Arc<dyn PriceProvider>>,
) -> Result<()> {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Provider"), ui::header_cell("Status")]);

    let mut probed = false;
    for provider in [fund_provider, crypto_provider].into_iter().flatten() {
        probed = true;
        let status = if provider.is_healthy().await {
            ui::style_text("healthy", ui::StyleType::TotalValue)
        } else {
            ui::style_text("unhealthy", ui::StyleType::Error)
        };
        table.add_row(vec![Cell::new(provider.name()), Cell::new(status)]);
    }

    if !probed {
        println!("No providers configured.");
        return Ok(());
    }
    println!("{table}");
    Ok(())
}

/// Fetches and prints a single symbol, joined with the stored position
/// when one exists.
pub async fn quote(
    aggregator: &Aggregator,
    kind: crate::store::HoldingKind,
    symbol: &str,
) -> Result<()> {
    let pb = ui::new_spinner("Fetching price...");
    let asset = aggregator.quote(kind, symbol).await;
    pb.finish_and_clear();

    let asset = asset.map_err(|_| anyhow::anyhow!("No price found for {kind} {symbol}"))?;

    let stale = if asset.stale { " (stale)" } else { "" };
    println!("{} [{}]", asset.name, asset.symbol);
    println!("Price: {:.4}{stale}  Daily: {:+.2}%", asset.price, asset.daily_pct);
    if asset.quantity > 0.0 {
        println!(
            "Position: {:.4} units, value {:.2}, P&L {:+.2} ({:+.2}%)",
            asset.quantity, asset.value, asset.pnl, asset.pnl_pct
        );
    }
    Ok(())
}

/// Prints the current USD/TRY rate.
pub async fn rate(aggregator: &Aggregator) -> Result<()> {
    let pb = ui::new_spinner("Fetching exchange rate...");
    let rate = aggregator.exchange_rate().await;
    pb.finish_and_clear();

    match rate {
        Some(rate) => {
            println!("USD/TRY: {:.4} (as of {})", rate.rate, rate.last_updated);
            Ok(())
        }
        None => anyhow::bail!("No provider could supply an exchange rate"),
    }
}
