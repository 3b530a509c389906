use super::ui;
use crate::portfolio::{Aggregator, ClassSummary, PortfolioSummary};
use crate::provider::ExchangeRate;
use anyhow::Result;
use comfy_table::Cell;
use console::style;

fn class_title(class: &ClassSummary) -> &'static str {
    match class.kind {
        crate::store::HoldingKind::Fund => "Funds (TRY)",
        crate::store::HoldingKind::Crypto => "Crypto (USD)",
    }
}

fn render_class(class: &ClassSummary) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Asset"),
        ui::header_cell("Units"),
        ui::header_cell("Price"),
        ui::header_cell("Value"),
        ui::header_cell("P&L"),
        ui::header_cell("P&L (%)"),
        ui::header_cell("Daily (%)"),
    ]);

    for asset in &class.assets {
        let price = if asset.stale {
            format!("{:.4}*", asset.price)
        } else {
            format!("{:.4}", asset.price)
        };
        table.add_row(vec![
            Cell::new(&asset.name),
            ui::num_cell(format!("{:.4}", asset.quantity)),
            ui::num_cell(price),
            ui::num_cell(format!("{:.2}", asset.value)),
            ui::change_cell(asset.pnl, format!("{:+.2}", asset.pnl)),
            ui::change_cell(asset.pnl_pct, format!("{:+.2}%", asset.pnl_pct)),
            ui::change_cell(asset.daily_pct, format!("{:+.2}%", asset.daily_pct)),
        ]);
    }

    let mut output = format!(
        "{}\n\n{}",
        ui::style_text(class_title(class), ui::StyleType::Title),
        table
    );
    output.push_str(&format!(
        "\n\nTotal: {}  P&L: {}",
        ui::style_text(&format!("{:.2}", class.total_value), ui::StyleType::TotalValue),
        ui::style_text(
            &format!("{:+.2} ({:+.2}%)", class.total_pnl, class.pnl_pct),
            if class.total_pnl >= 0.0 {
                ui::StyleType::TotalValue
            } else {
                ui::StyleType::Error
            }
        ),
    ));
    output
}

/// Renders the full portfolio. The grand total needs USD/TRY to merge the
/// two class currencies; without a rate only per-class totals are shown.
pub fn render(summary: &PortfolioSummary, rate: Option<ExchangeRate>) -> String {
    let mut output = String::new();

    if !summary.funds.assets.is_empty() {
        output.push_str(&render_class(&summary.funds));
        output.push('\n');
    }
    if !summary.crypto.assets.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&render_class(&summary.crypto));
        output.push('\n');
    }

    if output.is_empty() {
        return "No holdings tracked. Add one with `refract holdings add`.".to_string();
    }

    match rate {
        Some(rate) if !summary.crypto.assets.is_empty() => {
            let grand_total = summary.funds.total_value + summary.crypto.total_value * rate.rate;
            let total_str = format!("Grand Total (TRY): {grand_total:.2}");
            output.push_str(&format!(
                "\n{}\n{}",
                ui::style_text(&format!("USD/TRY: {:.4}", rate.rate), ui::StyleType::Subtle),
                style(&total_str).bold().green()
            ));
        }
        Some(_) | None if summary.crypto.assets.is_empty() => {
            let total_str = format!("Grand Total (TRY): {:.2}", summary.funds.total_value);
            output.push_str(&format!("\n{}", style(&total_str).bold().green()));
        }
        _ => {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    "Exchange rate unavailable; totals shown per class.",
                    ui::StyleType::Subtle
                )
            ));
        }
    }

    if summary
        .funds
        .assets
        .iter()
        .chain(&summary.crypto.assets)
        .any(|a| a.stale)
    {
        output.push_str(&format!(
            "\n{}",
            ui::style_text("* stale price", ui::StyleType::Subtle)
        ));
    }

    output
}

pub async fn run(aggregator: &Aggregator) -> Result<()> {
    let pb = ui::new_spinner("Fetching prices...");
    let summary = aggregator.summary().await?;
    let rate = if summary.crypto.assets.is_empty() {
        None
    } else {
        aggregator.exchange_rate().await
    };
    pb.finish_and_clear();

    println!("{}", render(&summary, rate));
    Ok(())
}
