use super::ui;
use crate::store::{HoldingKind, HoldingPatch, HoldingStore, NewHolding};
use anyhow::{Result, bail};
use comfy_table::Cell;

pub async fn list(store: &dyn HoldingStore) -> Result<()> {
    let holdings = store.all().await?;
    if holdings.is_empty() {
        println!("No holdings tracked.");
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Kind"),
        ui::header_cell("Symbol"),
        ui::header_cell("Units"),
        ui::header_cell("Cost Basis"),
        ui::header_cell("Updated"),
    ]);

    for holding in &holdings {
        table.add_row(vec![
            ui::num_cell(holding.id.to_string()),
            Cell::new(holding.kind.to_string()),
            Cell::new(&holding.symbol),
            ui::num_cell(format!("{:.4}", holding.quantity)),
            ui::num_cell(format!("{:.2}", holding.cost_basis)),
            Cell::new(holding.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!("{table}");
    Ok(())
}

pub async fn add(
    store: &dyn HoldingStore,
    kind: HoldingKind,
    symbol: &str,
    quantity: f64,
    cost_basis: f64,
) -> Result<()> {
    if symbol.trim().is_empty() {
        bail!("Symbol must not be empty");
    }
    if quantity <= 0.0 {
        bail!("Quantity must be positive");
    }
    if cost_basis < 0.0 {
        bail!("Cost basis must not be negative");
    }

    let holding = store
        .create(NewHolding {
            kind,
            symbol: symbol.trim().to_uppercase(),
            quantity,
            cost_basis,
        })
        .await?;
    println!(
        "Added {} holding {} (id {})",
        holding.kind, holding.symbol, holding.id
    );
    Ok(())
}

pub async fn update(
    store: &dyn HoldingStore,
    id: i64,
    quantity: Option<f64>,
    cost_basis: Option<f64>,
) -> Result<()> {
    if quantity.is_none() && cost_basis.is_none() {
        bail!("Nothing to update: provide --quantity and/or --cost-basis");
    }
    if matches!(quantity, Some(q) if q <= 0.0) {
        bail!("Quantity must be positive");
    }
    if matches!(cost_basis, Some(c) if c < 0.0) {
        bail!("Cost basis must not be negative");
    }

    let holding = store
        .update(
            id,
            HoldingPatch {
                quantity,
                cost_basis,
            },
        )
        .await?;
    println!(
        "Updated {} {}: {:.4} units, cost basis {:.2}",
        holding.kind, holding.symbol, holding.quantity, holding.cost_basis
    );
    Ok(())
}

pub async fn remove(store: &dyn HoldingStore, id: i64) -> Result<()> {
    store.delete(id).await?;
    println!("Removed holding {id}");
    Ok(())
}
