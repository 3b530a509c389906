use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use refract::log::init_logging;
use refract::store::HoldingKind;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display portfolio valuation with P&L
    Summary,
    /// Probe configured price providers
    Health,
    /// Display the current USD/TRY exchange rate
    Rate,
    /// Fetch the price of a single symbol
    Quote {
        /// Holding kind: fund or crypto
        kind: HoldingKind,
        /// Fund code or trading pair, e.g. KUT or BTCUSDT
        symbol: String,
    },
    /// Manage tracked holdings
    Holdings {
        #[command(subcommand)]
        command: HoldingsCommands,
    },
}

#[derive(Subcommand)]
enum HoldingsCommands {
    /// List tracked holdings
    List,
    /// Track a new holding
    Add {
        /// Holding kind: fund or crypto
        kind: HoldingKind,
        /// Fund code or trading pair, e.g. KUT or BTCUSDT
        symbol: String,
        /// Units held
        quantity: f64,
        /// Total amount paid
        #[arg(default_value_t = 0.0)]
        cost_basis: f64,
    },
    /// Update an existing holding
    Update {
        id: i64,
        #[arg(short, long)]
        quantity: Option<f64>,
        #[arg(long)]
        cost_basis: Option<f64>,
    },
    /// Stop tracking a holding
    Remove { id: i64 },
}

impl From<Commands> for refract::AppCommand {
    fn from(cmd: Commands) -> refract::AppCommand {
        match cmd {
            Commands::Summary => refract::AppCommand::Summary,
            Commands::Health => refract::AppCommand::Health,
            Commands::Rate => refract::AppCommand::Rate,
            Commands::Quote { kind, symbol } => refract::AppCommand::Quote { kind, symbol },
            Commands::Holdings { command } => match command {
                HoldingsCommands::List => refract::AppCommand::HoldingsList,
                HoldingsCommands::Add {
                    kind,
                    symbol,
                    quantity,
                    cost_basis,
                } => refract::AppCommand::HoldingsAdd {
                    kind,
                    symbol,
                    quantity,
                    cost_basis,
                },
                HoldingsCommands::Update {
                    id,
                    quantity,
                    cost_basis,
                } => refract::AppCommand::HoldingsUpdate {
                    id,
                    quantity,
                    cost_basis,
                },
                HoldingsCommands::Remove { id } => refract::AppCommand::HoldingsRemove { id },
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => refract::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = refract::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
tefas:
  enabled: true
  headless: true
  webdriver_url: "http://localhost:4444"
  funds: []

binance:
  enabled: true
  symbols: []

coingecko:
  enabled: true
  api_key: ""

holdings: []

currency: "TRY"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
