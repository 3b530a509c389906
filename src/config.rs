use crate::store::HoldingKind;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TefasConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Run the scraping browser headless. Visible mode helps when the WAF
    /// rejects the headless fingerprint.
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    /// Tracked fund codes, e.g. "KUT".
    #[serde(default)]
    pub funds: Vec<String>,
}

impl Default for TefasConfig {
    fn default() -> Self {
        TefasConfig {
            enabled: true,
            headless: true,
            webdriver_url: default_webdriver_url(),
            funds: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinanceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_binance_url")]
    pub base_url: String,
    /// Tracked trading pairs, e.g. "BTCUSDT".
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        BinanceConfig {
            enabled: true,
            base_url: default_binance_url(),
            symbols: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_coingecko_url")]
    pub base_url: String,
    /// Optional demo API key for higher rate limits.
    #[serde(default)]
    pub api_key: String,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        CoinGeckoConfig {
            enabled: true,
            base_url: default_coingecko_url(),
            api_key: String::new(),
        }
    }
}

/// A holding seeded into the store on first run.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SeedHolding {
    pub kind: HoldingKind,
    pub symbol: String,
    pub quantity: f64,
    #[serde(default)]
    pub cost_basis: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub tefas: TefasConfig,
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default)]
    pub coingecko: CoinGeckoConfig,
    /// Seeded into the holdings store when it is empty.
    #[serde(default)]
    pub holdings: Vec<SeedHolding>,
    /// Holdings database directory; defaults under the platform data dir.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_true() -> bool {
    true
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_binance_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_currency() -> String {
    "TRY".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            tefas: TefasConfig::default(),
            binance: BinanceConfig::default(),
            coingecko: CoinGeckoConfig::default(),
            holdings: Vec::new(),
            store_path: None,
            currency: default_currency(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("REFRACT_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let proj_dirs = ProjectDirs::from("in", "codito", "refract")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "refract")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // Environment overrides
        if let Ok(api_key) = std::env::var("COINGECKO_API_KEY") {
            config.coingecko.api_key = api_key;
        }
        if let Ok(db_path) = std::env::var("REFRACT_DB_PATH") {
            config.store_path = Some(PathBuf::from(db_path));
        }

        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Resolved holdings database directory.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_data_path()?.join("holdings")),
        }
    }
}
