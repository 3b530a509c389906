pub mod binance;
pub mod browser;
pub mod coingecko;
pub mod fallback;
pub mod tefas;

pub use binance::BinanceProvider;
pub use browser::BrowserSession;
pub use coingecko::CoinGeckoProvider;
pub use fallback::FallbackProvider;
pub use tefas::TefasProvider;
