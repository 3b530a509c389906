//! TEFAS fund-price adapter.
//!
//! The upstream site sits behind a WAF that blocks plain HTTP clients, so
//! raw rows come through the [`FundDataSource`] seam: production uses a
//! driven browser session ([`super::browser::BrowserSession`]), tests use a
//! mock. Fund prices update at most once per trading day, hence the long
//! cache TTL and the last-business-day request date.

use crate::cache::TtlCache;
use crate::error::ProviderError;
use crate::provider::{Price, PriceProvider};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// One row of the fund table as the upstream endpoint returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFundRow {
    #[serde(rename = "TARIH")]
    pub date: String,
    #[serde(rename = "FONKODU")]
    pub code: String,
    #[serde(rename = "FONUNVAN")]
    pub name: String,
    #[serde(rename = "FIYAT")]
    pub price: f64,
}

/// Abstract "fetch the raw fund rows for a date" operation. Everything
/// session- and browser-related lives behind this seam.
#[async_trait]
pub trait FundDataSource: Send + Sync {
    /// Starts the underlying session if needed. Safe to call repeatedly.
    async fn ensure_started(&self) -> Result<(), ProviderError>;

    /// Fetches all fund rows for the given date (DD.MM.YYYY upstream format).
    async fn fetch_rows(&self, date: NaiveDate) -> Result<Vec<RawFundRow>, ProviderError>;

    async fn is_started(&self) -> bool;

    /// Tears the session down. Idempotent.
    async fn shutdown(&self) -> Result<(), ProviderError>;
}

pub struct TefasProvider {
    source: Arc<dyn FundDataSource>,
    cache: TtlCache<String, Price>,
}

impl TefasProvider {
    pub fn new(source: Arc<dyn FundDataSource>) -> Self {
        Self {
            source,
            cache: TtlCache::new(CACHE_TTL),
        }
    }

    /// Serves known-stale cached prices after a failed refresh. Returns None
    /// when the cache has nothing for any requested symbol.
    async fn stale_from_cache(&self, symbols: &[String]) -> Option<Vec<Price>> {
        let mut prices = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(mut price) = self.cache.get_stale(symbol).await {
                price.stale = true;
                prices.push(price);
            }
        }
        if prices.is_empty() { None } else { Some(prices) }
    }
}

#[async_trait]
impl PriceProvider for TefasProvider {
    fn name(&self) -> &str {
        "tefas"
    }

    #[instrument(name = "TefasFetch", skip(self), fields(count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &[String]) -> Result<Vec<Price>, ProviderError> {
        if let Some(cached) = self.cache.get_all(symbols).await {
            debug!("returning cached fund prices");
            return Ok(cached);
        }

        self.source.ensure_started().await?;

        let now = Utc::now();
        let target = last_business_day(now);
        info!(date = %target, "fetching fund prices");

        let rows = match self.source.fetch_rows(target).await {
            Ok(rows) => rows,
            Err(e) => {
                if let Some(prices) = self.stale_from_cache(symbols).await {
                    warn!(error = %e, "serving stale cache after fetch failure");
                    return Ok(prices);
                }
                return Err(e);
            }
        };

        let row_map: HashMap<&str, &RawFundRow> =
            rows.iter().map(|r| (r.code.as_str(), r)).collect();
        let weekend = is_weekend(now);

        let mut prices = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let price = match row_map.get(symbol.as_str()) {
                Some(row) => Price {
                    symbol: row.code.clone(),
                    name: row.name.clone(),
                    price: row.price,
                    // The source does not publish daily change
                    daily_change: 0.0,
                    daily_pct: 0.0,
                    last_updated: now,
                    stale: weekend,
                },
                None => {
                    warn!(symbol = %symbol, "fund not present in response");
                    Price::placeholder(symbol, &fund_display_name(symbol))
                }
            };
            prices.push(price);
        }

        self.cache
            .put_many(prices.iter().map(|p| (p.symbol.clone(), p.clone())))
            .await;

        Ok(prices)
    }

    async fn is_healthy(&self) -> bool {
        self.source.is_started().await
    }

    async fn close(&self) -> Result<(), ProviderError> {
        info!("closing tefas provider");
        self.source.shutdown().await
    }
}

/// Last day with a trading session: Saturday maps to Friday, Sunday to the
/// preceding Friday, weekdays stay unchanged.
pub fn last_business_day(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    match today.weekday() {
        Weekday::Sat => today - ChronoDuration::days(1),
        Weekday::Sun => today - ChronoDuration::days(2),
        _ => today,
    }
}

fn is_weekend(now: DateTime<Utc>) -> bool {
    matches!(now.date_naive().weekday(), Weekday::Sat | Weekday::Sun)
}

/// Upstream request date format.
pub fn format_request_date(date: NaiveDate) -> String {
    format!("{:02}.{:02}.{}", date.day(), date.month(), date.year())
}

/// Display names for tracked fund codes; unknown codes fall back to
/// "<CODE> Fund".
pub fn fund_display_name(code: &str) -> String {
    let name = match code {
        "KUT" => "Kuveyt Türk Portföy Kısa Vadeli Kira Sertifikaları Katılım Fonu",
        "TI2" => "TEB Portföy İkinci Değişken Fon",
        "AFT" => "Ak Portföy Amerikan Doları Fon Sepeti Fonu",
        "YZG" => "Yapı Kredi Portföy Gümüş Fonu",
        "KTV" => "Kuveyt Türk Portföy Altın Katılım Fonu",
        "HKH" => "Halk Portföy Kısa Vadeli Borçlanma Araçları Fonu",
        "IOG" => "İş Portföy Orta Vadeli Borçlanma Araçları Fonu",
        "KGM" => "Kuveyt Türk Portföy Gümüş Katılım Fonu",
        _ => return format!("{code} Fund"),
    };
    name.to_string()
}
