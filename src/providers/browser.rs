//! WebDriver-backed [`FundDataSource`].
//!
//! The fund site's WAF rejects plain HTTP clients, so rows are fetched from
//! inside a real browser session: navigate once to collect cookies and pass
//! the JavaScript challenge, then issue the data request with in-page
//! `fetch`. The session fingerprint must look like a desktop user; the
//! evasion flags below are load-bearing, not hardening.

use super::tefas::{FundDataSource, RawFundRow, format_request_date};
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::NaiveDate;
use fantoccini::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const BASE_URL: &str = "https://www.tefas.gov.tr";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(rename = "recordsTotal", default)]
    records_total: i64,
    #[serde(default)]
    data: Vec<RawFundRow>,
}

#[derive(Debug, Deserialize)]
struct ScriptResult {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<HistoryResponse>,
}

pub struct BrowserSession {
    webdriver_url: String,
    headless: bool,
    client: Mutex<Option<Client>>,
}

impl BrowserSession {
    pub fn new(webdriver_url: &str, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            headless,
            client: Mutex::new(None),
        }
    }

    fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-infobars".to_string(),
            "--window-size=1920,1080".to_string(),
            "--lang=tr-TR".to_string(),
            format!("--user-agent={USER_AGENT}"),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }

        let mut caps = serde_json::Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": args,
                "excludeSwitches": ["enable-automation"],
            }),
        );
        caps
    }
}

#[async_trait]
impl FundDataSource for BrowserSession {
    async fn ensure_started(&self) -> Result<(), ProviderError> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        info!(headless = self.headless, "starting browser session");

        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| ProviderError::Session(e.to_string()))?;

        // Warm-up navigation: collects the WAF cookies and runs any
        // JavaScript challenge before the first data request.
        client
            .goto(&format!("{BASE_URL}/TarihselVeriler.aspx"))
            .await
            .map_err(|e| ProviderError::Session(e.to_string()))?;

        // Scrub the property that exposes automation
        client
            .execute(
                "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });",
                vec![],
            )
            .await
            .map_err(|e| ProviderError::Session(e.to_string()))?;

        tokio::time::sleep(Duration::from_secs(2)).await;

        *guard = Some(client);
        info!("browser session started");
        Ok(())
    }

    async fn fetch_rows(&self, date: NaiveDate) -> Result<Vec<RawFundRow>, ProviderError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(ProviderError::NotStarted)?;

        let date_str = format_request_date(date);
        debug!(date = %date_str, "requesting fund rows in-session");

        let script = r#"
            const [dateStr, callback] = arguments;
            const params = new URLSearchParams({
                fontip: 'YAT',
                sfontur: '',
                fonkod: '',
                fongrup: '',
                bastarih: dateStr,
                bittarih: dateStr,
                fonturkod: '',
                fonunvantip: '',
                kurucukod: ''
            });
            fetch('/api/DB/BindHistoryInfo', {
                method: 'POST',
                headers: {
                    'Content-Type': 'application/x-www-form-urlencoded',
                    'X-Requested-With': 'XMLHttpRequest'
                },
                body: params.toString()
            })
                .then((response) => response.text())
                .then((text) => {
                    if (text.includes('Erişim Engellendi') ||
                        text.includes('Web Application Firewall')) {
                        callback({ error: 'WAF_BLOCKED' });
                        return;
                    }
                    callback({ data: JSON.parse(text) });
                })
                .catch((err) => callback({ error: String(err) }));
        "#;

        let value = client
            .execute_async(script, vec![json!(date_str)])
            .await
            .map_err(|e| ProviderError::Session(e.to_string()))?;

        let result: ScriptResult = serde_json::from_value(value)
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if let Some(error) = result.error {
            if error == "WAF_BLOCKED" {
                return Err(ProviderError::Blocked);
            }
            return Err(ProviderError::Session(error));
        }

        let response = result
            .data
            .ok_or_else(|| ProviderError::InvalidResponse("empty script result".to_string()))?;
        info!(
            total = response.records_total,
            returned = response.data.len(),
            "fetched fund rows"
        );
        Ok(response.data)
    }

    async fn is_started(&self) -> bool {
        self.client.lock().await.is_some()
    }

    async fn shutdown(&self) -> Result<(), ProviderError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.take() {
            info!("closing browser session");
            client
                .close()
                .await
                .map_err(|e| ProviderError::Session(e.to_string()))?;
        }
        Ok(())
    }
}
