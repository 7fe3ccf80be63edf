//! HTTP client for the game server's public stats API.

use std::time::Duration;

use afkpool_session::{DEFAULT_BALANCE, StatsLookup};
use reqwest::Url;
use serde_json::Value;

use crate::AfkpoolError;
use crate::config::StatsSettings;

/// Fetches balances from `GET {base_url}/v1/stats/{name}`.
///
/// The balance is read from `result.shards`, which the API returns as
/// either a string or a number.
#[derive(Debug, Clone)]
pub struct HttpStatsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpStatsClient {
    pub fn new(settings: &StatsSettings) -> Result<Self, AfkpoolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    /// The request URL for `name`. The name is percent-encoded as a
    /// single path segment.
    fn url(&self, name: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| format!("{}: {e}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| format!("{}: cannot be a base URL", self.base_url))?
            .pop_if_empty()
            .extend(["v1", "stats", name]);
        Ok(url)
    }

    async fn lookup(&self, name: &str) -> Result<Option<String>, String> {
        let mut request = self.client.get(self.url(name)?);
        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, key);
        }
        let body: Value = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        Ok(balance_from(&body))
    }
}

impl StatsLookup for HttpStatsClient {
    async fn fetch_balance(&self, display_name: &str) -> String {
        match self.lookup(display_name).await {
            Ok(Some(balance)) => balance,
            Ok(None) => {
                tracing::debug!(name = %display_name, "stats response has no balance");
                DEFAULT_BALANCE.to_string()
            }
            Err(error) => {
                tracing::debug!(name = %display_name, %error, "stats lookup failed");
                DEFAULT_BALANCE.to_string()
            }
        }
    }
}

/// `result.shards` as a string. Empty strings and other types count as
/// missing.
fn balance_from(body: &Value) -> Option<String> {
    match body.get("result")?.get("shards")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
