//! HTTP price oracle client.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::domain::model::PriceData;

/// Public CoinGecko v3 endpoint; tests point the oracle at a local server.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

pub struct PriceOracle {
    http: reqwest::Client,
    base_url: String,
}

impl PriceOracle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("building HTTP client"),
            base_url: base_url.into(),
        }
    }

    /// `GET {base}/simple/price?ids={id}&vs_currencies=usd`.
    ///
    /// An empty id short-circuits to a zero price; some chains simply have
    /// no oracle listing.
    pub async fn fetch(&self, coin_id: &str) -> Result<PriceData> {
        if coin_id.is_empty() {
            return Ok(PriceData {
                coin_id: String::new(),
                usd: 0.0,
            });
        }

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, coin_id
        );
        let response: HashMap<String, HashMap<String, f64>> = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .context("price oracle returned an error status")?
            .json()
            .await
            .context("decoding price oracle response")?;

        let usd = response
            .get(coin_id)
            .and_then(|entry| entry.get("usd"))
            .copied()
            .unwrap_or(0.0);

        Ok(PriceData {
            coin_id: coin_id.to_string(),
            usd,
        })
    }
}

impl Default for PriceOracle {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
