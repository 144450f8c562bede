use anyhow::Result;
use async_trait::async_trait;
use ethers::types::Address;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::sources::{address_path, PriceSource};
use crate::types::{Quote, QuoteSource};

/// Secondary source: a token-price lookup in the CoinGecko contract-price
/// API shape. It reports aggregate market data but cannot prove an active,
/// liquid pair, so it never contributes a valid market cap.
pub struct MarketApiSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    usd: Option<f64>,
    usd_market_cap: Option<f64>,
    #[serde(rename = "usd_24h_vol")]
    usd_24h_vol: Option<f64>,
    #[serde(rename = "usd_24h_change")]
    usd_24h_change: Option<f64>,
}

impl MarketApiSource {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

fn entry_quote(entry: &MarketEntry) -> Option<Quote> {
    // A null price means the API does not know the token at all.
    let price = entry.usd?;
    Some(Quote {
        price,
        market_cap: entry.usd_market_cap.unwrap_or(0.0),
        volume_24h: entry.usd_24h_vol.unwrap_or(0.0),
        daily_change: entry.usd_24h_change.unwrap_or(0.0),
        holders: None,
        source: QuoteSource::MarketApi,
    })
}

#[async_trait]
impl PriceSource for MarketApiSource {
    fn name(&self) -> &'static str {
        "market-api"
    }

    async fn fetch(&self, address: Address) -> Result<Option<Quote>> {
        let key = address_path(address);
        let url = format!(
            "{}/api/v3/simple/token_price/ethereum?contract_addresses={}&vs_currencies=usd&include_market_cap=true&include_24hr_vol=true&include_24hr_change=true",
            self.base_url, key
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("market-api returned {} for {:?}", status, address);
            return Ok(None);
        }

        let body: HashMap<String, MarketEntry> = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("market-api body unreadable for {:?}: {}", address, e);
                return Ok(None);
            }
        };

        match body.get(&key) {
            Some(entry) => Ok(entry_quote(entry)),
            None => {
                debug!("market-api has no entry for {:?}", address);
                Ok(None)
            }
        }
    }
}
